use tracing::{debug, info};

use crate::config::SiteConfig;
use crate::error::{CoreError, CoreResult};
use crate::models::{News, RequestCtx};
use crate::store::{rate_limit_by_tags, Store};

/// Multiplier keeping ranks in a readable magnitude.
pub const RANK_SCALE: f64 = 1_000_000.0;

/// Stored ranks further than this from the true value get rewritten.
pub const RANK_EPSILON: f64 = 1e-6;

/// Score = vote difference plus a sublinear volume bonus, so that a
/// 50-up/50-down item outranks a 5-up/5-down one at equal difference.
pub fn compute_news_score(up: i64, down: i64, cfg: &SiteConfig) -> f64 {
    let mut score = (up - down) as f64;
    let votes = up + down;
    if votes > cfg.news_score_log_start {
        score += ((votes - cfg.news_score_log_start) as f64).ln() * cfg.news_score_log_booster;
    }
    score
}

/// Rank = score scaled down by a power of padded age. Items past the age
/// limit are forced to minus their age so they sink monotonically, the
/// older the deeper.
pub fn compute_news_rank(score: f64, ctime: i64, now: i64, cfg: &SiteConfig) -> f64 {
    let age = now - ctime;
    if age > cfg.top_news_age_limit {
        return -(age as f64);
    }
    (score * RANK_SCALE) / ((age + cfg.news_age_padding) as f64).powf(cfg.rank_aging_factor)
}

/// Lazy rank reconciliation: recompute the true score and rank for one item
/// and persist them when the stored rank drifted beyond `RANK_EPSILON`.
/// Rank is deliberately not recomputed on bulk reads; staleness is bounded
/// by how long ago the item was last individually viewed.
pub async fn update_rank_if_needed(
    store: &dyn Store,
    news: &mut News,
    now: i64,
    cfg: &SiteConfig,
) -> CoreResult<()> {
    let real_score = compute_news_score(news.up, news.down, cfg);
    let real_rank = compute_news_rank(real_score, news.ctime, now, cfg);
    if (real_rank - news.rank).abs() > RANK_EPSILON {
        debug!(news_id = news.id, old = news.rank, new = real_rank, "correcting stale rank");
        store.set_news_score_rank(news.id, real_score, real_rank).await?;
        news.score = real_score;
        news.rank = real_rank;
    }
    Ok(())
}

/// Full recompute sweep over every non-deleted item. Admin-only, idempotent
/// and rate limited per admin; returns how many items were rewritten.
pub async fn recompute_all(
    store: &dyn Store,
    ctx: &RequestCtx,
    now: i64,
    cfg: &SiteConfig,
) -> CoreResult<usize> {
    let user = ctx.user.as_ref().ok_or(CoreError::PermissionDenied)?;
    if !user.is_admin() {
        return Err(CoreError::PermissionDenied);
    }
    let uid = user.id.to_string();
    if let Some(remaining) =
        rate_limit_by_tags(store, cfg.admin_recompute_delay, &["admin", "recompute", &uid], now).await?
    {
        return Err(CoreError::RateLimited { retry_in: remaining });
    }

    let ids = store.all_news_ids().await?;
    let mut recomputed = 0usize;
    for id in ids {
        let news = match store.get_news(id).await {
            Ok(n) => n,
            Err(crate::store::StoreError::NotFound) => continue,
            Err(e) => return Err(e.into()),
        };
        let score = compute_news_score(news.up, news.down, cfg);
        let rank = compute_news_rank(score, news.ctime, now, cfg);
        store.set_news_score_rank(id, score, rank).await?;
        recomputed += 1;
    }
    info!(recomputed, "recompute sweep finished");
    Ok(recomputed)
}
