use tracing::{debug, info};

use crate::config::SiteConfig;
use crate::error::{CoreError, CoreResult};
use crate::models::{Id, ItemType, NewNews, News, RequestCtx, UpdateNews, VoteType};
use crate::ranking::update_rank_if_needed;
use crate::store::Store;

/// Submission payload as the web layer hands it over: a title plus either a
/// URL (link post) or a body (text post), never both.
#[derive(Debug, Clone, Default)]
pub struct NewsSubmission {
    pub title: String,
    pub url: String,
    pub text: String,
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn validate_submission(sub: &NewsSubmission, cfg: &SiteConfig) -> CoreResult<()> {
    let title = sub.title.trim();
    if title.is_empty() {
        return Err(CoreError::validation("title cannot be empty"));
    }
    if title.chars().count() > cfg.title_max_length {
        return Err(CoreError::validation("title too long"));
    }
    if sub.url.is_empty() && sub.text.is_empty() {
        return Err(CoreError::validation("please specify a news title and address or text"));
    }
    if !sub.url.is_empty()
        && !sub.url.starts_with("http://")
        && !sub.url.starts_with("https://")
    {
        return Err(CoreError::validation("we only accept http:// and https:// news"));
    }
    if sub.text.chars().count() > cfg.text_max_length {
        return Err(CoreError::validation("text too long"));
    }
    Ok(())
}

/// A text post is stored as `text://` plus the truncated body, making it a
/// special case of title + url for storage and display.
fn effective_url(sub: &NewsSubmission, cfg: &SiteConfig) -> (String, bool) {
    if sub.url.is_empty() {
        (format!("text://{}", truncate_chars(&sub.text, cfg.comment_max_length)), true)
    } else {
        (sub.url.clone(), false)
    }
}

fn cooldown_key(user_id: Id) -> String {
    format!("user:{user_id}:submitted_recently")
}

/// Submits a story. Resubmitting a URL inside the repost window is
/// idempotent and returns the original item id. On success the author's
/// upvote is cast, the URL is recorded in the repost window and the
/// author's submission cooldown is armed.
pub async fn submit_news(
    store: &dyn Store,
    ctx: &RequestCtx,
    sub: NewsSubmission,
    now: i64,
    cfg: &SiteConfig,
) -> CoreResult<Id> {
    let user = ctx.user.as_ref().ok_or(CoreError::PermissionDenied)?;
    validate_submission(&sub, cfg)?;

    let key = cooldown_key(user.id);
    if store.rate_limit_check(&key, now).await? {
        let retry_in = store.rate_limit_ttl(&key, now).await?.max(0);
        return Err(CoreError::RateLimited { retry_in });
    }

    let (url, textpost) = effective_url(&sub, cfg);
    if !textpost {
        if let Some(existing) = store.url_recently_posted(&url, now).await? {
            debug!(news_id = existing, "repost within window, returning existing item");
            return Ok(existing);
        }
    }

    let news = store
        .create_news(NewNews {
            title: sub.title.trim().to_string(),
            url: url.clone(),
            user_id: user.id,
            ctime: now,
        })
        .await?;
    // the submitter virtually upvotes their own story
    store.cast_vote(user.id, ItemType::News, news.id, VoteType::Up, now).await?;
    if !textpost {
        store.set_url_posted(&url, news.id, cfg.prevent_repost_time, now).await?;
    }
    store.rate_limit_set(&key, cfg.news_submission_break, now).await?;
    info!(news_id = news.id, user_id = user.id, textpost, "news submitted");
    Ok(news.id)
}

/// Edits a story: owner within the edit window, or admin at any time. A URL
/// change re-validates repost uniqueness and moves the repost-window record
/// to the new URL. The empty-url-means-text rule applies exactly as on
/// creation.
pub async fn edit_news(
    store: &dyn Store,
    ctx: &RequestCtx,
    news_id: Id,
    sub: NewsSubmission,
    now: i64,
    cfg: &SiteConfig,
) -> CoreResult<Id> {
    let user = ctx.user.as_ref().ok_or(CoreError::PermissionDenied)?;
    let news = store.get_news(news_id).await?;
    if news.del {
        return Err(CoreError::NotFound);
    }
    let is_admin = user.is_admin();
    if news.user_id != user.id && !is_admin {
        return Err(CoreError::PermissionDenied);
    }
    if !is_admin && now - news.ctime > cfg.news_edit_time {
        return Err(CoreError::PermissionDenied);
    }
    validate_submission(&sub, cfg)?;

    let (url, textpost) = effective_url(&sub, cfg);
    if !textpost && url != news.url {
        if store.url_recently_posted(&url, now).await?.is_some() {
            return Err(CoreError::validation("url recently posted"));
        }
        store.clear_url_posted(news_id).await?;
        store.set_url_posted(&url, news_id, cfg.prevent_repost_time, now).await?;
    }
    store
        .update_news(news_id, UpdateNews { title: sub.title.trim().to_string(), url })
        .await?;
    Ok(news_id)
}

/// Soft-deletes a story; same permission rule as editing.
pub async fn del_news(
    store: &dyn Store,
    ctx: &RequestCtx,
    news_id: Id,
    now: i64,
    cfg: &SiteConfig,
) -> CoreResult<()> {
    let user = ctx.user.as_ref().ok_or(CoreError::PermissionDenied)?;
    let news = store.get_news(news_id).await?;
    if news.del {
        return Err(CoreError::NotFound);
    }
    let is_admin = user.is_admin();
    if news.user_id != user.id && !is_admin {
        return Err(CoreError::PermissionDenied);
    }
    if !is_admin && now - news.ctime > cfg.news_edit_time {
        return Err(CoreError::PermissionDenied);
    }
    store.mark_news_deleted(news_id).await?;
    info!(news_id, "news deleted");
    Ok(())
}

/// Casts a vote on a story. Returns false when the user already voted,
/// whatever the direction; a vote is never switched or retracted.
pub async fn vote_news(
    store: &dyn Store,
    ctx: &RequestCtx,
    news_id: Id,
    vote_type: VoteType,
    now: i64,
) -> CoreResult<bool> {
    let user = ctx.user.as_ref().ok_or(CoreError::PermissionDenied)?;
    let news = store.get_news(news_id).await?;
    if news.del {
        return Err(CoreError::NotFound);
    }
    Ok(store.cast_vote(user.id, ItemType::News, news_id, vote_type, now).await?)
}

/// Single-item fetch in a "needs accurate rank" context: reconciles the
/// stored rank against the true one and annotates the caller's own vote.
pub async fn get_news(
    store: &dyn Store,
    ctx: &RequestCtx,
    news_id: Id,
    now: i64,
    cfg: &SiteConfig,
) -> CoreResult<News> {
    let mut news = store.get_news(news_id).await?;
    if news.del && !ctx.is_admin() {
        return Err(CoreError::NotFound);
    }
    update_rank_if_needed(store, &mut news, now, cfg).await?;
    if let Some(uid) = ctx.user_id() {
        news.voted = store.get_user_vote(uid, ItemType::News, news_id).await?;
    }
    Ok(news)
}

async fn annotate_votes(store: &dyn Store, ctx: &RequestCtx, items: &mut [News]) -> CoreResult<()> {
    if let Some(uid) = ctx.user_id() {
        for news in items.iter_mut() {
            news.voted = store.get_user_vote(uid, ItemType::News, news.id).await?;
        }
    }
    Ok(())
}

/// Front page: stored rank order, cheap bulk read (no rank reconciliation).
pub async fn top_news(
    store: &dyn Store,
    ctx: &RequestCtx,
    start: i64,
    count: i64,
) -> CoreResult<(Vec<News>, i64)> {
    let (mut items, total) = store.top_news(start, count).await?;
    annotate_votes(store, ctx, &mut items).await?;
    Ok((items, total))
}

/// Chronological listing.
pub async fn latest_news(
    store: &dyn Store,
    ctx: &RequestCtx,
    start: i64,
    count: i64,
) -> CoreResult<(Vec<News>, i64)> {
    let (mut items, total) = store.latest_news(start, count).await?;
    annotate_votes(store, ctx, &mut items).await?;
    Ok((items, total))
}

/// Stories submitted by one user, newest first.
pub async fn posted_news(
    store: &dyn Store,
    ctx: &RequestCtx,
    user_id: Id,
    start: i64,
    count: i64,
) -> CoreResult<(Vec<News>, i64)> {
    let (mut items, total) = store.posted_news(user_id, start, count).await?;
    annotate_votes(store, ctx, &mut items).await?;
    Ok((items, total))
}

/// Stories the user upvoted, most recently voted first.
pub async fn saved_news(
    store: &dyn Store,
    ctx: &RequestCtx,
    user_id: Id,
    start: i64,
    count: i64,
) -> CoreResult<(Vec<News>, i64)> {
    let (mut items, total) = store.saved_news(user_id, start, count).await?;
    annotate_votes(store, ctx, &mut items).await?;
    Ok((items, total))
}

/// Uniform random id draw bounded by the id counter; the caller retries or
/// falls back when the drawn item turns out deleted.
pub async fn random_news_id(store: &dyn Store) -> CoreResult<Option<Id>> {
    use rand::Rng;
    let counter = store.get_counter("news_count").await?;
    if counter <= 0 {
        return Ok(None);
    }
    Ok(Some(rand::thread_rng().gen_range(1..=counter)))
}
