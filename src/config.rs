/// Site-wide tunables for scoring, aging, rate limits and page sizes.
/// Defaults mirror a small production deployment; every value can be
/// overridden through `NEWSRANK_*` environment variables.
#[derive(Clone, Debug)]
pub struct SiteConfig {
    /// Vote-volume threshold above which the logarithmic score bonus kicks in.
    pub news_score_log_start: i64,
    /// Multiplier applied to the logarithmic volume bonus.
    pub news_score_log_booster: f64,
    /// Exponent applied to item age when computing rank.
    pub rank_aging_factor: f64,
    /// Seconds added to age before exponentiation, softening the early decay.
    pub news_age_padding: i64,
    /// Items older than this (seconds) get rank forced to minus their age.
    pub top_news_age_limit: i64,
    /// Seconds during which the owner may edit or delete a submission.
    pub news_edit_time: i64,
    /// Per-user cooldown between submissions, seconds.
    pub news_submission_break: i64,
    /// Window during which resubmitting an identical URL returns the
    /// original item, seconds.
    pub prevent_repost_time: i64,
    /// Maximum stored length of a comment or text-post body, characters.
    pub comment_max_length: usize,
    pub title_max_length: usize,
    pub text_max_length: usize,
    pub top_news_per_page: i64,
    pub latest_news_per_page: i64,
    pub saved_news_per_page: i64,
    pub user_comments_per_page: i64,
    /// Minimum seconds between visit-driven karma increments.
    pub karma_increment_interval: i64,
    pub karma_increment_amount: i64,
    /// Password reset token lifetime and per-user request cooldown, seconds.
    pub password_reset_delay: i64,
    /// Cooldown between admin recompute-all sweeps, seconds.
    pub admin_recompute_delay: i64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            news_score_log_start: 10,
            news_score_log_booster: 2.0,
            rank_aging_factor: 1.5,
            news_age_padding: 3600,
            top_news_age_limit: 60 * 60 * 24 * 30,
            news_edit_time: 60 * 15,
            news_submission_break: 60 * 15,
            prevent_repost_time: 3600 * 48,
            comment_max_length: 4096,
            title_max_length: 256,
            text_max_length: 8192,
            top_news_per_page: 30,
            latest_news_per_page: 100,
            saved_news_per_page: 10,
            user_comments_per_page: 10,
            karma_increment_interval: 3600 * 3,
            karma_increment_amount: 1,
            password_reset_delay: 3600 * 24,
            admin_recompute_delay: 3600,
        }
    }
}

impl SiteConfig {
    pub fn from_env() -> Self {
        fn i64_env(name: &str, default: i64) -> i64 {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn f64_env(name: &str, default: f64) -> f64 {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        let d = Self::default();
        Self {
            news_score_log_start: i64_env("NEWSRANK_SCORE_LOG_START", d.news_score_log_start),
            news_score_log_booster: f64_env("NEWSRANK_SCORE_LOG_BOOSTER", d.news_score_log_booster),
            rank_aging_factor: f64_env("NEWSRANK_RANK_AGING_FACTOR", d.rank_aging_factor),
            news_age_padding: i64_env("NEWSRANK_AGE_PADDING", d.news_age_padding),
            top_news_age_limit: i64_env("NEWSRANK_TOP_AGE_LIMIT", d.top_news_age_limit),
            news_edit_time: i64_env("NEWSRANK_EDIT_TIME", d.news_edit_time),
            news_submission_break: i64_env("NEWSRANK_SUBMISSION_BREAK", d.news_submission_break),
            prevent_repost_time: i64_env("NEWSRANK_PREVENT_REPOST_TIME", d.prevent_repost_time),
            comment_max_length: usize_env("NEWSRANK_COMMENT_MAX_LENGTH", d.comment_max_length),
            title_max_length: usize_env("NEWSRANK_TITLE_MAX_LENGTH", d.title_max_length),
            text_max_length: usize_env("NEWSRANK_TEXT_MAX_LENGTH", d.text_max_length),
            top_news_per_page: i64_env("NEWSRANK_TOP_PER_PAGE", d.top_news_per_page),
            latest_news_per_page: i64_env("NEWSRANK_LATEST_PER_PAGE", d.latest_news_per_page),
            saved_news_per_page: i64_env("NEWSRANK_SAVED_PER_PAGE", d.saved_news_per_page),
            user_comments_per_page: i64_env("NEWSRANK_USER_COMMENTS_PER_PAGE", d.user_comments_per_page),
            karma_increment_interval: i64_env("NEWSRANK_KARMA_INTERVAL", d.karma_increment_interval),
            karma_increment_amount: i64_env("NEWSRANK_KARMA_AMOUNT", d.karma_increment_amount),
            password_reset_delay: i64_env("NEWSRANK_PASSWORD_RESET_DELAY", d.password_reset_delay),
            admin_recompute_delay: i64_env("NEWSRANK_RECOMPUTE_DELAY", d.admin_recompute_delay),
        }
    }
}
