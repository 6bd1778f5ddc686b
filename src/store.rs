use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("store failure: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Named monotonically-adjustable integers, used to mint sequential ids so
/// they stay stable across storage backends. `increment_counter` must be a
/// single atomic upsert-and-return, never read-then-write.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment_counter(&self, name: &str, by: i64) -> StoreResult<i64>;
    async fn get_counter(&self, name: &str) -> StoreResult<i64>;
}

/// Expiring-key semantics on top of a plain table. A key is active iff its
/// expiry lies in the future; expired rows are lazily purged on check.
/// Check-then-set is deliberately not atomic: a rare double-action within
/// the window is tolerated.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn rate_limit_check(&self, key: &str, now: i64) -> StoreResult<bool>;
    async fn rate_limit_set(&self, key: &str, ttl_seconds: i64, now: i64) -> StoreResult<()>;
    /// Seconds until the key expires, or -1 when absent or already expired.
    async fn rate_limit_ttl(&self, key: &str, now: i64) -> StoreResult<i64>;
}

/// URL -> item mapping with a TTL, backing repost prevention.
#[async_trait]
pub trait RepostStore: Send + Sync {
    async fn url_recently_posted(&self, url: &str, now: i64) -> StoreResult<Option<Id>>;
    async fn set_url_posted(&self, url: &str, news_id: Id, ttl_seconds: i64, now: i64) -> StoreResult<()>;
    async fn clear_url_posted(&self, news_id: Id) -> StoreResult<()>;
}

/// Immutable vote ledger: at most one row per (user, item type, item id);
/// rows are only ever inserted. The store-level uniqueness constraint is the
/// authoritative duplicate guard.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Returns false, writing nothing, when the user already voted on the
    /// item, regardless of direction.
    async fn cast_vote(
        &self,
        user_id: Id,
        item_type: ItemType,
        item_id: Id,
        vote_type: VoteType,
        now: i64,
    ) -> StoreResult<bool>;
    async fn get_vote_counts(&self, item_type: ItemType, item_id: Id) -> StoreResult<(i64, i64)>;
    async fn get_user_vote(
        &self,
        user_id: Id,
        item_type: ItemType,
        item_id: Id,
    ) -> StoreResult<Option<VoteType>>;
}

/// News rows. Every returned `News` carries the author username and live
/// up/down counts; listings order by the denormalized rank or ctime and
/// exclude soft-deleted rows. Listing methods also report the filtered
/// total for pagination.
#[async_trait]
pub trait NewsStore: Send + Sync {
    async fn create_news(&self, new: NewNews) -> StoreResult<News>;
    async fn get_news(&self, id: Id) -> StoreResult<News>;
    async fn top_news(&self, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)>;
    async fn latest_news(&self, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)>;
    async fn posted_news(&self, user_id: Id, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)>;
    /// News the user upvoted, newest vote first.
    async fn saved_news(&self, user_id: Id, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)>;
    async fn update_news(&self, id: Id, upd: UpdateNews) -> StoreResult<()>;
    async fn set_news_score_rank(&self, id: Id, score: f64, rank: f64) -> StoreResult<()>;
    async fn mark_news_deleted(&self, id: Id) -> StoreResult<()>;
    /// Ids of all non-deleted news, for the recompute sweep.
    async fn all_news_ids(&self) -> StoreResult<Vec<Id>>;
}

/// Comment rows for one item. Creation and deletion are multi-statement and
/// must be all-or-nothing: a comment insert also casts the author's upvote,
/// bumps the item's comment count and the parent author's unread-reply
/// counter.
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn create_comment(&self, new: NewComment) -> StoreResult<Comment>;
    async fn get_comment(&self, news_id: Id, comment_id: Id) -> StoreResult<Comment>;
    /// Every comment of the thread, deleted ones included, oldest first.
    async fn thread_comments(&self, news_id: Id) -> StoreResult<Vec<Comment>>;
    async fn set_comment_body(&self, news_id: Id, comment_id: Id, body: &str) -> StoreResult<()>;
    async fn set_comment_score(&self, news_id: Id, comment_id: Id, score: i64) -> StoreResult<()>;
    async fn mark_comment_deleted(&self, news_id: Id, comment_id: Id) -> StoreResult<()>;
    async fn user_comments(&self, user_id: Id, start: i64, count: i64) -> StoreResult<(Vec<Comment>, i64)>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the username is taken (case-insensitive).
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;
    async fn get_user(&self, id: Id) -> StoreResult<User>;
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn get_user_by_auth(&self, auth: &str) -> StoreResult<Option<User>>;
    async fn update_auth_token(&self, user_id: Id, auth: &str) -> StoreResult<()>;
    /// Adds karma; when `incr_time` is given the accrual timestamp is
    /// updated in the same statement.
    async fn increment_karma(&self, user_id: Id, by: i64, incr_time: Option<i64>) -> StoreResult<()>;
    async fn add_user_flags(&self, user_id: Id, flags: &str) -> StoreResult<()>;
    async fn reset_replies(&self, user_id: Id) -> StoreResult<()>;
    async fn update_profile(&self, user_id: Id, upd: UpdateProfile) -> StoreResult<()>;
    async fn create_reset_token(&self, token: &str, user_id: Id, expires_at: i64) -> StoreResult<()>;
    /// Marks the token used and returns its user when it is unused and
    /// unexpired; single atomic statement.
    async fn consume_reset_token(&self, token: &str, now: i64) -> StoreResult<Option<Id>>;
}

pub trait Store:
    CounterStore + RateLimitStore + RepostStore + VoteStore + NewsStore + CommentStore + UserStore
{
}

impl<T> Store for T where
    T: CounterStore + RateLimitStore + RepostStore + VoteStore + NewsStore + CommentStore + UserStore
{
}

/// Generic action throttle over the TTL store: returns the remaining
/// cooldown when the tagged action fired too recently, otherwise arms the
/// cooldown and returns None. The check/set pair is not atomic; a benign
/// race is accepted.
pub async fn rate_limit_by_tags(
    store: &dyn Store,
    delay: i64,
    tags: &[&str],
    now: i64,
) -> StoreResult<Option<i64>> {
    let key = format!("limit:{}", tags.join("."));
    if store.rate_limit_check(&key, now).await? {
        let remaining = store.rate_limit_ttl(&key, now).await?;
        return Ok(Some(remaining.max(0)));
    }
    store.rate_limit_set(&key, delay, now).await?;
    Ok(None)
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    #[derive(Default)]
    struct State {
        users: HashMap<Id, User>,
        news: HashMap<Id, News>,
        comments: HashMap<Id, Comment>,
        votes: Vec<Vote>,
        counters: HashMap<String, i64>,
        rate_limits: HashMap<String, i64>,
        url_posts: HashMap<String, (Id, i64)>,
        reset_tokens: HashMap<String, ResetToken>,
    }

    /// Lock-guarded single-process store, used by the test suite and for
    /// embedded deployments. The multi-statement operations of the Postgres
    /// backend are trivially atomic here because every method holds the
    /// write lock end to end.
    #[derive(Clone, Default)]
    pub struct InMemStore {
        state: Arc<RwLock<State>>,
    }

    impl InMemStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn bump_counter(state: &mut State, name: &str, by: i64) -> i64 {
            let v = state.counters.entry(name.to_string()).or_insert(0);
            *v += by;
            *v
        }

        fn vote_counts(state: &State, item_type: ItemType, item_id: Id) -> (i64, i64) {
            let mut up = 0;
            let mut down = 0;
            for v in &state.votes {
                if v.item_type == item_type && v.item_id == item_id {
                    match v.vote_type {
                        VoteType::Up => up += 1,
                        VoteType::Down => down += 1,
                    }
                }
            }
            (up, down)
        }

        fn username_of(state: &State, user_id: Id) -> String {
            state
                .users
                .get(&user_id)
                .map(|u| u.username.clone())
                .unwrap_or_else(|| "deleted_user".to_string())
        }

        fn news_view(state: &State, news: &News) -> News {
            let (up, down) = Self::vote_counts(state, ItemType::News, news.id);
            News {
                username: Self::username_of(state, news.user_id),
                up,
                down,
                voted: None,
                ..news.clone()
            }
        }

        fn comment_view(state: &State, comment: &Comment) -> Comment {
            let (up, down) = Self::vote_counts(state, ItemType::Comment, comment.id);
            Comment {
                username: Self::username_of(state, comment.user_id),
                up,
                down,
                ..comment.clone()
            }
        }
    }

    #[async_trait]
    impl CounterStore for InMemStore {
        async fn increment_counter(&self, name: &str, by: i64) -> StoreResult<i64> {
            let mut s = self.state.write().unwrap();
            Ok(Self::bump_counter(&mut s, name, by))
        }

        async fn get_counter(&self, name: &str) -> StoreResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.counters.get(name).copied().unwrap_or(0))
        }
    }

    #[async_trait]
    impl RateLimitStore for InMemStore {
        async fn rate_limit_check(&self, key: &str, now: i64) -> StoreResult<bool> {
            let mut s = self.state.write().unwrap();
            s.rate_limits.retain(|_, exp| *exp > now);
            Ok(s.rate_limits.contains_key(key))
        }

        async fn rate_limit_set(&self, key: &str, ttl_seconds: i64, now: i64) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            s.rate_limits.insert(key.to_string(), now + ttl_seconds);
            Ok(())
        }

        async fn rate_limit_ttl(&self, key: &str, now: i64) -> StoreResult<i64> {
            let s = self.state.read().unwrap();
            match s.rate_limits.get(key) {
                Some(exp) if *exp > now => Ok(exp - now),
                _ => Ok(-1),
            }
        }
    }

    #[async_trait]
    impl RepostStore for InMemStore {
        async fn url_recently_posted(&self, url: &str, now: i64) -> StoreResult<Option<Id>> {
            let mut s = self.state.write().unwrap();
            s.url_posts.retain(|_, (_, exp)| *exp > now);
            Ok(s.url_posts.get(url).map(|(id, _)| *id))
        }

        async fn set_url_posted(
            &self,
            url: &str,
            news_id: Id,
            ttl_seconds: i64,
            now: i64,
        ) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            s.url_posts.insert(url.to_string(), (news_id, now + ttl_seconds));
            Ok(())
        }

        async fn clear_url_posted(&self, news_id: Id) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            s.url_posts.retain(|_, (id, _)| *id != news_id);
            Ok(())
        }
    }

    #[async_trait]
    impl VoteStore for InMemStore {
        async fn cast_vote(
            &self,
            user_id: Id,
            item_type: ItemType,
            item_id: Id,
            vote_type: VoteType,
            now: i64,
        ) -> StoreResult<bool> {
            let mut s = self.state.write().unwrap();
            let exists = s
                .votes
                .iter()
                .any(|v| v.user_id == user_id && v.item_type == item_type && v.item_id == item_id);
            if exists {
                return Ok(false);
            }
            s.votes.push(Vote { user_id, item_type, item_id, vote_type, ctime: now });
            Ok(true)
        }

        async fn get_vote_counts(&self, item_type: ItemType, item_id: Id) -> StoreResult<(i64, i64)> {
            let s = self.state.read().unwrap();
            Ok(Self::vote_counts(&s, item_type, item_id))
        }

        async fn get_user_vote(
            &self,
            user_id: Id,
            item_type: ItemType,
            item_id: Id,
        ) -> StoreResult<Option<VoteType>> {
            let s = self.state.read().unwrap();
            Ok(s.votes
                .iter()
                .find(|v| v.user_id == user_id && v.item_type == item_type && v.item_id == item_id)
                .map(|v| v.vote_type))
        }
    }

    #[async_trait]
    impl NewsStore for InMemStore {
        async fn create_news(&self, new: NewNews) -> StoreResult<News> {
            let mut s = self.state.write().unwrap();
            let id = Self::bump_counter(&mut s, "news_count", 1);
            let news = News {
                id,
                title: new.title,
                url: new.url,
                user_id: new.user_id,
                username: String::new(),
                ctime: new.ctime,
                score: 0.0,
                rank: 0.0,
                up: 0,
                down: 0,
                comments: 0,
                del: false,
                voted: None,
            };
            s.news.insert(id, news.clone());
            Ok(Self::news_view(&s, &news))
        }

        async fn get_news(&self, id: Id) -> StoreResult<News> {
            let s = self.state.read().unwrap();
            let news = s.news.get(&id).ok_or(StoreError::NotFound)?;
            Ok(Self::news_view(&s, news))
        }

        async fn top_news(&self, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)> {
            let s = self.state.read().unwrap();
            let mut all: Vec<&News> = s.news.values().filter(|n| !n.del).collect();
            let total = all.len() as i64;
            all.sort_by(|a, b| b.rank.partial_cmp(&a.rank).unwrap_or(std::cmp::Ordering::Equal));
            let page = all
                .into_iter()
                .skip(start.max(0) as usize)
                .take(count.max(0) as usize)
                .map(|n| Self::news_view(&s, n))
                .collect();
            Ok((page, total))
        }

        async fn latest_news(&self, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)> {
            let s = self.state.read().unwrap();
            let mut all: Vec<&News> = s.news.values().filter(|n| !n.del).collect();
            let total = all.len() as i64;
            all.sort_by(|a, b| b.ctime.cmp(&a.ctime).then(b.id.cmp(&a.id)));
            let page = all
                .into_iter()
                .skip(start.max(0) as usize)
                .take(count.max(0) as usize)
                .map(|n| Self::news_view(&s, n))
                .collect();
            Ok((page, total))
        }

        async fn posted_news(&self, user_id: Id, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)> {
            let s = self.state.read().unwrap();
            let mut all: Vec<&News> =
                s.news.values().filter(|n| !n.del && n.user_id == user_id).collect();
            let total = all.len() as i64;
            all.sort_by(|a, b| b.ctime.cmp(&a.ctime).then(b.id.cmp(&a.id)));
            let page = all
                .into_iter()
                .skip(start.max(0) as usize)
                .take(count.max(0) as usize)
                .map(|n| Self::news_view(&s, n))
                .collect();
            Ok((page, total))
        }

        async fn saved_news(&self, user_id: Id, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)> {
            let s = self.state.read().unwrap();
            let mut saved: Vec<(&Vote, &News)> = s
                .votes
                .iter()
                .filter(|v| {
                    v.user_id == user_id
                        && v.item_type == ItemType::News
                        && v.vote_type == VoteType::Up
                })
                .filter_map(|v| s.news.get(&v.item_id).filter(|n| !n.del).map(|n| (v, n)))
                .collect();
            let total = saved.len() as i64;
            saved.sort_by(|a, b| b.0.ctime.cmp(&a.0.ctime).then(b.1.id.cmp(&a.1.id)));
            let page = saved
                .into_iter()
                .skip(start.max(0) as usize)
                .take(count.max(0) as usize)
                .map(|(_, n)| Self::news_view(&s, n))
                .collect();
            Ok((page, total))
        }

        async fn update_news(&self, id: Id, upd: UpdateNews) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            let news = s.news.get_mut(&id).ok_or(StoreError::NotFound)?;
            news.title = upd.title;
            news.url = upd.url;
            Ok(())
        }

        async fn set_news_score_rank(&self, id: Id, score: f64, rank: f64) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            let news = s.news.get_mut(&id).ok_or(StoreError::NotFound)?;
            news.score = score;
            news.rank = rank;
            Ok(())
        }

        async fn mark_news_deleted(&self, id: Id) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            let news = s.news.get_mut(&id).ok_or(StoreError::NotFound)?;
            news.del = true;
            Ok(())
        }

        async fn all_news_ids(&self) -> StoreResult<Vec<Id>> {
            let s = self.state.read().unwrap();
            let mut ids: Vec<Id> = s.news.values().filter(|n| !n.del).map(|n| n.id).collect();
            ids.sort_unstable();
            Ok(ids)
        }
    }

    #[async_trait]
    impl CommentStore for InMemStore {
        async fn create_comment(&self, new: NewComment) -> StoreResult<Comment> {
            let mut s = self.state.write().unwrap();
            if !s.news.contains_key(&new.news_id) {
                return Err(StoreError::NotFound);
            }
            let parent_author = if new.parent_id != ROOT_PARENT {
                let parent = s
                    .comments
                    .get(&new.parent_id)
                    .filter(|c| c.news_id == new.news_id)
                    .ok_or(StoreError::NotFound)?;
                Some(parent.user_id)
            } else {
                None
            };
            let id = Self::bump_counter(&mut s, "comments_count", 1);
            let comment = Comment {
                id,
                news_id: new.news_id,
                parent_id: new.parent_id,
                user_id: new.user_id,
                username: String::new(),
                body: new.body,
                ctime: new.ctime,
                score: 0,
                up: 0,
                down: 0,
                del: false,
            };
            s.comments.insert(id, comment.clone());
            // author auto-upvote
            s.votes.push(Vote {
                user_id: new.user_id,
                item_type: ItemType::Comment,
                item_id: id,
                vote_type: VoteType::Up,
                ctime: new.ctime,
            });
            if let Some(n) = s.news.get_mut(&new.news_id) {
                n.comments += 1;
            }
            if let Some(author) = parent_author {
                if author != new.user_id {
                    if let Some(u) = s.users.get_mut(&author) {
                        u.replies += 1;
                    }
                }
            }
            Ok(Self::comment_view(&s, &comment))
        }

        async fn get_comment(&self, news_id: Id, comment_id: Id) -> StoreResult<Comment> {
            let s = self.state.read().unwrap();
            let comment = s
                .comments
                .get(&comment_id)
                .filter(|c| c.news_id == news_id)
                .ok_or(StoreError::NotFound)?;
            Ok(Self::comment_view(&s, comment))
        }

        async fn thread_comments(&self, news_id: Id) -> StoreResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            let mut out: Vec<Comment> = s
                .comments
                .values()
                .filter(|c| c.news_id == news_id)
                .map(|c| Self::comment_view(&s, c))
                .collect();
            out.sort_by(|a, b| a.ctime.cmp(&b.ctime).then(a.id.cmp(&b.id)));
            Ok(out)
        }

        async fn set_comment_body(&self, news_id: Id, comment_id: Id, body: &str) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            let comment = s
                .comments
                .get_mut(&comment_id)
                .filter(|c| c.news_id == news_id)
                .ok_or(StoreError::NotFound)?;
            comment.body = body.to_string();
            Ok(())
        }

        async fn set_comment_score(&self, news_id: Id, comment_id: Id, score: i64) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            let comment = s
                .comments
                .get_mut(&comment_id)
                .filter(|c| c.news_id == news_id)
                .ok_or(StoreError::NotFound)?;
            comment.score = score;
            Ok(())
        }

        async fn mark_comment_deleted(&self, news_id: Id, comment_id: Id) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            let comment = s
                .comments
                .get_mut(&comment_id)
                .filter(|c| c.news_id == news_id)
                .ok_or(StoreError::NotFound)?;
            if !comment.del {
                comment.del = true;
                if let Some(n) = s.news.get_mut(&news_id) {
                    n.comments -= 1;
                }
            }
            Ok(())
        }

        async fn user_comments(&self, user_id: Id, start: i64, count: i64) -> StoreResult<(Vec<Comment>, i64)> {
            let s = self.state.read().unwrap();
            let mut all: Vec<&Comment> = s
                .comments
                .values()
                .filter(|c| c.user_id == user_id && !c.del)
                .collect();
            let total = all.len() as i64;
            all.sort_by(|a, b| b.ctime.cmp(&a.ctime).then(b.id.cmp(&a.id)));
            let page = all
                .into_iter()
                .skip(start.max(0) as usize)
                .take(count.max(0) as usize)
                .map(|c| Self::comment_view(&s, c))
                .collect();
            Ok((page, total))
        }
    }

    #[async_trait]
    impl UserStore for InMemStore {
        async fn create_user(&self, new: NewUser) -> StoreResult<User> {
            let mut s = self.state.write().unwrap();
            let taken = s
                .users
                .values()
                .any(|u| u.username.eq_ignore_ascii_case(&new.username));
            if taken {
                return Err(StoreError::Conflict);
            }
            let id = Self::bump_counter(&mut s, "users_count", 1);
            let user = User {
                id,
                username: new.username,
                email: new.email,
                about: String::new(),
                password_hash: new.password_hash,
                ctime: new.ctime,
                karma: 1,
                flags: String::new(),
                auth: new.auth,
                apisecret: new.apisecret,
                karma_incr_time: new.ctime,
                replies: 0,
            };
            s.users.insert(id, user.clone());
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> StoreResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(StoreError::NotFound)
        }

        async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users
                .values()
                .find(|u| u.username.eq_ignore_ascii_case(username))
                .cloned())
        }

        async fn get_user_by_auth(&self, auth: &str) -> StoreResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().find(|u| u.auth == auth).cloned())
        }

        async fn update_auth_token(&self, user_id: Id, auth: &str) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
            user.auth = auth.to_string();
            Ok(())
        }

        async fn increment_karma(&self, user_id: Id, by: i64, incr_time: Option<i64>) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
            user.karma += by;
            if let Some(t) = incr_time {
                user.karma_incr_time = t;
            }
            Ok(())
        }

        async fn add_user_flags(&self, user_id: Id, flags: &str) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
            for f in flags.chars() {
                if !user.flags.contains(f) {
                    user.flags.push(f);
                }
            }
            Ok(())
        }

        async fn reset_replies(&self, user_id: Id) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
            user.replies = 0;
            Ok(())
        }

        async fn update_profile(&self, user_id: Id, upd: UpdateProfile) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
            if let Some(email) = upd.email {
                user.email = email;
            }
            if let Some(about) = upd.about {
                user.about = about;
            }
            Ok(())
        }

        async fn create_reset_token(&self, token: &str, user_id: Id, expires_at: i64) -> StoreResult<()> {
            let mut s = self.state.write().unwrap();
            if !s.users.contains_key(&user_id) {
                return Err(StoreError::NotFound);
            }
            s.reset_tokens.insert(
                token.to_string(),
                ResetToken { token: token.to_string(), user_id, expires_at, used: false },
            );
            Ok(())
        }

        async fn consume_reset_token(&self, token: &str, now: i64) -> StoreResult<Option<Id>> {
            let mut s = self.state.write().unwrap();
            match s.reset_tokens.get_mut(token) {
                Some(t) if !t.used && t.expires_at > now => {
                    t.used = true;
                    Ok(Some(t.user_id))
                }
                _ => Ok(None),
            }
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres, Row};

    #[derive(Clone)]
    pub struct PgStore {
        pool: Pool<Postgres>,
    }

    fn map_err(e: sqlx::Error) -> StoreError {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Internal(other.into()),
        }
    }

    const NEWS_SELECT: &str = r#"
        SELECT n.id, n.title, n.url, n.user_id,
               COALESCE(u.username, 'deleted_user') AS username,
               n.ctime, n.score, n.rank,
               (SELECT COUNT(*) FROM votes v
                 WHERE v.item_type = 'news' AND v.item_id = n.id AND v.vote_type = 'up') AS up,
               (SELECT COUNT(*) FROM votes v
                 WHERE v.item_type = 'news' AND v.item_id = n.id AND v.vote_type = 'down') AS down,
               n.comments, n.del
        FROM news n
        LEFT JOIN users u ON u.id = n.user_id
    "#;

    const COMMENT_SELECT: &str = r#"
        SELECT c.id, c.news_id, c.parent_id, c.user_id,
               COALESCE(u.username, 'deleted_user') AS username,
               c.body, c.ctime, c.score,
               (SELECT COUNT(*) FROM votes v
                 WHERE v.item_type = 'comment' AND v.item_id = c.id AND v.vote_type = 'up') AS up,
               (SELECT COUNT(*) FROM votes v
                 WHERE v.item_type = 'comment' AND v.item_id = c.id AND v.vote_type = 'down') AS down,
               c.del
        FROM comments c
        LEFT JOIN users u ON u.id = c.user_id
    "#;

    impl PgStore {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }

        pub async fn migrate(&self) -> StoreResult<()> {
            sqlx::migrate!("./migrations")
                .run(&self.pool)
                .await
                .map_err(|e| StoreError::Internal(e.into()))
        }
    }

    #[async_trait]
    impl CounterStore for PgStore {
        async fn increment_counter(&self, name: &str, by: i64) -> StoreResult<i64> {
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO counters (name, value) VALUES ($1, $2)
                 ON CONFLICT (name) DO UPDATE SET value = counters.value + EXCLUDED.value
                 RETURNING value",
            )
            .bind(name)
            .bind(by)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn get_counter(&self, name: &str) -> StoreResult<i64> {
            sqlx::query_scalar::<_, Option<i64>>("SELECT value FROM counters WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)
                .map(|v| v.flatten().unwrap_or(0))
        }
    }

    #[async_trait]
    impl RateLimitStore for PgStore {
        async fn rate_limit_check(&self, key: &str, now: i64) -> StoreResult<bool> {
            sqlx::query("DELETE FROM rate_limits WHERE expires_at <= $1")
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM rate_limits WHERE key_name = $1 AND expires_at > $2)",
            )
            .bind(key)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn rate_limit_set(&self, key: &str, ttl_seconds: i64, now: i64) -> StoreResult<()> {
            sqlx::query(
                "INSERT INTO rate_limits (key_name, expires_at) VALUES ($1, $2)
                 ON CONFLICT (key_name) DO UPDATE SET expires_at = EXCLUDED.expires_at",
            )
            .bind(key)
            .bind(now + ttl_seconds)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(())
        }

        async fn rate_limit_ttl(&self, key: &str, now: i64) -> StoreResult<i64> {
            let expires = sqlx::query_scalar::<_, i64>(
                "SELECT expires_at FROM rate_limits WHERE key_name = $1",
            )
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(match expires {
                Some(e) if e > now => e - now,
                _ => -1,
            })
        }
    }

    #[async_trait]
    impl RepostStore for PgStore {
        async fn url_recently_posted(&self, url: &str, now: i64) -> StoreResult<Option<Id>> {
            sqlx::query("DELETE FROM url_posts WHERE expires_at <= $1")
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            sqlx::query_scalar::<_, i64>(
                "SELECT news_id FROM url_posts WHERE url = $1 AND expires_at > $2",
            )
            .bind(url)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn set_url_posted(
            &self,
            url: &str,
            news_id: Id,
            ttl_seconds: i64,
            now: i64,
        ) -> StoreResult<()> {
            sqlx::query(
                "INSERT INTO url_posts (url, news_id, expires_at) VALUES ($1, $2, $3)
                 ON CONFLICT (url) DO UPDATE
                 SET news_id = EXCLUDED.news_id, expires_at = EXCLUDED.expires_at",
            )
            .bind(url)
            .bind(news_id)
            .bind(now + ttl_seconds)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(())
        }

        async fn clear_url_posted(&self, news_id: Id) -> StoreResult<()> {
            sqlx::query("DELETE FROM url_posts WHERE news_id = $1")
                .bind(news_id)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(())
        }
    }

    #[async_trait]
    impl VoteStore for PgStore {
        async fn cast_vote(
            &self,
            user_id: Id,
            item_type: ItemType,
            item_id: Id,
            vote_type: VoteType,
            now: i64,
        ) -> StoreResult<bool> {
            // The unique constraint is the sole duplicate guard; no pre-check.
            let res = sqlx::query(
                "INSERT INTO votes (user_id, item_type, item_id, vote_type, ctime)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (user_id, item_type, item_id) DO NOTHING",
            )
            .bind(user_id)
            .bind(item_type.as_str())
            .bind(item_id)
            .bind(vote_type.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(res.rows_affected() == 1)
        }

        async fn get_vote_counts(&self, item_type: ItemType, item_id: Id) -> StoreResult<(i64, i64)> {
            let row = sqlx::query(
                "SELECT
                   COUNT(*) FILTER (WHERE vote_type = 'up') AS up,
                   COUNT(*) FILTER (WHERE vote_type = 'down') AS down
                 FROM votes WHERE item_type = $1 AND item_id = $2",
            )
            .bind(item_type.as_str())
            .bind(item_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
            Ok((row.get::<i64, _>("up"), row.get::<i64, _>("down")))
        }

        async fn get_user_vote(
            &self,
            user_id: Id,
            item_type: ItemType,
            item_id: Id,
        ) -> StoreResult<Option<VoteType>> {
            let vt = sqlx::query_scalar::<_, String>(
                "SELECT vote_type FROM votes
                 WHERE user_id = $1 AND item_type = $2 AND item_id = $3",
            )
            .bind(user_id)
            .bind(item_type.as_str())
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(vt.as_deref().and_then(VoteType::parse))
        }
    }

    #[async_trait]
    impl NewsStore for PgStore {
        async fn create_news(&self, new: NewNews) -> StoreResult<News> {
            let id = self.increment_counter("news_count", 1).await?;
            sqlx::query(
                "INSERT INTO news (id, title, url, user_id, ctime, score, rank, comments, del)
                 VALUES ($1, $2, $3, $4, $5, 0, 0, 0, FALSE)",
            )
            .bind(id)
            .bind(&new.title)
            .bind(&new.url)
            .bind(new.user_id)
            .bind(new.ctime)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            self.get_news(id).await
        }

        async fn get_news(&self, id: Id) -> StoreResult<News> {
            sqlx::query_as::<_, News>(&format!("{NEWS_SELECT} WHERE n.id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn top_news(&self, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)> {
            let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM news WHERE del = FALSE")
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;
            let rows = sqlx::query_as::<_, News>(&format!(
                "{NEWS_SELECT} WHERE n.del = FALSE ORDER BY n.rank DESC, n.id DESC LIMIT $1 OFFSET $2"
            ))
            .bind(count)
            .bind(start.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
            Ok((rows, total))
        }

        async fn latest_news(&self, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)> {
            let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM news WHERE del = FALSE")
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;
            let rows = sqlx::query_as::<_, News>(&format!(
                "{NEWS_SELECT} WHERE n.del = FALSE ORDER BY n.ctime DESC, n.id DESC LIMIT $1 OFFSET $2"
            ))
            .bind(count)
            .bind(start.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
            Ok((rows, total))
        }

        async fn posted_news(&self, user_id: Id, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)> {
            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM news WHERE del = FALSE AND user_id = $1",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
            let rows = sqlx::query_as::<_, News>(&format!(
                "{NEWS_SELECT} WHERE n.del = FALSE AND n.user_id = $1
                 ORDER BY n.ctime DESC, n.id DESC LIMIT $2 OFFSET $3"
            ))
            .bind(user_id)
            .bind(count)
            .bind(start.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
            Ok((rows, total))
        }

        async fn saved_news(&self, user_id: Id, start: i64, count: i64) -> StoreResult<(Vec<News>, i64)> {
            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM votes v
                 JOIN news n ON n.id = v.item_id
                 WHERE v.user_id = $1 AND v.item_type = 'news'
                   AND v.vote_type = 'up' AND n.del = FALSE",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
            let rows = sqlx::query_as::<_, News>(&format!(
                "{NEWS_SELECT}
                 JOIN votes sv ON sv.item_type = 'news' AND sv.item_id = n.id
                 WHERE sv.user_id = $1 AND sv.vote_type = 'up' AND n.del = FALSE
                 ORDER BY sv.ctime DESC, n.id DESC LIMIT $2 OFFSET $3"
            ))
            .bind(user_id)
            .bind(count)
            .bind(start.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
            Ok((rows, total))
        }

        async fn update_news(&self, id: Id, upd: UpdateNews) -> StoreResult<()> {
            let res = sqlx::query("UPDATE news SET title = $2, url = $3 WHERE id = $1")
                .bind(id)
                .bind(&upd.title)
                .bind(&upd.url)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }

        async fn set_news_score_rank(&self, id: Id, score: f64, rank: f64) -> StoreResult<()> {
            sqlx::query("UPDATE news SET score = $2, rank = $3 WHERE id = $1")
                .bind(id)
                .bind(score)
                .bind(rank)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(())
        }

        async fn mark_news_deleted(&self, id: Id) -> StoreResult<()> {
            let res = sqlx::query("UPDATE news SET del = TRUE WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }

        async fn all_news_ids(&self) -> StoreResult<Vec<Id>> {
            sqlx::query_scalar::<_, i64>("SELECT id FROM news WHERE del = FALSE ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)
        }
    }

    #[async_trait]
    impl CommentStore for PgStore {
        async fn create_comment(&self, new: NewComment) -> StoreResult<Comment> {
            let id = self.increment_counter("comments_count", 1).await?;
            let mut tx = self.pool.begin().await.map_err(map_err)?;

            let news_exists =
                sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM news WHERE id = $1)")
                    .bind(new.news_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_err)?;
            if !news_exists {
                return Err(StoreError::NotFound);
            }

            let parent_author = if new.parent_id != ROOT_PARENT {
                let author = sqlx::query_scalar::<_, i64>(
                    "SELECT user_id FROM comments WHERE id = $1 AND news_id = $2",
                )
                .bind(new.parent_id)
                .bind(new.news_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_err)?;
                match author {
                    Some(a) => Some(a),
                    None => return Err(StoreError::NotFound),
                }
            } else {
                None
            };

            sqlx::query(
                "INSERT INTO comments (id, news_id, parent_id, user_id, body, ctime, score, del)
                 VALUES ($1, $2, $3, $4, $5, $6, 0, FALSE)",
            )
            .bind(id)
            .bind(new.news_id)
            .bind(new.parent_id)
            .bind(new.user_id)
            .bind(&new.body)
            .bind(new.ctime)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

            // author auto-upvote, inside the same transaction
            sqlx::query(
                "INSERT INTO votes (user_id, item_type, item_id, vote_type, ctime)
                 VALUES ($1, 'comment', $2, 'up', $3)
                 ON CONFLICT (user_id, item_type, item_id) DO NOTHING",
            )
            .bind(new.user_id)
            .bind(id)
            .bind(new.ctime)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

            sqlx::query("UPDATE news SET comments = comments + 1 WHERE id = $1")
                .bind(new.news_id)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;

            if let Some(author) = parent_author {
                if author != new.user_id {
                    sqlx::query("UPDATE users SET replies = replies + 1 WHERE id = $1")
                        .bind(author)
                        .execute(&mut *tx)
                        .await
                        .map_err(map_err)?;
                }
            }

            tx.commit().await.map_err(map_err)?;
            self.get_comment(new.news_id, id).await
        }

        async fn get_comment(&self, news_id: Id, comment_id: Id) -> StoreResult<Comment> {
            sqlx::query_as::<_, Comment>(&format!(
                "{COMMENT_SELECT} WHERE c.id = $1 AND c.news_id = $2"
            ))
            .bind(comment_id)
            .bind(news_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn thread_comments(&self, news_id: Id) -> StoreResult<Vec<Comment>> {
            sqlx::query_as::<_, Comment>(&format!(
                "{COMMENT_SELECT} WHERE c.news_id = $1 ORDER BY c.ctime ASC, c.id ASC"
            ))
            .bind(news_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn set_comment_body(&self, news_id: Id, comment_id: Id, body: &str) -> StoreResult<()> {
            let res = sqlx::query(
                "UPDATE comments SET body = $3 WHERE id = $1 AND news_id = $2",
            )
            .bind(comment_id)
            .bind(news_id)
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }

        async fn set_comment_score(&self, news_id: Id, comment_id: Id, score: i64) -> StoreResult<()> {
            sqlx::query("UPDATE comments SET score = $3 WHERE id = $1 AND news_id = $2")
                .bind(comment_id)
                .bind(news_id)
                .bind(score)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(())
        }

        async fn mark_comment_deleted(&self, news_id: Id, comment_id: Id) -> StoreResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let res = sqlx::query(
                "UPDATE comments SET del = TRUE
                 WHERE id = $1 AND news_id = $2 AND del = FALSE",
            )
            .bind(comment_id)
            .bind(news_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
            if res.rows_affected() == 1 {
                sqlx::query("UPDATE news SET comments = comments - 1 WHERE id = $1")
                    .bind(news_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_err)?;
            }
            tx.commit().await.map_err(map_err)?;
            Ok(())
        }

        async fn user_comments(&self, user_id: Id, start: i64, count: i64) -> StoreResult<(Vec<Comment>, i64)> {
            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM comments WHERE user_id = $1 AND del = FALSE",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
            let rows = sqlx::query_as::<_, Comment>(&format!(
                "{COMMENT_SELECT} WHERE c.user_id = $1 AND c.del = FALSE
                 ORDER BY c.ctime DESC, c.id DESC LIMIT $2 OFFSET $3"
            ))
            .bind(user_id)
            .bind(count)
            .bind(start.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
            Ok((rows, total))
        }
    }

    #[async_trait]
    impl UserStore for PgStore {
        async fn create_user(&self, new: NewUser) -> StoreResult<User> {
            let taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(username) = LOWER($1))",
            )
            .bind(&new.username)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
            if taken {
                return Err(StoreError::Conflict);
            }
            let id = self.increment_counter("users_count", 1).await?;
            sqlx::query(
                "INSERT INTO users (id, username, email, about, password_hash, ctime, karma,
                                    flags, auth, apisecret, karma_incr_time, replies)
                 VALUES ($1, $2, $3, '', $4, $5, 1, '', $6, $7, $5, 0)",
            )
            .bind(id)
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.ctime)
            .bind(&new.auth)
            .bind(&new.apisecret)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict,
                other => map_err(other),
            })?;
            self.get_user(id).await
        }

        async fn get_user(&self, id: Id) -> StoreResult<User> {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(username) = LOWER($1)")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn get_user_by_auth(&self, auth: &str) -> StoreResult<Option<User>> {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE auth = $1")
                .bind(auth)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn update_auth_token(&self, user_id: Id, auth: &str) -> StoreResult<()> {
            let res = sqlx::query("UPDATE users SET auth = $2 WHERE id = $1")
                .bind(user_id)
                .bind(auth)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }

        async fn increment_karma(&self, user_id: Id, by: i64, incr_time: Option<i64>) -> StoreResult<()> {
            let res = match incr_time {
                Some(t) => sqlx::query(
                    "UPDATE users SET karma = karma + $2, karma_incr_time = $3 WHERE id = $1",
                )
                .bind(user_id)
                .bind(by)
                .bind(t)
                .execute(&self.pool)
                .await
                .map_err(map_err)?,
                None => sqlx::query("UPDATE users SET karma = karma + $2 WHERE id = $1")
                    .bind(user_id)
                    .bind(by)
                    .execute(&self.pool)
                    .await
                    .map_err(map_err)?,
            };
            if res.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }

        async fn add_user_flags(&self, user_id: Id, flags: &str) -> StoreResult<()> {
            let user = self.get_user(user_id).await?;
            let mut newflags = user.flags;
            for f in flags.chars() {
                if !newflags.contains(f) {
                    newflags.push(f);
                }
            }
            sqlx::query("UPDATE users SET flags = $2 WHERE id = $1")
                .bind(user_id)
                .bind(&newflags)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(())
        }

        async fn reset_replies(&self, user_id: Id) -> StoreResult<()> {
            sqlx::query("UPDATE users SET replies = 0 WHERE id = $1")
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(())
        }

        async fn update_profile(&self, user_id: Id, upd: UpdateProfile) -> StoreResult<()> {
            let res = sqlx::query(
                "UPDATE users SET email = COALESCE($2, email), about = COALESCE($3, about)
                 WHERE id = $1",
            )
            .bind(user_id)
            .bind(upd.email)
            .bind(upd.about)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }

        async fn create_reset_token(&self, token: &str, user_id: Id, expires_at: i64) -> StoreResult<()> {
            sqlx::query(
                "INSERT INTO password_reset_tokens (token, user_id, expires_at, used)
                 VALUES ($1, $2, $3, FALSE)",
            )
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(())
        }

        async fn consume_reset_token(&self, token: &str, now: i64) -> StoreResult<Option<Id>> {
            sqlx::query_scalar::<_, i64>(
                "UPDATE password_reset_tokens SET used = TRUE
                 WHERE token = $1 AND used = FALSE AND expires_at > $2
                 RETURNING user_id",
            )
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)
        }
    }
}
