use chrono::Utc;
use serde::{Deserialize, Serialize};

pub type Id = i64;

/// Parent id marking a top-level comment.
pub const ROOT_PARENT: Id = -1;

/// Current wall-clock time as epoch seconds. All persisted timestamps use
/// this representation; engines take `now` explicitly so tests stay
/// deterministic.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    News,
    Comment,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::News => "news",
            ItemType::Comment => "comment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Up => "up",
            VoteType::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(VoteType::Up),
            "down" => Some(VoteType::Down),
            _ => None,
        }
    }
}

/// A submitted story. `url` is either a real http(s) URL or a synthetic
/// `text://` marker carrying the truncated body of a text post; the two
/// representations are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct News {
    pub id: Id,
    pub title: String,
    pub url: String,
    pub user_id: Id,
    pub username: String,
    pub ctime: i64,
    pub score: f64,
    pub rank: f64,
    /// Live upvote count, attached by the store on every read.
    pub up: i64,
    /// Live downvote count, attached by the store on every read.
    pub down: i64,
    /// Denormalized comment count.
    pub comments: i64,
    pub del: bool,
    /// The requesting user's own vote, annotated by the policy layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "postgres-store", sqlx(skip))]
    pub voted: Option<VoteType>,
}

impl News {
    pub fn is_text_post(&self) -> bool {
        self.url.starts_with("text://")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNews {
    pub title: String,
    pub url: String,
    pub user_id: Id,
    pub ctime: i64,
}

/// Typed update payload for a news row; only title and url are mutable
/// after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNews {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Comment {
    pub id: Id,
    pub news_id: Id,
    /// -1 for a top-level comment.
    pub parent_id: Id,
    pub user_id: Id,
    pub username: String,
    pub body: String,
    pub ctime: i64,
    /// Denormalized score, refreshed on every successful comment vote.
    pub score: i64,
    pub up: i64,
    pub down: i64,
    pub del: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub news_id: Id,
    pub parent_id: Id,
    pub user_id: Id,
    pub body: String,
    pub ctime: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub user_id: Id,
    pub item_type: ItemType,
    pub item_id: Id,
    pub vote_type: VoteType,
    pub ctime: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub about: String,
    /// Opaque credential material; hashing happens outside the core.
    pub password_hash: String,
    pub ctime: i64,
    pub karma: i64,
    /// Flag characters: 'a' administrator, 'k' karma source, 'n' new-window links.
    pub flags: String,
    pub auth: String,
    pub apisecret: String,
    pub karma_incr_time: i64,
    /// Unread replies to this user's comments.
    pub replies: i64,
}

impl User {
    pub fn has_flags(&self, flags: &str) -> bool {
        flags.chars().all(|f| self.flags.contains(f))
    }

    pub fn is_admin(&self) -> bool {
        self.has_flags("a")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub auth: String,
    pub apisecret: String,
    pub ctime: i64,
}

/// Typed profile update; the fixed field set replaces the original
/// string-keyed per-row updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub email: Option<String>,
    pub about: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct ResetToken {
    pub token: String,
    pub user_id: Id,
    pub expires_at: i64,
    pub used: bool,
}

/// Request-scoped caller context, built once per request from an auth token
/// lookup and read-only afterwards. Replaces the process-wide current-user
/// singleton of the original system.
#[derive(Debug, Clone, Default)]
pub struct RequestCtx {
    pub user: Option<User>,
}

impl RequestCtx {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn authenticated(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn user_id(&self) -> Option<Id> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().map(|u| u.is_admin()).unwrap_or(false)
    }
}
