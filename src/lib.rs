pub mod comments;
pub mod config;
pub mod error;
pub mod models;
pub mod news;
pub mod page;
pub mod ranking;
pub mod store;
pub mod users;

// Re-export commonly used items for tests / external users
pub use config::SiteConfig;
pub use error::{CoreError, CoreResult};
pub use models::{Id, ItemType, RequestCtx, VoteType};
pub use store::Store;
