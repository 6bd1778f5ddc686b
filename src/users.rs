use rand::RngCore;
use tracing::info;

use crate::config::SiteConfig;
use crate::error::{CoreError, CoreResult};
use crate::models::{Id, NewUser, RequestCtx, UpdateProfile, User};
use crate::store::{Store, StoreError};

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Signup payload; the password hash is produced by the external credential
/// layer and stored opaquely.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub username: String,
    pub password_hash: String,
    pub email: String,
}

pub async fn create_user(store: &dyn Store, signup: SignUp, now: i64) -> CoreResult<User> {
    let username = signup.username.trim();
    if username.is_empty() {
        return Err(CoreError::validation("username cannot be empty"));
    }
    let user = store
        .create_user(NewUser {
            username: username.to_string(),
            password_hash: signup.password_hash,
            email: signup.email,
            auth: random_hex(20),
            apisecret: random_hex(20),
            ctime: now,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict => CoreError::validation("username already exists"),
            other => other.into(),
        })?;
    info!(user_id = user.id, "user created");
    Ok(user)
}

/// Auth-token lookup used by the session collaborator to build the request
/// context; an unknown token is an absence, not an error.
pub async fn authenticate(store: &dyn Store, auth: &str) -> CoreResult<Option<User>> {
    if auth.is_empty() {
        return Ok(None);
    }
    Ok(store.get_user_by_auth(auth).await?)
}

/// Rotates the auth token, invalidating the old session; returns the new
/// token.
pub async fn update_auth_token(store: &dyn Store, user_id: Id) -> CoreResult<String> {
    let auth = random_hex(20);
    store.update_auth_token(user_id, &auth).await?;
    Ok(auth)
}

/// Visit-driven karma accrual: at most once per configured interval.
pub async fn increment_karma_if_needed(
    store: &dyn Store,
    user: &User,
    now: i64,
    cfg: &SiteConfig,
) -> CoreResult<bool> {
    if user.karma_incr_time >= now - cfg.karma_increment_interval {
        return Ok(false);
    }
    store
        .increment_karma(user.id, cfg.karma_increment_amount, Some(now))
        .await?;
    Ok(true)
}

/// Admin-only flag grant ('a' makes the target an administrator).
pub async fn add_flags(
    store: &dyn Store,
    ctx: &RequestCtx,
    user_id: Id,
    flags: &str,
) -> CoreResult<()> {
    if !ctx.is_admin() {
        return Err(CoreError::PermissionDenied);
    }
    store.add_user_flags(user_id, flags).await?;
    info!(user_id, flags, "user flags granted");
    Ok(())
}

/// Clears the unread-reply counter, called when the user opens their
/// replies page.
pub async fn mark_replies_seen(store: &dyn Store, user_id: Id) -> CoreResult<()> {
    Ok(store.reset_replies(user_id).await?)
}

/// Profile update by the owner or an admin.
pub async fn update_profile(
    store: &dyn Store,
    ctx: &RequestCtx,
    user_id: Id,
    upd: UpdateProfile,
) -> CoreResult<()> {
    let caller = ctx.user.as_ref().ok_or(CoreError::PermissionDenied)?;
    if caller.id != user_id && !caller.is_admin() {
        return Err(CoreError::PermissionDenied);
    }
    Ok(store.update_profile(user_id, upd).await?)
}

fn reset_cooldown_key(user_id: Id) -> String {
    format!("user:{user_id}:pwd_reset")
}

/// Issues a password-reset token for the user, at most once per cooldown
/// window. Delivery of the token is the mail collaborator's job.
pub async fn create_password_reset(
    store: &dyn Store,
    user_id: Id,
    now: i64,
    cfg: &SiteConfig,
) -> CoreResult<String> {
    // ensure the user exists before issuing anything
    store.get_user(user_id).await?;
    let key = reset_cooldown_key(user_id);
    if store.rate_limit_check(&key, now).await? {
        let retry_in = store.rate_limit_ttl(&key, now).await?.max(0);
        return Err(CoreError::RateLimited { retry_in });
    }
    let token = random_hex(32);
    store
        .create_reset_token(&token, user_id, now + cfg.password_reset_delay)
        .await?;
    store.rate_limit_set(&key, cfg.password_reset_delay, now).await?;
    Ok(token)
}

/// Single-use redemption: returns the owning user id, or NotFound for an
/// unknown, expired or already-used token.
pub async fn consume_password_reset(store: &dyn Store, token: &str, now: i64) -> CoreResult<Id> {
    store
        .consume_reset_token(token, now)
        .await?
        .ok_or(CoreError::NotFound)
}
