#![cfg(feature = "inmem-store")]

use newsrank::config::SiteConfig;
use newsrank::error::CoreError;
use newsrank::models::{RequestCtx, UpdateProfile, User};
use newsrank::store::inmem::InMemStore;
use newsrank::store::UserStore;
use newsrank::users::{self, SignUp};

const NOW: i64 = 1_700_000_000;

fn cfg() -> SiteConfig {
    SiteConfig::default()
}

async fn signup(s: &InMemStore, name: &str) -> User {
    users::create_user(
        s,
        SignUp { username: name.into(), password_hash: "opaque".into(), email: String::new() },
        NOW,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn signup_issues_credentials_and_starting_karma() {
    let s = InMemStore::new();
    let u = signup(&s, "alice").await;
    assert_eq!(u.karma, 1);
    assert_eq!(u.auth.len(), 40, "20 random bytes, hex encoded");
    assert_eq!(u.apisecret.len(), 40);
    assert_ne!(u.auth, u.apisecret);

    let err = users::create_user(
        &s,
        SignUp { username: "  ALICE ".into(), password_hash: "x".into(), email: String::new() },
        NOW,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)), "case-insensitive duplicate");

    let err = users::create_user(
        &s,
        SignUp { username: "   ".into(), password_hash: "x".into(), email: String::new() },
        NOW,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn auth_token_lookup_and_rotation() {
    let s = InMemStore::new();
    let u = signup(&s, "alice").await;

    let found = users::authenticate(&s, &u.auth).await.unwrap();
    assert_eq!(found.unwrap().id, u.id);
    assert!(users::authenticate(&s, "").await.unwrap().is_none());
    assert!(users::authenticate(&s, "bogus").await.unwrap().is_none());

    let fresh = users::update_auth_token(&s, u.id).await.unwrap();
    assert_ne!(fresh, u.auth);
    // old session is dead, new one works
    assert!(users::authenticate(&s, &u.auth).await.unwrap().is_none());
    assert_eq!(users::authenticate(&s, &fresh).await.unwrap().unwrap().id, u.id);
}

#[tokio::test]
async fn karma_accrues_at_most_once_per_interval() {
    let s = InMemStore::new();
    let c = cfg();
    let u = signup(&s, "alice").await;

    // inside the interval: nothing happens
    assert!(!users::increment_karma_if_needed(&s, &u, NOW + 100, &c).await.unwrap());
    assert_eq!(s.get_user(u.id).await.unwrap().karma, 1);

    // past the interval: one unit, and the accrual clock resets
    let later = NOW + c.karma_increment_interval + 1;
    assert!(users::increment_karma_if_needed(&s, &u, later, &c).await.unwrap());
    let u = s.get_user(u.id).await.unwrap();
    assert_eq!(u.karma, 1 + c.karma_increment_amount);
    assert_eq!(u.karma_incr_time, later);

    // immediately after, the fresh clock gates again
    assert!(!users::increment_karma_if_needed(&s, &u, later + 100, &c).await.unwrap());
}

#[tokio::test]
async fn flag_grants_are_admin_only() {
    let s = InMemStore::new();
    let alice = signup(&s, "alice").await;
    let root = signup(&s, "root").await;
    s.add_user_flags(root.id, "a").await.unwrap();
    let root = s.get_user(root.id).await.unwrap();
    assert!(root.is_admin());

    let err = users::add_flags(&s, &RequestCtx::authenticated(alice.clone()), alice.id, "a")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied));
    assert!(matches!(
        users::add_flags(&s, &RequestCtx::anonymous(), alice.id, "a").await,
        Err(CoreError::PermissionDenied)
    ));

    users::add_flags(&s, &RequestCtx::authenticated(root), alice.id, "a").await.unwrap();
    assert!(s.get_user(alice.id).await.unwrap().is_admin());
    // granting the same flag twice does not duplicate it
    let root = s.get_user(2).await.unwrap();
    users::add_flags(&s, &RequestCtx::authenticated(root), alice.id, "a").await.unwrap();
    assert_eq!(s.get_user(alice.id).await.unwrap().flags, "a");
}

#[tokio::test]
async fn profile_updates_respect_ownership() {
    let s = InMemStore::new();
    let alice = signup(&s, "alice").await;
    let bob = signup(&s, "bob").await;

    let err = users::update_profile(
        &s,
        &RequestCtx::authenticated(bob.clone()),
        alice.id,
        UpdateProfile { email: Some("x@example.com".into()), about: None },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied));

    users::update_profile(
        &s,
        &RequestCtx::authenticated(alice.clone()),
        alice.id,
        UpdateProfile { email: None, about: Some("hello".into()) },
    )
    .await
    .unwrap();
    let u = s.get_user(alice.id).await.unwrap();
    assert_eq!(u.about, "hello");
    assert_eq!(u.email, "", "unset fields stay untouched");

    // admins may edit anyone
    s.add_user_flags(bob.id, "a").await.unwrap();
    let bob = s.get_user(bob.id).await.unwrap();
    users::update_profile(
        &s,
        &RequestCtx::authenticated(bob),
        alice.id,
        UpdateProfile { email: Some("a@example.com".into()), about: None },
    )
    .await
    .unwrap();
    assert_eq!(s.get_user(alice.id).await.unwrap().email, "a@example.com");
}

#[tokio::test]
async fn password_reset_is_throttled_and_single_use() {
    let s = InMemStore::new();
    let c = cfg();
    let u = signup(&s, "alice").await;

    let token = users::create_password_reset(&s, u.id, NOW, &c).await.unwrap();
    assert_eq!(token.len(), 64, "32 random bytes, hex encoded");

    // a second request inside the cooldown reports the wait
    match users::create_password_reset(&s, u.id, NOW + 10, &c).await {
        Err(CoreError::RateLimited { retry_in }) => {
            assert_eq!(retry_in, c.password_reset_delay - 10)
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }

    assert_eq!(users::consume_password_reset(&s, &token, NOW + 60).await.unwrap(), u.id);
    // second redemption of the same token fails
    assert!(matches!(
        users::consume_password_reset(&s, &token, NOW + 61).await,
        Err(CoreError::NotFound)
    ));

    // unknown user cannot request a reset
    assert!(matches!(
        users::create_password_reset(&s, 999, NOW, &c).await,
        Err(CoreError::NotFound)
    ));
}

#[tokio::test]
async fn expired_reset_tokens_are_rejected() {
    let s = InMemStore::new();
    let c = cfg();
    let u = signup(&s, "alice").await;
    let token = users::create_password_reset(&s, u.id, NOW, &c).await.unwrap();
    assert!(matches!(
        users::consume_password_reset(&s, &token, NOW + c.password_reset_delay).await,
        Err(CoreError::NotFound)
    ));
}
