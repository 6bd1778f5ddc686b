#![cfg(feature = "inmem-store")]

use newsrank::models::{ItemType, NewUser, VoteType};
use newsrank::store::inmem::InMemStore;
use newsrank::store::{
    rate_limit_by_tags, CounterStore, RateLimitStore, RepostStore, StoreError, UserStore, VoteStore,
};

const NOW: i64 = 1_700_000_000;

fn store() -> InMemStore {
    InMemStore::new()
}

async fn seed_user(s: &InMemStore, name: &str) -> newsrank::models::User {
    s.create_user(NewUser {
        username: name.into(),
        password_hash: "opaque".into(),
        email: String::new(),
        auth: format!("auth-{name}"),
        apisecret: format!("secret-{name}"),
        ctime: NOW,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn counters_mint_sequential_ids() {
    let s = store();
    assert_eq!(s.get_counter("news_count").await.unwrap(), 0);
    let a = s.increment_counter("news_count", 1).await.unwrap();
    let b = s.increment_counter("news_count", 1).await.unwrap();
    let c = s.increment_counter("news_count", 5).await.unwrap();
    assert_eq!((a, b, c), (1, 2, 7));
    assert_eq!(s.get_counter("news_count").await.unwrap(), 7);
    // independent counter namespaces
    assert_eq!(s.increment_counter("users_count", 1).await.unwrap(), 1);
}

#[tokio::test]
async fn rate_limit_key_active_until_expiry() {
    let s = store();
    assert!(!s.rate_limit_check("k", NOW).await.unwrap());
    assert_eq!(s.rate_limit_ttl("k", NOW).await.unwrap(), -1);

    s.rate_limit_set("k", 60, NOW).await.unwrap();
    assert!(s.rate_limit_check("k", NOW).await.unwrap());
    assert_eq!(s.rate_limit_ttl("k", NOW).await.unwrap(), 60);
    assert_eq!(s.rate_limit_ttl("k", NOW + 45).await.unwrap(), 15);

    // expired keys never block and report -1
    assert!(!s.rate_limit_check("k", NOW + 60).await.unwrap());
    assert_eq!(s.rate_limit_ttl("k", NOW + 61).await.unwrap(), -1);
}

#[tokio::test]
async fn rate_limit_set_overwrites_expiry() {
    let s = store();
    s.rate_limit_set("k", 10, NOW).await.unwrap();
    s.rate_limit_set("k", 100, NOW).await.unwrap();
    assert_eq!(s.rate_limit_ttl("k", NOW).await.unwrap(), 100);
}

#[tokio::test]
async fn tagged_throttle_arms_and_reports_remaining() {
    let s = store();
    let first = rate_limit_by_tags(&s, 30, &["edit_news", "10.0.0.1"], NOW).await.unwrap();
    assert_eq!(first, None);
    let second = rate_limit_by_tags(&s, 30, &["edit_news", "10.0.0.1"], NOW + 5).await.unwrap();
    assert_eq!(second, Some(25));
    // a different tag set is a different key
    let other = rate_limit_by_tags(&s, 30, &["edit_news", "10.0.0.2"], NOW + 5).await.unwrap();
    assert_eq!(other, None);
}

#[tokio::test]
async fn second_vote_fails_and_count_rises_once() {
    let s = store();
    let u = seed_user(&s, "alice").await;

    assert!(s.cast_vote(u.id, ItemType::News, 7, VoteType::Up, NOW).await.unwrap());
    // same item, any direction: rejected
    assert!(!s.cast_vote(u.id, ItemType::News, 7, VoteType::Up, NOW + 1).await.unwrap());
    assert!(!s.cast_vote(u.id, ItemType::News, 7, VoteType::Down, NOW + 2).await.unwrap());

    let (up, down) = s.get_vote_counts(ItemType::News, 7).await.unwrap();
    assert_eq!((up, down), (1, 0));
    assert_eq!(
        s.get_user_vote(u.id, ItemType::News, 7).await.unwrap(),
        Some(VoteType::Up)
    );
}

#[tokio::test]
async fn votes_are_scoped_by_item_type() {
    let s = store();
    let u = seed_user(&s, "bob").await;
    assert!(s.cast_vote(u.id, ItemType::News, 1, VoteType::Up, NOW).await.unwrap());
    // same id under a different item type is a different ledger row
    assert!(s.cast_vote(u.id, ItemType::Comment, 1, VoteType::Down, NOW).await.unwrap());
    let (up, down) = s.get_vote_counts(ItemType::Comment, 1).await.unwrap();
    assert_eq!((up, down), (0, 1));
}

#[tokio::test]
async fn repost_window_expires_and_clears() {
    let s = store();
    s.set_url_posted("https://example.com/a", 3, 100, NOW).await.unwrap();
    assert_eq!(
        s.url_recently_posted("https://example.com/a", NOW + 50).await.unwrap(),
        Some(3)
    );
    assert_eq!(
        s.url_recently_posted("https://example.com/a", NOW + 100).await.unwrap(),
        None
    );

    s.set_url_posted("https://example.com/b", 4, 100, NOW).await.unwrap();
    s.clear_url_posted(4).await.unwrap();
    assert_eq!(
        s.url_recently_posted("https://example.com/b", NOW + 1).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn username_conflict_is_case_insensitive() {
    let s = store();
    seed_user(&s, "Carol").await;
    let err = s
        .create_user(NewUser {
            username: "carol".into(),
            password_hash: "opaque".into(),
            email: String::new(),
            auth: "a2".into(),
            apisecret: "s2".into(),
            ctime: NOW,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict));

    let found = s.get_user_by_username("CAROL").await.unwrap();
    assert!(found.is_some());
}

#[tokio::test]
async fn reset_tokens_are_single_use_and_expire() {
    let s = store();
    let u = seed_user(&s, "dave").await;
    s.create_reset_token("tok1", u.id, NOW + 100).await.unwrap();

    assert_eq!(s.consume_reset_token("tok1", NOW).await.unwrap(), Some(u.id));
    // second redemption fails
    assert_eq!(s.consume_reset_token("tok1", NOW).await.unwrap(), None);

    s.create_reset_token("tok2", u.id, NOW + 100).await.unwrap();
    // expired before use
    assert_eq!(s.consume_reset_token("tok2", NOW + 100).await.unwrap(), None);
    assert_eq!(s.consume_reset_token("missing", NOW).await.unwrap(), None);
}
