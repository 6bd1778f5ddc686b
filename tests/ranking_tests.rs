#![cfg(feature = "inmem-store")]

use newsrank::config::SiteConfig;
use newsrank::error::CoreError;
use newsrank::models::{RequestCtx, User, VoteType};
use newsrank::news::{self, NewsSubmission};
use newsrank::ranking::{self, compute_news_rank, compute_news_score};
use newsrank::store::inmem::InMemStore;
use newsrank::store::{NewsStore, UserStore};
use newsrank::users::{self, SignUp};

const NOW: i64 = 1_700_000_000;

fn cfg() -> SiteConfig {
    SiteConfig::default()
}

async fn user(s: &InMemStore, name: &str) -> User {
    users::create_user(
        s,
        SignUp { username: name.into(), password_hash: "opaque".into(), email: String::new() },
        NOW - 100_000,
    )
    .await
    .unwrap()
}

async fn admin(s: &InMemStore, name: &str) -> User {
    let u = user(s, name).await;
    s.add_user_flags(u.id, "a").await.unwrap();
    s.get_user(u.id).await.unwrap()
}

async fn submit(s: &InMemStore, author: &User, slug: &str, at: i64) -> i64 {
    news::submit_news(
        s,
        &RequestCtx::authenticated(author.clone()),
        NewsSubmission {
            title: slug.into(),
            url: format!("https://example.com/{slug}"),
            text: String::new(),
        },
        at,
        &cfg(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn recompute_sweep_is_admin_only() {
    let s = InMemStore::new();
    let alice = user(&s, "alice").await;
    let c = cfg();

    assert!(matches!(
        ranking::recompute_all(&s, &RequestCtx::anonymous(), NOW, &c).await,
        Err(CoreError::PermissionDenied)
    ));
    assert!(matches!(
        ranking::recompute_all(&s, &RequestCtx::authenticated(alice), NOW, &c).await,
        Err(CoreError::PermissionDenied)
    ));
}

#[tokio::test]
async fn recompute_rewrites_every_live_item() {
    let s = InMemStore::new();
    let c = cfg();
    let alice = user(&s, "alice").await;
    let bob = user(&s, "bob").await;
    let root = admin(&s, "root").await;

    let first = submit(&s, &alice, "first", NOW - 7200).await;
    let second = submit(&s, &bob, "second", NOW - 3600).await;
    // votes accumulated after submission leave the stored rank stale
    news::vote_news(&s, &RequestCtx::authenticated(bob.clone()), first, VoteType::Up, NOW - 3000)
        .await
        .unwrap();
    // a deleted item is left out of the sweep
    let doomed = submit(&s, &alice, "doomed", NOW - 3500).await;
    news::del_news(&s, &RequestCtx::authenticated(alice), doomed, NOW - 3400, &c).await.unwrap();

    let n = ranking::recompute_all(&s, &RequestCtx::authenticated(root.clone()), NOW, &c)
        .await
        .unwrap();
    assert_eq!(n, 2);

    let stored = s.get_news(first).await.unwrap();
    let want_score = compute_news_score(2, 0, &c);
    let want_rank = compute_news_rank(want_score, NOW - 7200, NOW, &c);
    assert!((stored.score - want_score).abs() < 1e-9);
    assert!((stored.rank - want_rank).abs() < 1e-9);
    assert!(s.get_news(second).await.unwrap().rank > 0.0);

    // a second sweep by the same admin inside the cooldown is refused
    assert!(matches!(
        ranking::recompute_all(&s, &RequestCtx::authenticated(root), NOW + 1, &c).await,
        Err(CoreError::RateLimited { .. })
    ));
}

#[tokio::test]
async fn recompute_cooldown_is_per_admin() {
    let s = InMemStore::new();
    let c = cfg();
    let root = admin(&s, "root").await;
    let other = admin(&s, "other").await;

    ranking::recompute_all(&s, &RequestCtx::authenticated(root), NOW, &c).await.unwrap();
    // a different admin has an independent cooldown
    ranking::recompute_all(&s, &RequestCtx::authenticated(other), NOW + 1, &c).await.unwrap();
}

#[tokio::test]
async fn aged_out_items_sink_below_fresh_ones() {
    let s = InMemStore::new();
    let c = cfg();
    let alice = user(&s, "alice").await;
    let root = admin(&s, "root").await;

    let ancient = submit(&s, &alice, "ancient", NOW - c.top_news_age_limit - 5000).await;
    let fresh = submit(&s, &alice, "fresh", NOW - c.news_submission_break - 10).await;

    ranking::recompute_all(&s, &RequestCtx::authenticated(root.clone()), NOW, &c).await.unwrap();
    let (page, _) = news::top_news(&s, &RequestCtx::authenticated(root), 0, 10).await.unwrap();
    let ids: Vec<i64> = page.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![fresh, ancient]);
    assert!(s.get_news(ancient).await.unwrap().rank < 0.0);
}
