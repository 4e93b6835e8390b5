//! Unit tests for bearer-session lookup.

use std::sync::Arc;

use chrono::{Duration, Utc};

use agent_relay::models::auth::AuthSession;
use agent_relay::persistence::auth_repo::AuthRepo;
use agent_relay::persistence::db;

async fn repo() -> AuthRepo {
    AuthRepo::new(Arc::new(db::connect_memory().await.expect("db")))
}

fn session(token: &str, ttl: Duration) -> AuthSession {
    AuthSession {
        token: token.into(),
        user_id: "alice".into(),
        expires_at: Utc::now() + ttl,
    }
}

#[tokio::test]
async fn valid_session_is_found() {
    let repo = repo().await;
    repo.upsert(&session("tok", Duration::hours(1)))
        .await
        .expect("upsert");

    let found = repo.find_valid("tok", Utc::now()).await.expect("query");
    assert_eq!(found.map(|s| s.user_id), Some("alice".to_owned()));
}

#[tokio::test]
async fn expired_or_unknown_session_is_rejected() {
    let repo = repo().await;
    repo.upsert(&session("old", -Duration::minutes(1)))
        .await
        .expect("upsert");

    assert!(repo.find_valid("old", Utc::now()).await.expect("query").is_none());
    assert!(repo.find_valid("nope", Utc::now()).await.expect("query").is_none());
}

#[tokio::test]
async fn upsert_extends_existing_session() {
    let repo = repo().await;
    repo.upsert(&session("tok", -Duration::minutes(1)))
        .await
        .expect("upsert");
    repo.upsert(&session("tok", Duration::hours(1)))
        .await
        .expect("upsert");

    assert!(repo.find_valid("tok", Utc::now()).await.expect("query").is_some());
}

#[tokio::test]
async fn purge_removes_only_expired_sessions() {
    let repo = repo().await;
    repo.upsert(&session("old", -Duration::minutes(1)))
        .await
        .expect("upsert");
    repo.upsert(&session("live", Duration::hours(1)))
        .await
        .expect("upsert");

    assert_eq!(repo.purge_expired(Utc::now()).await.expect("purge"), 1);
    assert!(repo.find_valid("live", Utc::now()).await.expect("query").is_some());
}
