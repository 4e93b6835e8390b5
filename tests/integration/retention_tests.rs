//! Integration tests for the retention purge.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

use agent_relay::models::auth::AuthSession;
use agent_relay::models::resource::{hash_share_token, ResourceShare};
use agent_relay::persistence::auth_repo::AuthRepo;
use agent_relay::persistence::retention::{purge, spawn_retention_task};
use agent_relay::persistence::share_repo::ShareRepo;

use super::test_helpers::{fixture, seed_resource, TOKEN, USER_ID};

#[tokio::test]
async fn purge_removes_expired_shares_and_sessions() {
    let fx = fixture("exit 0").await;
    let resource = seed_resource(&fx, USER_ID, "Deploy").await;
    let shares = ShareRepo::new(Arc::clone(&fx.db));
    let auth = AuthRepo::new(Arc::clone(&fx.db));

    let (stale, stale_token) = ResourceShare::issue(
        resource.id.clone(),
        Some(Utc::now() - Duration::days(2)),
        None,
    );
    let (fresh, fresh_token) = ResourceShare::issue(
        resource.id.clone(),
        Some(Utc::now() + Duration::days(2)),
        None,
    );
    shares.create(&stale).await.expect("stale share");
    shares.create(&fresh).await.expect("fresh share");
    auth.upsert(&AuthSession {
        token: "expired-token".into(),
        user_id: USER_ID.into(),
        expires_at: Utc::now() - Duration::minutes(5),
    })
    .await
    .expect("expired session");

    purge(&fx.db).await.expect("purge");

    assert!(shares
        .find_by_token_hash(&hash_share_token(&stale_token))
        .await
        .expect("query")
        .is_none());
    assert!(shares
        .find_by_token_hash(&hash_share_token(&fresh_token))
        .await
        .expect("query")
        .is_some());
    assert!(auth
        .find_valid(TOKEN, Utc::now())
        .await
        .expect("query")
        .is_some());

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM auth_session WHERE token = ?1")
        .bind("expired-token")
        .fetch_one(fx.db.as_ref())
        .await
        .expect("count");
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn retention_task_runs_immediately_and_stops_on_cancel() {
    let fx = fixture("exit 0").await;
    let auth = AuthRepo::new(Arc::clone(&fx.db));
    auth.upsert(&AuthSession {
        token: "expired-token".into(),
        user_id: USER_ID.into(),
        expires_at: Utc::now() - Duration::minutes(5),
    })
    .await
    .expect("expired session");

    let cancel = CancellationToken::new();
    let handle = spawn_retention_task(Arc::clone(&fx.db), cancel.clone());
    tokio::time::sleep(StdDuration::from_millis(200)).await;

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM auth_session")
        .fetch_one(fx.db.as_ref())
        .await
        .expect("count");
    assert_eq!(remaining, 2, "only the two live sessions remain");

    cancel.cancel();
    tokio::time::timeout(StdDuration::from_secs(2), handle)
        .await
        .expect("task stops")
        .expect("join");
}
