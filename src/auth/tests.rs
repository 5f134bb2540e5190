//! Tests for auth module
//!
//! These tests drive the session orchestrator over the real SQLite stores
//! with a stub credential verifier, plus the HTTP surface end to end.

#[cfg(test)]
mod tests {
    use super::super::models::{IdentityClaim, Provider, User};
    use super::super::verifier::CredentialVerifier;
    use super::super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use chrono::Duration;
    use serde_json::{json, Value};
    use sqlx::SqlitePool;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::common::config::JwtConfig;
    use crate::common::migrations::test_support::{setup_file_db, setup_test_db};
    use crate::common::AppState;

    /// Accepts any credential as the subject id, except a few reserved values
    struct StubVerifier;

    fn stub_claim(provider: Provider, credential: &str) -> Result<IdentityClaim, AuthError> {
        match credential {
            "rejected" => Err(AuthError::InvalidCredential("stub rejection".to_string())),
            "unreachable" => Err(AuthError::UpstreamUnavailable("stub outage".to_string())),
            "no-email" => Err(AuthError::IncompleteProfile {
                provider,
                reason: "missing email".to_string(),
            }),
            sub => Ok(IdentityClaim {
                provider,
                provider_user_id: sub.to_string(),
                email: "a@x.com".to_string(),
                display_name: "A".to_string(),
                avatar_url: None,
            }),
        }
    }

    #[async_trait]
    impl CredentialVerifier for StubVerifier {
        async fn verify_google(&self, id_token: &str) -> Result<IdentityClaim, AuthError> {
            stub_claim(Provider::Google, id_token)
        }

        async fn verify_microsoft(&self, code: &str) -> Result<IdentityClaim, AuthError> {
            stub_claim(Provider::Microsoft, code)
        }
    }

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
            issuer: "todolist-api".to_string(),
            audience: "todolist-client".to_string(),
            expiration_minutes: 60,
        }
    }

    fn token_store(pool: &SqlitePool) -> RefreshTokenStore {
        RefreshTokenStore::new(
            Arc::new(SqliteRefreshTokenRepository::new(pool.clone())),
            Duration::days(30),
        )
    }

    fn orchestrator_with(pool: &SqlitePool, revoke_all_on_reuse: bool) -> SessionOrchestrator {
        SessionOrchestrator::new(
            Arc::new(StubVerifier),
            UserDirectory::new(Arc::new(SqliteUserStore::new(pool.clone()))),
            TokenIssuer::new(jwt_config()),
            token_store(pool),
            revoke_all_on_reuse,
        )
    }

    fn orchestrator(pool: &SqlitePool) -> SessionOrchestrator {
        orchestrator_with(pool, true)
    }

    async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await.unwrap();
        n
    }

    async fn user_count(pool: &SqlitePool) -> i64 {
        count(pool, "SELECT COUNT(*) FROM users").await
    }

    async fn active_token_count(pool: &SqlitePool) -> i64 {
        count(pool, "SELECT COUNT(*) FROM refresh_tokens WHERE revoked = 0").await
    }

    #[tokio::test]
    async fn test_google_login_creates_user_and_session() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);

        let session = sessions.login_with_google("g-123").await.unwrap();

        let stored = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE provider = 'Google' AND provider_user_id = 'g-123'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert!(!session.access_token.is_empty());
        assert!(!session.refresh_token.is_empty());
        assert_eq!(session.user.id, stored.id);
        assert_eq!(session.user.email, "a@x.com");
        assert_eq!(session.user.name, "A");
        assert_eq!(session.user.provider, "Google");
        assert_eq!(user_count(&pool).await, 1);
        assert_eq!(active_token_count(&pool).await, 1);

        let claims = sessions
            .issuer()
            .verify_access_token(&session.access_token)
            .unwrap();
        assert_eq!(claims.sub, stored.id);
        assert_eq!(claims.exp, session.expires_at.timestamp());
    }

    #[tokio::test]
    async fn test_repeat_login_reuses_user_and_keeps_prior_sessions() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);

        let first = sessions.login_with_google("g-123").await.unwrap();
        let second = sessions.login_with_google("g-123").await.unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_eq!(user_count(&pool).await, 1);
        assert_eq!(active_token_count(&pool).await, 2);
    }

    #[tokio::test]
    async fn test_microsoft_login_is_a_separate_identity() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);

        let google = sessions.login_with_google("shared").await.unwrap();
        let microsoft = sessions.login_with_microsoft("shared").await.unwrap();

        assert_ne!(google.user.id, microsoft.user.id);
        assert_eq!(microsoft.user.provider, "Microsoft");
        assert_eq!(user_count(&pool).await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_login_creates_one_user() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);

        let (a, b) = tokio::join!(
            sessions.login_with_google("g-new"),
            sessions.login_with_google("g-new")
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.user.id, b.user.id);
        assert_eq!(user_count(&pool).await, 1);
        assert_eq!(active_token_count(&pool).await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_first_logins_on_separate_connections() {
        let (pool, _dir) = setup_file_db(8).await;
        let sessions = orchestrator(&pool);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.login_with_google("g-parallel").await })
            })
            .collect();

        let mut user_ids = Vec::new();
        for handle in handles {
            user_ids.push(handle.await.unwrap().unwrap().user.id);
        }

        assert!(user_ids.iter().all(|id| id == &user_ids[0]));
        assert_eq!(user_count(&pool).await, 1);
        assert_eq!(active_token_count(&pool).await, 8);
    }

    #[tokio::test]
    async fn test_verification_failures_pass_through() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);

        assert!(matches!(
            sessions.login_with_google("rejected").await,
            Err(AuthError::InvalidCredential(_))
        ));
        assert!(matches!(
            sessions.login_with_microsoft("unreachable").await,
            Err(AuthError::UpstreamUnavailable(_))
        ));
        assert!(matches!(
            sessions.login_with_microsoft("no-email").await,
            Err(AuthError::IncompleteProfile { .. })
        ));
        assert_eq!(user_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_after_verification_is_internal() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);
        pool.close().await;

        assert!(matches!(
            sessions.login_with_google("g-123").await,
            Err(AuthError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_old_token_is_single_use() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);
        let login = sessions.login_with_google("g-123").await.unwrap();

        let refreshed = sessions.refresh(&login.refresh_token).await.unwrap();
        assert_ne!(refreshed.refresh_token, login.refresh_token);
        assert_eq!(refreshed.user.id, login.user.id);

        let second = sessions.refresh(&login.refresh_token).await;
        assert!(matches!(second, Err(AuthError::TokenRevoked)));
    }

    #[tokio::test]
    async fn test_refresh_with_expired_token() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);
        let login = sessions.login_with_google("g-123").await.unwrap();

        token_store(&pool)
            .store_with_ttl(
                &login.user.id,
                "expired-token-string".to_string(),
                Duration::days(-1),
            )
            .await
            .unwrap();
        let before = count(&pool, "SELECT COUNT(*) FROM refresh_tokens").await;

        assert!(matches!(
            sessions.refresh("expired-token-string").await,
            Err(AuthError::TokenExpired)
        ));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM refresh_tokens").await, before);
    }

    #[tokio::test]
    async fn test_refresh_with_unknown_token() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);

        assert!(matches!(
            sessions.refresh("never-issued").await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_succeeds_once() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);
        let login = sessions.login_with_google("g-123").await.unwrap();

        let (a, b) = tokio::join!(
            sessions.refresh(&login.refresh_token),
            sessions.refresh(&login.refresh_token)
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let failure = if a.is_err() { a } else { b };
        assert!(matches!(
            failure,
            Err(AuthError::TokenRevoked) | Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_refresh_on_separate_connections_succeeds_once() {
        let (pool, _dir) = setup_file_db(8).await;
        let sessions = orchestrator_with(&pool, false);
        let login = sessions.login_with_google("g-123").await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sessions = sessions.clone();
                let token = login.refresh_token.clone();
                tokio::spawn(async move { sessions.refresh(&token).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(e, AuthError::TokenRevoked), "unexpected error: {e:?}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(active_token_count(&pool).await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM refresh_tokens").await, 2);
    }

    #[tokio::test]
    async fn test_reuse_of_revoked_token_revokes_all_sessions() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);
        let login = sessions.login_with_google("g-123").await.unwrap();
        let other_device = sessions.login_with_google("g-123").await.unwrap();

        let rotated = sessions.refresh(&login.refresh_token).await.unwrap();
        assert!(matches!(
            sessions.refresh(&login.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));

        assert_eq!(active_token_count(&pool).await, 0);
        assert!(matches!(
            sessions.refresh(&rotated.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
        assert!(matches!(
            sessions.refresh(&other_device.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn test_reuse_without_hardening_keeps_other_sessions() {
        let pool = setup_test_db().await;
        let sessions = orchestrator_with(&pool, false);
        let login = sessions.login_with_google("g-123").await.unwrap();

        let rotated = sessions.refresh(&login.refresh_token).await.unwrap();
        assert!(matches!(
            sessions.refresh(&login.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
        assert!(sessions.refresh(&rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_revokes_token_idempotently() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);
        let login = sessions.login_with_google("g-123").await.unwrap();

        sessions.logout(&login.refresh_token).await.unwrap();
        sessions.logout(&login.refresh_token).await.unwrap();

        assert!(matches!(
            sessions.refresh(&login.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
        assert!(matches!(
            sessions.logout("never-issued").await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_current_user() {
        let pool = setup_test_db().await;
        let sessions = orchestrator(&pool);
        let login = sessions.login_with_google("g-123").await.unwrap();

        let info = sessions.current_user(&login.user.id).await.unwrap();
        assert_eq!(info, login.user);

        assert!(matches!(
            sessions.current_user("U_MISSING").await,
            Err(AuthError::AccessTokenRejected(_))
        ));
    }

    // ------------------------------------------------------------------
    // HTTP surface
    // ------------------------------------------------------------------

    async fn app(pool: &SqlitePool) -> axum::Router {
        let state = AppState::new(pool.clone(), orchestrator(pool));
        crate::build_router(state, &["http://localhost:5173".to_string()])
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_http_google_login_returns_session_json() {
        let pool = setup_test_db().await;

        let response = app(&pool)
            .await
            .oneshot(post_json("/api/auth/google", json!({ "idToken": "g-123" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["accessToken"].as_str().is_some_and(|t| !t.is_empty()));
        assert!(body["refreshToken"].as_str().is_some_and(|t| !t.is_empty()));
        assert!(body["expiresAt"].is_string());
        assert_eq!(body["user"]["provider"], "Google");
        assert!(body["user"].get("picture").is_none());
    }

    #[tokio::test]
    async fn test_http_blank_credential_is_bad_request() {
        let pool = setup_test_db().await;

        let response = app(&pool)
            .await
            .oneshot(post_json("/api/auth/microsoft", json!({ "code": "  " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
        assert_eq!(user_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_http_error_statuses() {
        let pool = setup_test_db().await;
        let router = app(&pool).await;

        let rejected = router
            .clone()
            .oneshot(post_json("/api/auth/google", json!({ "idToken": "rejected" })))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

        let outage = router
            .clone()
            .oneshot(post_json("/api/auth/google", json!({ "idToken": "unreachable" })))
            .await
            .unwrap();
        assert_eq!(outage.status(), StatusCode::SERVICE_UNAVAILABLE);

        let unknown = router
            .oneshot(post_json(
                "/api/auth/refresh",
                json!({ "refreshToken": "never-issued" }),
            ))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(unknown).await["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_http_me_requires_bearer_token() {
        let pool = setup_test_db().await;
        let router = app(&pool).await;
        let session = orchestrator(&pool).login_with_google("g-123").await.unwrap();

        let anonymous = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/auth/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let authed = router
            .oneshot(
                Request::builder()
                    .uri("/api/auth/me")
                    .header(
                        header::AUTHORIZATION,
                        format!("Bearer {}", session.access_token),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(authed.status(), StatusCode::OK);
        assert_eq!(body_json(authed).await["id"], session.user.id);
    }

    #[tokio::test]
    async fn test_http_me_rejects_token_with_unknown_provider() {
        let pool = setup_test_db().await;
        let router = app(&pool).await;
        let session = orchestrator(&pool).login_with_google("g-123").await.unwrap();

        let mut user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(&session.user.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        user.provider = "Yahoo".to_string();
        let forged = TokenIssuer::new(jwt_config())
            .issue_access_token(&user)
            .unwrap();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/auth/me")
                    .header(header::AUTHORIZATION, format!("Bearer {}", forged.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_http_refresh_then_logout() {
        let pool = setup_test_db().await;
        let router = app(&pool).await;
        let session = orchestrator(&pool).login_with_google("g-123").await.unwrap();

        let refreshed = router
            .clone()
            .oneshot(post_json(
                "/api/auth/refresh",
                json!({ "refreshToken": session.refresh_token }),
            ))
            .await
            .unwrap();
        assert_eq!(refreshed.status(), StatusCode::OK);
        let new_token = body_json(refreshed).await["refreshToken"]
            .as_str()
            .unwrap()
            .to_string();

        let logout = router
            .oneshot(post_json(
                "/api/auth/logout",
                json!({ "refresh_token": new_token }),
            ))
            .await
            .unwrap();
        assert_eq!(logout.status(), StatusCode::OK);
        assert_eq!(active_token_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_http_health() {
        let pool = setup_test_db().await;

        let response = app(&pool)
            .await
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }
}
