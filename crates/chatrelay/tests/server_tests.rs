//! Integration tests for the HTTP surface
//!
//! Health check, relay route and the admin API, driven through the router
//! with `tower::ServiceExt::oneshot`.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

use chatrelay::config::{Config, RuntimeSettings, SettingsHandle};
use chatrelay::relay::{Framing, RelayServices, SessionManager, WordlistModerator};
use chatrelay::server::{AppState, create_router};
use chatrelay::services::{InMemoryLedger, QuotaLedger, StaticTokenResolver, TracingRequestLogger, UserId};
use chatrelay::testing::ScriptedProvider;

// =============================================================================
// Test Fixtures
// =============================================================================

const ADMIN_TOKEN: &str = "admin-secret";

struct TestApp {
    router: Router,
    settings: SettingsHandle,
    ledger: Arc<InMemoryLedger>,
}

fn create_test_app(admin_token: Option<&str>) -> TestApp {
    let ledger = Arc::new(InMemoryLedger::new(0));
    ledger.set_balance(UserId(7), 40);
    let settings = SettingsHandle::new(RuntimeSettings::default());

    let services = RelayServices {
        ledger: ledger.clone(),
        moderator: Arc::new(WordlistModerator::new()),
        primary: Arc::new(ScriptedProvider::fragments("primary", &["A"])),
        fallback: Arc::new(ScriptedProvider::fragments("fallback", &["X"])),
        identity: Arc::new(StaticTokenResolver::new(HashMap::from([(
            "tok".to_string(),
            7,
        )]))),
        logger: Arc::new(TracingRequestLogger::new()),
    };
    let config = Config::default();
    let sessions = SessionManager::new(services, settings.clone(), &config.relay).unwrap();

    let state = AppState {
        sessions: Arc::new(sessions),
        settings: settings.clone(),
        ledger: ledger.clone(),
        framing: Framing::Tagged,
        admin_token: admin_token.map(str::to_string),
    };

    TestApp {
        router: create_router(Arc::new(state)),
        settings,
        ledger,
    }
}

fn admin_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {ADMIN_TOKEN}"));

    match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// Health and Relay Route
// =============================================================================

mod route_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint_returns_200_ok() {
        let app = create_test_app(None);

        let response = app
            .router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_relay_route_without_upgrade_is_rejected() {
        let app = create_test_app(None);

        let response = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/gpt/api/tok/advanced")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}

// =============================================================================
// Admin API
// =============================================================================

mod admin_tests {
    use super::*;

    #[tokio::test]
    async fn test_admin_disabled_without_token() {
        let app = create_test_app(None);

        let response = app
            .router
            .oneshot(admin_request("GET", "/admin/control", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["type"], "admin_disabled");
    }

    #[tokio::test]
    async fn test_admin_rejects_wrong_token() {
        let app = create_test_app(Some(ADMIN_TOKEN));

        let response = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/admin/control")
                    .header("Authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["type"], "unauthorized");
    }

    #[tokio::test]
    async fn test_admin_rejects_missing_token() {
        let app = create_test_app(Some(ADMIN_TOKEN));

        let response = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/admin/quota/7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_control_returns_current_settings() {
        let app = create_test_app(Some(ADMIN_TOKEN));

        let response = app
            .router
            .oneshot(admin_request("GET", "/admin/control", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["control"]["enable_advanced"], false);
        assert_eq!(body["control"]["enable_moderation"], true);
        assert_eq!(body["pricing"]["standard"], 1);
    }

    #[tokio::test]
    async fn test_put_control_replaces_settings() {
        let app = create_test_app(Some(ADMIN_TOKEN));

        let update = serde_json::json!({
            "control": {
                "enable_advanced": true,
                "enable_moderation": false,
                "sensitive_words": ["forbidden"]
            },
            "pricing": {"standard": 2, "advanced": 20, "image": 16}
        });

        let response = app
            .router
            .oneshot(admin_request("PUT", "/admin/control", Some(update)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let settings = app.settings.snapshot().await;
        assert!(settings.control.enable_advanced);
        assert!(!settings.control.enable_moderation);
        assert_eq!(settings.control.sensitive_words, vec!["forbidden".to_string()]);
        assert_eq!(settings.pricing.image, 16);
    }

    #[tokio::test]
    async fn test_put_control_with_invalid_body_is_rejected() {
        let app = create_test_app(Some(ADMIN_TOKEN));

        let response = app
            .router
            .oneshot(admin_request(
                "PUT",
                "/admin/control",
                Some(serde_json::json!({"pricing": {"standard": "free"}})),
            ))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert_eq!(app.settings.snapshot().await, RuntimeSettings::default());
    }

    #[tokio::test]
    async fn test_get_quota_returns_balance() {
        let app = create_test_app(Some(ADMIN_TOKEN));

        let response = app
            .router
            .oneshot(admin_request("GET", "/admin/quota/7", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["user_id"], 7);
        assert_eq!(body["balance"], 40);
    }

    #[tokio::test]
    async fn test_credit_quota_tops_up_balance() {
        let app = create_test_app(Some(ADMIN_TOKEN));

        let response = app
            .router
            .oneshot(admin_request(
                "POST",
                "/admin/quota/7/credit",
                Some(serde_json::json!({"amount": 10})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["balance"], 50);
        assert_eq!(app.ledger.balance(UserId(7)).await, 50);
    }

    #[tokio::test]
    async fn test_credit_quota_rejects_zero_amount() {
        let app = create_test_app(Some(ADMIN_TOKEN));

        let response = app
            .router
            .oneshot(admin_request(
                "POST",
                "/admin/quota/7/credit",
                Some(serde_json::json!({"amount": 0})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["type"], "invalid_request");
        assert_eq!(app.ledger.balance(UserId(7)).await, 40);
    }
}
