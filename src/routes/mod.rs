use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{self, auth, drivers, passengers, trips};
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::create_public_governor;
use crate::middleware::user_rate_limit::{create_user_governor, RateLimitedGroup};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Per-user budgets; the governor runs after auth_middleware has set the caller
    let driver_governor = create_user_governor(RateLimitedGroup::Driver);
    let rider_governor = create_user_governor(RateLimitedGroup::Rider);

    // Unauthenticated auth endpoints, limited per IP since login sends an OTP
    let public_auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/verify-phone", post(auth::verify_phone))
        .layer(create_public_governor());

    let session_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Static segment wins over {trip_id}
    let trip_routes = Router::new()
        .route("/", post(trips::create_trip))
        .route("/nearby-drivers", get(trips::nearby_drivers))
        .route("/{trip_id}", get(trips::get_trip))
        .route("/{trip_id}/accept", put(trips::accept_trip))
        .route("/{trip_id}/start", put(trips::start_trip))
        .route("/{trip_id}/complete", put(trips::complete_trip))
        .route("/{trip_id}/cancel", put(trips::cancel_trip))
        .route("/{trip_id}/rating", post(trips::rate_trip))
        .layer(rider_governor.clone())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let driver_routes = Router::new()
        .route("/", get(drivers::get_profile).put(drivers::update_profile))
        .route("/vehicle", get(drivers::get_vehicle).post(drivers::add_vehicle))
        .route("/location", put(drivers::update_location))
        .route("/status", put(drivers::update_status))
        .route("/trips", get(drivers::trip_history))
        .route("/points", get(drivers::points))
        .layer(driver_governor)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let passenger_routes = Router::new()
        .route(
            "/{id}",
            get(passengers::get_passenger).put(passengers::update_passenger),
        )
        .route("/{id}/trips", get(passengers::passenger_trips))
        .route(
            "/{id}/payment-methods",
            get(passengers::list_payment_methods).post(passengers::add_payment_method),
        )
        .layer(rider_governor)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .nest("/auth", public_auth_routes.merge(session_routes))
        .nest("/trips", trip_routes)
        .nest("/drivers/me", driver_routes)
        .nest("/passengers", passenger_routes);

    Router::new().nest("/api/v1", api).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::entities::user;
    use crate::utils::jwt::create_token;
    use crate::utils::otp::OtpSender;

    fn test_state() -> AppState {
        state_with(MockDatabase::new(DatabaseBackend::Postgres).into_connection())
    }

    fn state_with(db: DatabaseConnection) -> AppState {
        AppState {
            db: Arc::new(db),
            config: Config {
                database_url: "postgres://localhost/test".into(),
                db_max_connections: 1,
                db_timeout_secs: 1,
                jwt_secret: "test-secret".into(),
                jwt_expiration_hours: 1,
                server_host: "127.0.0.1".into(),
                server_port: 0,
                otp_ttl_minutes: 5,
                otp_webhook_url: None,
                otp_echo: false,
            },
            otp: OtpSender::new(None),
        }
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_need_a_token() {
        for (method, uri) in [
            ("POST", "/api/v1/trips"),
            ("GET", "/api/v1/trips/nearby-drivers?latitude=1&longitude=1"),
            ("PUT", "/api/v1/drivers/me/status"),
            ("GET", "/api/v1/auth/me"),
        ] {
            let app = create_router(test_state());
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let app = create_router(test_state());
        let request = Request::get("/api/v1/drivers/me")
            .header("Authorization", "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_override_body_is_a_json_400() {
        let account = user::Model {
            id: Uuid::new_v4(),
            phone_number: "+233200000001".into(),
            password_hash: "unused".into(),
            is_verified: true,
            created_at: Utc::now().into(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![account.clone()]])
            .into_connection();
        let state = state_with(db);
        let token = create_token(account.id, &account.phone_number, &state.config.jwt_secret, 1).unwrap();

        let request = Request::put(format!("/api/v1/trips/{}/complete", Uuid::new_v4()))
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"actual_distance":"abc"}"#))
            .unwrap();
        let response = create_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("actual_distance"));
    }
}
