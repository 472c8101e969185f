use axum::http::Request;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::KeyExtractor,
    GovernorError, GovernorLayer,
};
use uuid::Uuid;

use crate::middleware::auth::AuthUser;
use crate::middleware::rate_limit::rate_limit_error_handler;

/// Keys rate limits on the authenticated user rather than the peer address
#[derive(Debug, Clone, Copy)]
pub struct UserIdExtractor;

impl KeyExtractor for UserIdExtractor {
    type Key = Uuid;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        // Set by auth_middleware, which must run first
        req.extensions()
            .get::<AuthUser>()
            .map(|user| user.user_id)
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

pub type UserGovernorLayer = GovernorLayer<
    UserIdExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Route groups with their own per-user budgets
pub enum RateLimitedGroup {
    /// Trip and passenger endpoints: 100 requests per minute
    Rider,
    /// Driver endpoints, which receive periodic location pings: 500 per minute
    Driver,
}

pub fn create_user_governor(group: RateLimitedGroup) -> UserGovernorLayer {
    let (per_ms, burst) = match group {
        RateLimitedGroup::Driver => (120, 500),
        RateLimitedGroup::Rider => (600, 100),
    };

    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(burst)
            .key_extractor(UserIdExtractor)
            .finish()
            .expect("rate limit period and burst must be non-zero"),
    );

    GovernorLayer::new(config).error_handler(rate_limit_error_handler)
}
