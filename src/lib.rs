pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod rules;
pub mod services;
pub mod utils;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};

use utils::otp::OtpSender;

#[derive(Clone)]
pub struct AppState {
    /// Shared pool; `DatabaseConnection` itself is not `Clone` under sea-orm's mock feature
    pub db: Arc<DatabaseConnection>,
    pub config: Config,
    pub otp: OtpSender,
}
