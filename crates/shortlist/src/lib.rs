pub mod config;
pub mod engagements;
pub mod error;
pub mod telemetry;

pub use config::{AppConfig, AppEnvironment, ConfigError, ServerConfig, TelemetryConfig};
pub use error::AppError;
