//! REST adapters for the air-quality backend.
//!
//! Every endpoint returns a typed, validated payload or an [`ApiError`];
//! transient failures are retried according to [`RetryPolicy`].

pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod schema;

pub use client::ApiClient;
pub use config::ApiConfig;
pub use error::ApiError;
pub use retry::RetryPolicy;
pub use schema::*;
