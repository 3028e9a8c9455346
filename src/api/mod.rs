//! Administrative HTTP API.

pub mod auth;
pub mod error;
pub mod routes;

pub use auth::AdminIdentity;
pub use error::ApiError;
pub use routes::{ApiState, survey_routes};
