mod error;
pub mod handlers;
pub mod metadata;
pub mod middleware;
pub mod providers;
pub mod routes;

pub use error::{aggregation_error, api_error, registry_error, ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
