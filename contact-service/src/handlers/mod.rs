pub mod contacts;
pub mod health;
pub mod metrics;
pub mod profile;

pub use health::health_check;
pub use metrics::metrics_endpoint;

use crate::services::metrics::record_operation;
use crate::services::ContactError;
use service_core::error::AppError;

/// Count the outcome and convert the error for the HTTP layer.
pub(crate) fn finish<T>(operation: &str, result: Result<T, ContactError>) -> Result<T, AppError> {
    record_operation(operation, &result, ContactError::kind);
    result.map_err(AppError::from)
}
