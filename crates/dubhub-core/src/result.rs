//! Convenience result type alias for DubHub.

use crate::error::AppError;

/// A specialized `Result` type for DubHub operations.
pub type AppResult<T> = Result<T, AppError>;
