//! Business rules for each module. Handlers authorize the caller and hand
//! the store to these functions; nothing here knows about HTTP.

use rust_decimal::Decimal;

use crate::error::{AppError, StoreError};
use crate::model::money::max_amount;

pub mod employee;
pub mod organization;
pub mod payroll;
pub mod policy_config;
pub mod statutory;

pub(crate) fn required(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// A money input: not negative and small enough for the money columns.
pub(crate) fn amount(value: Decimal, field: &str) -> Result<Decimal, AppError> {
    if value.is_sign_negative() {
        return Err(AppError::Validation(format!("{field} must not be negative")));
    }
    if value > max_amount() {
        return Err(AppError::Validation(format!(
            "{field} must not exceed {}",
            max_amount()
        )));
    }
    Ok(value)
}

/// Resolves a referenced row, turning a missing one into a 400 instead of a 404.
pub(crate) async fn referenced<T>(
    lookup: impl Future<Output = Result<T, StoreError>>,
    what: &str,
    id: u64,
) -> Result<T, AppError> {
    match lookup.await {
        Ok(value) => Ok(value),
        Err(StoreError::NotFound { .. }) => {
            Err(AppError::Validation(format!("{what} {id} does not exist")))
        }
        Err(e) => Err(e.into()),
    }
}
