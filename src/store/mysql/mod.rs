//! MySQL backend.
//!
//! Queries are built at runtime and decoded into `FromRow` row structs.
//! Enum columns hold the variant's string name and are parsed back into the
//! model type when a row is converted, so a bad value surfaces as
//! `StoreError::Unknown` instead of a panic.

use std::str::FromStr;

use sqlx::MySqlPool;
use sqlx::mysql::MySqlQueryResult;

use crate::error::{StoreError, StoreResult};

mod employees;
mod organization;
mod payroll;
mod policy;
mod statutory;
mod users;

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn parse<T>(value: &str) -> StoreResult<T>
where
    T: FromStr<Err = strum::ParseError>,
{
    Ok(value.parse::<T>()?)
}

/// `NotFound` when an update by primary key touched nothing.
fn expect_row(
    result: MySqlQueryResult,
    entity: &'static str,
    id: impl ToString,
) -> StoreResult<()> {
    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(entity, id));
    }
    Ok(())
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
