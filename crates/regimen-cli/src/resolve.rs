//! ID and user resolution for command arguments.
//!
//! - [`parse_id`] parses a UUID argument with a labelled error.
//! - [`resolve_user`] accepts either a user UUID or a username.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use regimen_db::queries::users;

/// Parse a UUID argument, naming what it was supposed to identify.
pub fn parse_id(input: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(input.trim()).with_context(|| format!("invalid {what} ID: {input:?}"))
}

/// Parse a `YYYY-MM-DD` date argument.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date {input:?} (expected YYYY-MM-DD)"))
}

/// Resolve a user given as a UUID or a username.
///
/// A string that parses as a UUID is only treated as an ID; usernames that
/// look like UUIDs are not supported.
pub async fn resolve_user(pool: &PgPool, input: &str) -> Result<Uuid> {
    let input = input.trim();
    if let Ok(id) = Uuid::parse_str(input) {
        let user = users::get_user(pool, id)
            .await?
            .with_context(|| format!("user {id} not found"))?;
        return Ok(user.id);
    }
    let user = users::find_user_by_username(pool, input)
        .await?
        .with_context(|| format!("user {input:?} not found"))?;
    Ok(user.id)
}
