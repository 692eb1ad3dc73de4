//! Database query functions for the `users` and `user_profiles` tables.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{User, UserProfile};

/// Fields for a new user.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
}

/// Initial profile attributes. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub sex: Option<String>,
    pub fitness_level: Option<String>,
    pub goal: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
}

/// Create a user and its profile row in one transaction.
///
/// Every user has exactly one profile; the profile is written here rather
/// than by any later hook so a user can never exist without one.
pub async fn create_user_with_profile(
    pool: &PgPool,
    user: &NewUser<'_>,
    profile: &NewProfile,
) -> Result<(User, UserProfile)> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let created = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, email) VALUES ($1, $2) RETURNING *",
    )
    .bind(user.username)
    .bind(user.email)
    .fetch_one(&mut *tx)
    .await
    .with_context(|| format!("failed to insert user {:?}", user.username))?;

    let created_profile = sqlx::query_as::<_, UserProfile>(
        "INSERT INTO user_profiles \
             (user_id, sex, fitness_level, goal, birthday, height_cm, weight_kg) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(created.id)
    .bind(&profile.sex)
    .bind(&profile.fitness_level)
    .bind(&profile.goal)
    .bind(profile.birthday)
    .bind(profile.height_cm)
    .bind(profile.weight_kg)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert user profile")?;

    tx.commit().await.context("failed to commit user creation")?;

    Ok((created, created_profile))
}

/// Fetch a user by ID.
pub async fn get_user(pool: &PgPool, id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user")?;

    Ok(user)
}

/// Fetch a user by username.
pub async fn find_user_by_username(pool: &PgPool, username: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user by username")?;

    Ok(user)
}

/// Fetch the profile for a user.
pub async fn get_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<UserProfile>> {
    let profile =
        sqlx::query_as::<_, UserProfile>("SELECT * FROM user_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user profile")?;

    Ok(profile)
}
