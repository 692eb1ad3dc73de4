//! `regimen user` subcommands.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;

use regimen_db::queries::users::{self, NewProfile, NewUser};

use crate::UserCommands;
use crate::resolve::{parse_date, resolve_user};

/// Dispatch a `UserCommands` variant to the appropriate handler.
pub async fn run_user_command(command: UserCommands, pool: &PgPool) -> Result<()> {
    match command {
        UserCommands::Add {
            username,
            email,
            sex,
            fitness_level,
            goal,
            birthday,
            height_cm,
            weight_kg,
        } => {
            let profile = NewProfile {
                sex,
                fitness_level,
                goal,
                birthday: birthday.as_deref().map(parse_date).transpose()?,
                height_cm,
                weight_kg,
            };
            cmd_add(pool, &username, &email, &profile).await
        }
        UserCommands::Show { user } => cmd_show(pool, &user).await,
    }
}

async fn cmd_add(pool: &PgPool, username: &str, email: &str, profile: &NewProfile) -> Result<()> {
    let (user, _) = users::create_user_with_profile(pool, &NewUser { username, email }, profile)
        .await
        .with_context(|| format!("failed to create user {username:?}"))?;

    println!("User created.");
    println!("  User ID:  {}", user.id);
    println!("  Username: {}", user.username);
    Ok(())
}

async fn cmd_show(pool: &PgPool, input: &str) -> Result<()> {
    let user_id = resolve_user(pool, input).await?;
    let user = users::get_user(pool, user_id)
        .await?
        .with_context(|| format!("user {user_id} not found"))?;
    let profile = users::get_profile(pool, user_id).await?;

    println!("User: {} ({})", user.username, user.id);
    println!("Email: {}", user.email);
    println!("Joined: {}", user.created_at.format("%Y-%m-%d"));

    let Some(profile) = profile else {
        println!("No profile.");
        return Ok(());
    };
    let show = |label: &str, value: Option<String>| {
        println!("  {label:<14} {}", value.unwrap_or_else(|| "-".to_string()));
    };
    println!("Profile:");
    show("Sex:", profile.sex.clone());
    show("Fitness level:", profile.fitness_level.clone());
    show("Goal:", profile.goal.clone());
    show(
        "Age:",
        profile.age_on(Utc::now().date_naive()).map(|a| a.to_string()),
    );
    show("Height:", profile.height_cm.map(|h| format!("{h} cm")));
    show("Weight:", profile.weight_kg.map(|w| format!("{w} kg")));
    Ok(())
}
