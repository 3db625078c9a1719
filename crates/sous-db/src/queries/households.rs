//! Database query functions for the `households` and `webhooks` tables.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{Household, Webhook};

/// Fetch a single household by id.
pub async fn get_household(pool: &PgPool, id: &str) -> Result<Option<Household>> {
    let household = sqlx::query_as::<_, Household>("SELECT * FROM households WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch household")?;

    Ok(household)
}

/// List all webhooks registered for a household.
pub async fn get_webhooks_for_household(pool: &PgPool, household_id: &str) -> Result<Vec<Webhook>> {
    let webhooks = sqlx::query_as::<_, Webhook>(
        "SELECT * FROM webhooks WHERE household_id = $1 ORDER BY id",
    )
    .bind(household_id)
    .fetch_all(pool)
    .await
    .context("failed to list webhooks for household")?;

    Ok(webhooks)
}
