//! Database query functions for the `meal_plan_grocery_list_items` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{GroceryListItemCreationInput, MealPlanGroceryListItem};

/// Insert grocery list items, skipping any that already exist.
///
/// Uses `ON CONFLICT (meal_plan_id, ingredient_id, measurement_unit_id)
/// DO NOTHING` so that redelivered finalization notifications never
/// double-create rows. Returns only the rows actually inserted by this call.
pub async fn create_grocery_list_items(
    pool: &PgPool,
    inputs: &[GroceryListItemCreationInput],
) -> Result<Vec<MealPlanGroceryListItem>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let mut created = Vec::with_capacity(inputs.len());
    for input in inputs {
        let id = Uuid::new_v4().to_string();
        let item = sqlx::query_as::<_, MealPlanGroceryListItem>(
            "INSERT INTO meal_plan_grocery_list_items \
                 (id, meal_plan_id, ingredient_id, measurement_unit_id, \
                  minimum_quantity, maximum_quantity) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (meal_plan_id, ingredient_id, measurement_unit_id) DO NOTHING \
             RETURNING *",
        )
        .bind(&id)
        .bind(&input.meal_plan_id)
        .bind(&input.ingredient_id)
        .bind(&input.measurement_unit_id)
        .bind(input.minimum_quantity)
        .bind(input.maximum_quantity)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to insert grocery list item")?;

        if let Some(item) = item {
            created.push(item);
        }
    }

    tx.commit().await.context("failed to commit transaction")?;

    Ok(created)
}

/// List all grocery items for a meal plan, ordered by ingredient id.
pub async fn list_items_for_meal_plan(
    pool: &PgPool,
    meal_plan_id: &str,
) -> Result<Vec<MealPlanGroceryListItem>> {
    let items = sqlx::query_as::<_, MealPlanGroceryListItem>(
        "SELECT * FROM meal_plan_grocery_list_items \
         WHERE meal_plan_id = $1 \
         ORDER BY ingredient_id, measurement_unit_id",
    )
    .bind(meal_plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list grocery items for meal plan")?;

    Ok(items)
}
