//! Database query functions for recipes and their nested steps, ingredients,
//! and products.

use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{
    Ingredient, MeasurementUnit, Preparation, ProductType, Recipe, RecipeStep,
    RecipeStepIngredient, RecipeStepProduct,
};

#[derive(Debug, Clone, sqlx::FromRow)]
struct StepRow {
    id: String,
    step_index: i32,
    notes: String,
    preparation_id: String,
    preparation_name: String,
    long_prep: bool,
    minimum_lead_seconds: i64,
    maximum_lead_seconds: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProductRow {
    id: String,
    recipe_step_id: String,
    name: String,
    product_type: ProductType,
    measurement_unit_id: Option<String>,
    measurement_unit_name: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct IngredientRow {
    id: String,
    recipe_step_id: String,
    name: String,
    minimum_quantity: f64,
    maximum_quantity: Option<f64>,
    measurement_unit_id: String,
    measurement_unit_name: String,
    recipe_step_product_id: Option<String>,
    ingredient_id: Option<String>,
    ingredient_name: Option<String>,
    storage_instructions: Option<String>,
    storage_temperature_min_celsius: Option<f64>,
    storage_temperature_max_celsius: Option<f64>,
}

/// Fetch a recipe with its steps fully hydrated, ordered by step index.
pub async fn get_recipe(pool: &PgPool, id: &str) -> Result<Option<Recipe>> {
    let Some((recipe_id, recipe_name)) = sqlx::query_as::<_, (String, String)>(
        "SELECT id, name FROM recipes WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch recipe")?
    else {
        return Ok(None);
    };

    let step_rows = sqlx::query_as::<_, StepRow>(
        "SELECT s.id, s.step_index, s.notes, \
                p.id AS preparation_id, p.name AS preparation_name, \
                p.long_prep, p.minimum_lead_seconds, p.maximum_lead_seconds \
         FROM recipe_steps s \
         JOIN preparations p ON p.id = s.preparation_id \
         WHERE s.recipe_id = $1 \
         ORDER BY s.step_index",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .context("failed to fetch recipe steps")?;

    let step_ids: Vec<String> = step_rows.iter().map(|s| s.id.clone()).collect();

    let product_rows = sqlx::query_as::<_, ProductRow>(
        "SELECT rp.id, rp.recipe_step_id, rp.name, rp.product_type, \
                u.id AS measurement_unit_id, u.name AS measurement_unit_name \
         FROM recipe_step_products rp \
         LEFT JOIN measurement_units u ON u.id = rp.measurement_unit_id \
         WHERE rp.recipe_step_id = ANY($1) \
         ORDER BY rp.id",
    )
    .bind(&step_ids)
    .fetch_all(pool)
    .await
    .context("failed to fetch recipe step products")?;

    let ingredient_rows = sqlx::query_as::<_, IngredientRow>(
        "SELECT ri.id, ri.recipe_step_id, ri.name, \
                ri.minimum_quantity, ri.maximum_quantity, \
                u.id AS measurement_unit_id, u.name AS measurement_unit_name, \
                ri.recipe_step_product_id, \
                i.id AS ingredient_id, i.name AS ingredient_name, \
                i.storage_instructions, \
                i.storage_temperature_min_celsius, i.storage_temperature_max_celsius \
         FROM recipe_step_ingredients ri \
         JOIN measurement_units u ON u.id = ri.measurement_unit_id \
         LEFT JOIN ingredients i ON i.id = ri.ingredient_id \
         WHERE ri.recipe_step_id = ANY($1) \
         ORDER BY ri.id",
    )
    .bind(&step_ids)
    .fetch_all(pool)
    .await
    .context("failed to fetch recipe step ingredients")?;

    let mut products_by_step: HashMap<String, Vec<RecipeStepProduct>> = HashMap::new();
    for row in product_rows {
        let measurement_unit = match (row.measurement_unit_id, row.measurement_unit_name) {
            (Some(id), Some(name)) => Some(MeasurementUnit { id, name }),
            _ => None,
        };
        products_by_step
            .entry(row.recipe_step_id)
            .or_default()
            .push(RecipeStepProduct {
                id: row.id,
                name: row.name,
                product_type: row.product_type,
                measurement_unit,
            });
    }

    let mut ingredients_by_step: HashMap<String, Vec<RecipeStepIngredient>> = HashMap::new();
    for row in ingredient_rows {
        let ingredient = match (row.ingredient_id, row.ingredient_name) {
            (Some(id), Some(name)) => Some(Ingredient {
                id,
                name,
                storage_instructions: row.storage_instructions.unwrap_or_default(),
                storage_temperature_min_celsius: row.storage_temperature_min_celsius,
                storage_temperature_max_celsius: row.storage_temperature_max_celsius,
            }),
            _ => None,
        };
        ingredients_by_step
            .entry(row.recipe_step_id)
            .or_default()
            .push(RecipeStepIngredient {
                id: row.id,
                name: row.name,
                measurement_unit: MeasurementUnit {
                    id: row.measurement_unit_id,
                    name: row.measurement_unit_name,
                },
                minimum_quantity: row.minimum_quantity,
                maximum_quantity: row.maximum_quantity,
                ingredient,
                recipe_step_product_id: row.recipe_step_product_id,
            });
    }

    let steps = step_rows
        .into_iter()
        .map(|row| RecipeStep {
            ingredients: ingredients_by_step.remove(&row.id).unwrap_or_default(),
            products: products_by_step.remove(&row.id).unwrap_or_default(),
            id: row.id,
            index: row.step_index as usize,
            preparation: Preparation {
                id: row.preparation_id,
                name: row.preparation_name,
                long_prep: row.long_prep,
                minimum_lead_seconds: row.minimum_lead_seconds,
                maximum_lead_seconds: row.maximum_lead_seconds,
            },
            notes: row.notes,
        })
        .collect();

    Ok(Some(Recipe {
        id: recipe_id,
        name: recipe_name,
        steps,
    }))
}

/// Fetch the recipes belonging to a meal plan option's meal, hydrated and
/// ordered by recipe id for deterministic downstream task generation.
pub async fn get_recipes_for_option(pool: &PgPool, option_id: &str) -> Result<Vec<Recipe>> {
    let ids: Vec<(String,)> = sqlx::query_as(
        "SELECT r.id \
         FROM recipes r \
         JOIN meal_recipes mr ON mr.recipe_id = r.id \
         JOIN meal_plan_options o ON o.meal_id = mr.meal_id \
         WHERE o.id = $1 \
         ORDER BY r.id",
    )
    .bind(option_id)
    .fetch_all(pool)
    .await
    .context("failed to list recipes for option")?;

    let mut recipes = Vec::with_capacity(ids.len());
    for (id,) in ids {
        if let Some(recipe) = get_recipe(pool, &id).await? {
            recipes.push(recipe);
        }
    }
    Ok(recipes)
}
