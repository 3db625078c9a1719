//! Derives preparation tasks from a meal plan option's recipes.
//!
//! Each emitted task carries a `[cannot_complete_before,
//! cannot_complete_after]` window computed relative to the event's start
//! time, and a stable human-readable explanation that doubles as the
//! idempotence key alongside the option id.

use chrono::{DateTime, Duration, Utc};

use sous_db::models::{MealPlanTaskCreationInput, Recipe, RecipeStepIngredient};

/// How far ahead of the event a thaw may begin.
pub const THAW_WINDOW_EARLIEST_HOURS: i64 = 48;
/// How close to the event a thaw must have finished.
pub const THAW_WINDOW_LATEST_HOURS: i64 = 6;

/// The stable explanation attached to a thaw task.
///
/// `step_number` is 1-based (as shown to users); `ingredient_index` is the
/// 0-based position within the step. Consumers treat the string as opaque,
/// so the format must not change between releases.
pub fn thaw_explanation(
    ingredient_name: &str,
    step_number: usize,
    ingredient_index: usize,
) -> String {
    format!(
        "frozen ingredient \"{ingredient_name}\" (ingredient #{ingredient_index}) \
         for step #{step_number} will need to be thawed"
    )
}

/// The stable explanation attached to a long-preparation task.
pub fn long_prep_explanation(preparation_name: &str, step_number: usize) -> String {
    format!(
        "long preparation \"{preparation_name}\" for step #{step_number} \
         should be started ahead of time"
    )
}

/// Whether an ingredient needs thawing before it can be used: its storage
/// instructions mention freezing, or its minimum storage temperature is at
/// or below 0 degrees Celsius. Product-derived ingredients never thaw.
fn requires_thaw(ingredient: &RecipeStepIngredient) -> bool {
    let Some(concrete) = &ingredient.ingredient else {
        return false;
    };
    concrete
        .storage_instructions
        .to_lowercase()
        .contains("frozen")
        || concrete
            .storage_temperature_min_celsius
            .is_some_and(|t| t <= 0.0)
}

/// Generate preparation tasks for one meal plan option.
///
/// Output order is deterministic: recipes in input order, steps in index
/// order, thaw tasks by ingredient position, then the step's long-prep task.
/// All ids are left to the storage layer.
pub fn generate_tasks(
    option_id: &str,
    recipes: &[Recipe],
    starts_at: DateTime<Utc>,
) -> Vec<MealPlanTaskCreationInput> {
    let mut tasks = Vec::new();

    for recipe in recipes {
        for step in &recipe.steps {
            for (ingredient_index, ingredient) in step.ingredients.iter().enumerate() {
                if !requires_thaw(ingredient) {
                    continue;
                }
                tasks.push(MealPlanTaskCreationInput {
                    meal_plan_option_id: option_id.to_owned(),
                    creation_explanation: thaw_explanation(
                        &ingredient.name,
                        step.index + 1,
                        ingredient_index,
                    ),
                    cannot_complete_before: starts_at
                        - Duration::hours(THAW_WINDOW_EARLIEST_HOURS),
                    cannot_complete_after: starts_at - Duration::hours(THAW_WINDOW_LATEST_HOURS),
                });
            }

            if step.preparation.long_prep {
                let (before, after) = long_prep_window(
                    starts_at,
                    step.preparation.minimum_lead_seconds,
                    step.preparation.maximum_lead_seconds,
                );
                tasks.push(MealPlanTaskCreationInput {
                    meal_plan_option_id: option_id.to_owned(),
                    creation_explanation: long_prep_explanation(
                        &step.preparation.name,
                        step.index + 1,
                    ),
                    cannot_complete_before: before,
                    cannot_complete_after: after,
                });
            }
        }
    }

    tasks
}

/// Compute the `[before, after]` window for a long preparation.
///
/// Preparations with missing or inverted lead times fall back to the thaw
/// window constants. The result always satisfies
/// `before <= after <= starts_at`.
fn long_prep_window(
    starts_at: DateTime<Utc>,
    minimum_lead_seconds: i64,
    maximum_lead_seconds: i64,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let (min_lead, max_lead) =
        if maximum_lead_seconds <= 0 || maximum_lead_seconds < minimum_lead_seconds {
            (
                Duration::hours(THAW_WINDOW_LATEST_HOURS),
                Duration::hours(THAW_WINDOW_EARLIEST_HOURS),
            )
        } else {
            (
                Duration::seconds(minimum_lead_seconds.max(0)),
                Duration::seconds(maximum_lead_seconds),
            )
        };

    let after = (starts_at - min_lead).min(starts_at);
    let before = (starts_at - max_lead).min(after);
    (before, after)
}
