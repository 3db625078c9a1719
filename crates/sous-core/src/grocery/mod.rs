//! Folds the ingredients of a meal plan's chosen options into a
//! deduplicated grocery list.
//!
//! The accumulator is keyed by ingredient id, so the result is stable under
//! permutations of events, options, recipes, and steps. Map iteration order
//! is not part of the contract; callers must not rely on output order.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::warn;

use sous_db::models::{GroceryListItemCreationInput, MealPlan, Recipe};

/// Aggregate the ingredients of every chosen option across the plan.
///
/// Quantities are summed only when the measurement unit matches the one the
/// ingredient was first seen with; a mismatching unit is logged and skipped,
/// never converted. An absent maximum quantity contributes its minimum.
pub fn aggregate_grocery_items(
    plan: &MealPlan,
    recipes_by_option: &HashMap<String, Vec<Recipe>>,
) -> Vec<GroceryListItemCreationInput> {
    let mut accumulator: HashMap<String, GroceryListItemCreationInput> = HashMap::new();

    for event in &plan.events {
        for option in &event.options {
            if !option.chosen {
                continue;
            }
            let Some(recipes) = recipes_by_option.get(&option.id) else {
                continue;
            };
            for recipe in recipes {
                for step in &recipe.steps {
                    for ingredient in &step.ingredients {
                        // Product-derived ingredients are intermediate and
                        // never appear on the grocery list.
                        let Some(concrete) = &ingredient.ingredient else {
                            continue;
                        };

                        let minimum = ingredient.minimum_quantity;
                        let maximum = ingredient.maximum_quantity.unwrap_or(minimum);
                        let unit_id = &ingredient.measurement_unit.id;

                        match accumulator.entry(concrete.id.clone()) {
                            Entry::Vacant(entry) => {
                                entry.insert(GroceryListItemCreationInput {
                                    meal_plan_id: plan.id.clone(),
                                    ingredient_id: concrete.id.clone(),
                                    measurement_unit_id: unit_id.clone(),
                                    minimum_quantity: minimum,
                                    maximum_quantity: maximum,
                                });
                            }
                            Entry::Occupied(mut entry) => {
                                let item = entry.get_mut();
                                if &item.measurement_unit_id == unit_id {
                                    item.minimum_quantity += minimum;
                                    item.maximum_quantity += maximum;
                                } else {
                                    warn!(
                                        meal_plan_id = %plan.id,
                                        ingredient_id = %concrete.id,
                                        expected_unit = %item.measurement_unit_id,
                                        got_unit = %unit_id,
                                        "measurement unit mismatch, skipping quantity"
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    accumulator.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_fixtures::{pantry_ingredient, recipe, step};
    use chrono::{Duration, Utc};
    use sous_db::models::{
        Meal, MealPlanEvent, MealPlanOption, MealPlanStatus, MeasurementUnit, RecipeStepIngredient,
    };

    fn option(id: &str, chosen: bool) -> MealPlanOption {
        MealPlanOption {
            id: id.to_owned(),
            meal: Meal {
                id: format!("meal-{id}"),
                name: "dinner".to_owned(),
            },
            chosen,
            tiebroken: false,
            votes: vec![],
        }
    }

    fn event(id: &str, options: Vec<MealPlanOption>) -> MealPlanEvent {
        MealPlanEvent {
            id: id.to_owned(),
            starts_at: Utc::now() + Duration::hours(72),
            ends_at: Utc::now() + Duration::hours(74),
            options,
        }
    }

    fn plan(events: Vec<MealPlanEvent>) -> MealPlan {
        MealPlan {
            id: "plan-1".to_owned(),
            household_id: "household-1".to_owned(),
            status: MealPlanStatus::Finalized,
            voting_deadline: Utc::now() - Duration::minutes(1),
            events,
            created_at: Utc::now(),
        }
    }

    fn single_ingredient_recipe(name: &str, ingredient: RecipeStepIngredient) -> Recipe {
        recipe(name, vec![step(0, "dice", vec![ingredient], vec![])])
    }

    #[test]
    fn shared_ingredients_sum_across_events() {
        // Five events, each with one chosen option; onion appears twice.
        let events = vec![
            event("e1", vec![option("o1", true)]),
            event("e2", vec![option("o2", true)]),
            event("e3", vec![option("o3", true)]),
            event("e4", vec![option("o4", true)]),
            event("e5", vec![option("o5", true)]),
        ];
        let plan = plan(events);

        let mut recipes_by_option = HashMap::new();
        for (option_id, name) in [
            ("o1", "onion"),
            ("o2", "carrot"),
            ("o3", "celery"),
            ("o4", "salt"),
            ("o5", "onion"),
        ] {
            recipes_by_option.insert(
                option_id.to_owned(),
                vec![single_ingredient_recipe(
                    name,
                    pantry_ingredient(name, 100.0),
                )],
            );
        }

        let mut items = aggregate_grocery_items(&plan, &recipes_by_option);
        items.sort_by(|a, b| a.ingredient_id.cmp(&b.ingredient_id));

        assert_eq!(items.len(), 4);

        let by_ingredient: HashMap<&str, &GroceryListItemCreationInput> = items
            .iter()
            .map(|item| (item.ingredient_id.as_str(), item))
            .collect();

        assert_eq!(by_ingredient["ingredient-onion"].minimum_quantity, 200.0);
        assert_eq!(by_ingredient["ingredient-carrot"].minimum_quantity, 100.0);
        assert_eq!(by_ingredient["ingredient-celery"].minimum_quantity, 100.0);
        assert_eq!(by_ingredient["ingredient-salt"].minimum_quantity, 100.0);
    }

    #[test]
    fn minimum_and_maximum_both_sum() {
        let plan = plan(vec![
            event("e1", vec![option("o1", true)]),
            event("e2", vec![option("o2", true)]),
        ]);

        let mut first = pantry_ingredient("onion", 100.0);
        first.maximum_quantity = Some(150.0);
        let mut second = pantry_ingredient("onion", 75.0);
        second.maximum_quantity = Some(125.0);

        let mut recipes_by_option = HashMap::new();
        recipes_by_option.insert(
            "o1".to_owned(),
            vec![single_ingredient_recipe("a", first)],
        );
        recipes_by_option.insert(
            "o2".to_owned(),
            vec![single_ingredient_recipe("b", second)],
        );

        let items = aggregate_grocery_items(&plan, &recipes_by_option);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].minimum_quantity, 175.0);
        assert_eq!(items[0].maximum_quantity, 275.0);
    }

    #[test]
    fn missing_maximum_contributes_its_minimum() {
        let plan = plan(vec![event("e1", vec![option("o1", true)])]);

        let mut recipes_by_option = HashMap::new();
        recipes_by_option.insert(
            "o1".to_owned(),
            vec![single_ingredient_recipe(
                "a",
                pantry_ingredient("onion", 100.0),
            )],
        );

        let items = aggregate_grocery_items(&plan, &recipes_by_option);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].maximum_quantity, 100.0);
    }

    #[test]
    fn unit_mismatch_is_skipped_not_summed() {
        let plan = plan(vec![
            event("e1", vec![option("o1", true)]),
            event("e2", vec![option("o2", true)]),
        ]);

        let grams = pantry_ingredient("onion", 100.0);
        let mut cups = pantry_ingredient("onion", 2.0);
        cups.measurement_unit = MeasurementUnit {
            id: "unit-cup".to_owned(),
            name: "cup".to_owned(),
        };

        let mut recipes_by_option = HashMap::new();
        recipes_by_option.insert("o1".to_owned(), vec![single_ingredient_recipe("a", grams)]);
        recipes_by_option.insert("o2".to_owned(), vec![single_ingredient_recipe("b", cups)]);

        let items = aggregate_grocery_items(&plan, &recipes_by_option);
        assert_eq!(items.len(), 1, "mismatching unit must not add an item");
        let item = &items[0];
        // Whichever unit was seen first wins; the other quantity is dropped.
        assert!(item.minimum_quantity == 100.0 || item.minimum_quantity == 2.0);
    }

    #[test]
    fn unchosen_options_are_ignored() {
        let plan = plan(vec![event(
            "e1",
            vec![option("o1", false), option("o2", true)],
        )]);

        let mut recipes_by_option = HashMap::new();
        recipes_by_option.insert(
            "o1".to_owned(),
            vec![single_ingredient_recipe(
                "a",
                pantry_ingredient("onion", 100.0),
            )],
        );
        recipes_by_option.insert(
            "o2".to_owned(),
            vec![single_ingredient_recipe(
                "b",
                pantry_ingredient("carrot", 50.0),
            )],
        );

        let items = aggregate_grocery_items(&plan, &recipes_by_option);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].ingredient_id, "ingredient-carrot");
    }

    #[test]
    fn product_derived_ingredients_are_excluded() {
        let plan = plan(vec![event("e1", vec![option("o1", true)])]);

        let mut recipes_by_option = HashMap::new();
        recipes_by_option.insert(
            "o1".to_owned(),
            vec![recipe(
                "layered",
                vec![
                    step(
                        0,
                        "dice",
                        vec![pantry_ingredient("onion", 100.0)],
                        vec![crate::graph::test_fixtures::product("p0", "diced onion")],
                    ),
                    step(
                        1,
                        "sautee",
                        vec![crate::graph::test_fixtures::product_ingredient(
                            "diced onion",
                            "p0",
                        )],
                        vec![],
                    ),
                ],
            )],
        );

        let items = aggregate_grocery_items(&plan, &recipes_by_option);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].ingredient_id, "ingredient-onion");
    }

    #[test]
    fn result_is_stable_under_event_permutation() {
        let events = vec![
            event("e1", vec![option("o1", true)]),
            event("e2", vec![option("o2", true)]),
        ];
        let mut recipes_by_option = HashMap::new();
        recipes_by_option.insert(
            "o1".to_owned(),
            vec![single_ingredient_recipe(
                "a",
                pantry_ingredient("onion", 100.0),
            )],
        );
        recipes_by_option.insert(
            "o2".to_owned(),
            vec![single_ingredient_recipe(
                "b",
                pantry_ingredient("onion", 50.0),
            )],
        );

        let forward = plan(events.clone());
        let mut reversed_events = events;
        reversed_events.reverse();
        let reversed = plan(reversed_events);

        let mut a = aggregate_grocery_items(&forward, &recipes_by_option);
        let mut b = aggregate_grocery_items(&reversed, &recipes_by_option);
        a.sort_by(|x, y| x.ingredient_id.cmp(&y.ingredient_id));
        b.sort_by(|x, y| x.ingredient_id.cmp(&y.ingredient_id));

        assert_eq!(a, b);
    }
}
