//! The `sous diagram` command: render a recipe JSON document as Mermaid
//! flowchart text.

use std::path::Path;

use anyhow::{Context, Result};

use sous_core::graph::render_diagram;
use sous_db::models::Recipe;

pub fn render_from_file(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let recipe: Recipe =
        serde_json::from_str(&contents).context("failed to parse recipe JSON")?;
    let diagram = render_diagram(&recipe).context("failed to analyze recipe")?;
    Ok(diagram)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use sous_db::models::{
        Ingredient, MeasurementUnit, Preparation, ProductType, RecipeStep, RecipeStepIngredient,
        RecipeStepProduct,
    };

    fn unit() -> MeasurementUnit {
        MeasurementUnit {
            id: "unit-gram".to_owned(),
            name: "gram".to_owned(),
        }
    }

    fn sample_recipe() -> Recipe {
        Recipe {
            id: "recipe-1".to_owned(),
            name: "onions two ways".to_owned(),
            steps: vec![
                RecipeStep {
                    id: "step-0".to_owned(),
                    index: 0,
                    preparation: Preparation {
                        id: "prep-dice".to_owned(),
                        name: "dice".to_owned(),
                        long_prep: false,
                        minimum_lead_seconds: 0,
                        maximum_lead_seconds: 0,
                    },
                    ingredients: vec![RecipeStepIngredient {
                        id: "si-0".to_owned(),
                        name: "onion".to_owned(),
                        measurement_unit: unit(),
                        minimum_quantity: 100.0,
                        maximum_quantity: None,
                        ingredient: Some(Ingredient {
                            id: "ingredient-onion".to_owned(),
                            name: "onion".to_owned(),
                            storage_instructions: String::new(),
                            storage_temperature_min_celsius: None,
                            storage_temperature_max_celsius: None,
                        }),
                        recipe_step_product_id: None,
                    }],
                    products: vec![RecipeStepProduct {
                        id: "p0".to_owned(),
                        name: "diced onion".to_owned(),
                        product_type: ProductType::Ingredient,
                        measurement_unit: Some(unit()),
                    }],
                    notes: String::new(),
                },
                RecipeStep {
                    id: "step-1".to_owned(),
                    index: 1,
                    preparation: Preparation {
                        id: "prep-sautee".to_owned(),
                        name: "sautee".to_owned(),
                        long_prep: false,
                        minimum_lead_seconds: 0,
                        maximum_lead_seconds: 0,
                    },
                    ingredients: vec![RecipeStepIngredient {
                        id: "si-1".to_owned(),
                        name: "diced onion".to_owned(),
                        measurement_unit: unit(),
                        minimum_quantity: 100.0,
                        maximum_quantity: None,
                        ingredient: None,
                        recipe_step_product_id: Some("p0".to_owned()),
                    }],
                    products: vec![],
                    notes: String::new(),
                },
            ],
        }
    }

    #[test]
    fn renders_a_recipe_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        let json = serde_json::to_string(&sample_recipe()).expect("serialize");
        file.write_all(json.as_bytes()).expect("write");

        let diagram = render_from_file(file.path()).expect("render");
        assert_eq!(
            diagram,
            "flowchart TD;\n\
             \tStep1[\"Step #1 (dice)\"];\n\
             \tStep2[\"Step #2 (sautee)\"];\n\
             \tStep1 -->|ingredient| Step2;\n"
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = render_from_file(Path::new("/no/such/recipe.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"not json").expect("write");
        let err = render_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }
}
