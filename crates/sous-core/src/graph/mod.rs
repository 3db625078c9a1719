//! Recipe step graph: builds a DAG from product-to-ingredient links and
//! yields a topological layering suitable for parallel-prep planning.
//!
//! An edge `A -> B` exists whenever some ingredient of step B references a
//! product of step A. The graph is materialized only for analysis and never
//! persisted.

mod diagram;

pub use diagram::render_diagram;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

use sous_db::models::Recipe;

/// Errors that can occur while analyzing a recipe's step graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("dependency cycle detected involving step {step_index}")]
    CycleDetected { step_index: usize },

    #[error("step {step_index} references unknown product {product_id:?}")]
    DanglingProductReference {
        step_index: usize,
        product_id: String,
    },
}

/// A validated, acyclic step-dependency graph.
///
/// Nodes are step indexes; edges point from the producing step to the
/// consuming step. Multiple product links between the same step pair
/// collapse to a single edge.
#[derive(Debug, Clone)]
pub struct RecipeGraph {
    nodes: Vec<usize>,
    adjacency: BTreeMap<usize, BTreeSet<usize>>,
}

impl RecipeGraph {
    /// Step indexes in the graph, ascending.
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    /// All edges `(producer, consumer)` ordered by `(from, to)`.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.adjacency
            .iter()
            .flat_map(|(from, tos)| tos.iter().map(move |to| (*from, *to)))
            .collect()
    }

    /// Topological layers `L0, L1, ...`: every step in `Li` has all of its
    /// prerequisites in layers before `i`. Within a layer, steps are ordered
    /// by ascending index so the result is deterministic.
    pub fn layers(&self) -> Vec<Vec<usize>> {
        let mut in_degree: BTreeMap<usize, usize> =
            self.nodes.iter().map(|n| (*n, 0)).collect();
        for consumers in self.adjacency.values() {
            for consumer in consumers {
                *in_degree.get_mut(consumer).expect("edge endpoints are nodes") += 1;
            }
        }

        let mut layers = Vec::new();
        let mut remaining = in_degree;
        while !remaining.is_empty() {
            // BTreeMap iteration gives ascending index order for free.
            let layer: Vec<usize> = remaining
                .iter()
                .filter(|(_, deg)| **deg == 0)
                .map(|(n, _)| *n)
                .collect();

            // The graph was validated acyclic at construction.
            debug_assert!(!layer.is_empty(), "acyclic graph must always have a source");

            for node in &layer {
                remaining.remove(node);
                if let Some(consumers) = self.adjacency.get(node) {
                    for consumer in consumers {
                        if let Some(deg) = remaining.get_mut(consumer) {
                            *deg -= 1;
                        }
                    }
                }
            }
            layers.push(layer);
        }

        layers
    }
}

/// Build the step-dependency graph for a recipe.
///
/// Product references are resolved by scanning the recipe's steps (recipes
/// are small, typically under 50 steps). A reference to a product no step
/// produces is a hard error; so is any dependency cycle.
pub fn build_graph(recipe: &Recipe) -> Result<RecipeGraph, GraphError> {
    let mut producer_by_product: HashMap<&str, usize> = HashMap::new();
    for step in &recipe.steps {
        for product in &step.products {
            producer_by_product.insert(product.id.as_str(), step.index);
        }
    }

    let mut nodes: Vec<usize> = recipe.steps.iter().map(|s| s.index).collect();
    nodes.sort_unstable();

    let mut adjacency: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for step in &recipe.steps {
        for ingredient in &step.ingredients {
            let Some(product_id) = &ingredient.recipe_step_product_id else {
                continue;
            };
            let Some(producer) = producer_by_product.get(product_id.as_str()) else {
                return Err(GraphError::DanglingProductReference {
                    step_index: step.index,
                    product_id: product_id.clone(),
                });
            };
            adjacency.entry(*producer).or_default().insert(step.index);
        }
    }

    detect_cycle(&nodes, &adjacency)?;

    Ok(RecipeGraph { nodes, adjacency })
}

/// Build the graph and return its topological layering.
pub fn to_dag(recipe: &Recipe) -> Result<Vec<Vec<usize>>, GraphError> {
    build_graph(recipe).map(|graph| graph.layers())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Depth-first cycle detection with a tri-color marker.
///
/// Visiting nodes in ascending index order makes the reported step index
/// deterministic for a given recipe.
fn detect_cycle(
    nodes: &[usize],
    adjacency: &BTreeMap<usize, BTreeSet<usize>>,
) -> Result<(), GraphError> {
    let mut colors: HashMap<usize, Color> = nodes.iter().map(|n| (*n, Color::White)).collect();

    for node in nodes {
        if colors[node] == Color::White {
            visit(*node, adjacency, &mut colors)?;
        }
    }

    Ok(())
}

fn visit(
    node: usize,
    adjacency: &BTreeMap<usize, BTreeSet<usize>>,
    colors: &mut HashMap<usize, Color>,
) -> Result<(), GraphError> {
    colors.insert(node, Color::Gray);

    if let Some(consumers) = adjacency.get(&node) {
        for consumer in consumers {
            match colors[consumer] {
                // A gray node is on the current DFS path: cycle.
                Color::Gray => {
                    return Err(GraphError::CycleDetected {
                        step_index: *consumer,
                    });
                }
                Color::White => visit(*consumer, adjacency, colors)?,
                Color::Black => {}
            }
        }
    }

    colors.insert(node, Color::Black);
    Ok(())
}
