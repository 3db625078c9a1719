//! Deterministic Mermaid flowchart rendering for a recipe's step graph.
//!
//! The output format is stable across releases: node labels are
//! `Step #<n> (<preparation>)`, product-derived edges are labeled
//! `ingredient`, and edges are ordered by `(from, to)`.

use std::fmt::Write;

use sous_db::models::Recipe;

use super::{GraphError, build_graph};

/// Render the recipe's step graph as Mermaid flowchart text.
///
/// Steps appear in index order regardless of the order of the input slice,
/// so equal recipes always produce byte-equal output.
pub fn render_diagram(recipe: &Recipe) -> Result<String, GraphError> {
    let graph = build_graph(recipe)?;

    let mut labels: Vec<(usize, &str)> = recipe
        .steps
        .iter()
        .map(|step| (step.index, step.preparation.name.as_str()))
        .collect();
    labels.sort_by_key(|(index, _)| *index);

    let mut out = String::from("flowchart TD;\n");
    for (index, preparation) in labels {
        let n = index + 1;
        // String writes cannot fail.
        let _ = writeln!(out, "\tStep{n}[\"Step #{n} ({preparation})\"];");
    }
    for (from, to) in graph.edges() {
        let _ = writeln!(out, "\tStep{} -->|ingredient| Step{};", from + 1, to + 1);
    }

    Ok(out)
}
