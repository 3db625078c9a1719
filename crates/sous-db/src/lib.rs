//! Relational storage for the meal-plan preparation planner: models, pool
//! and migrations, per-table query functions, and the narrow
//! [`contract::PlannerStore`] interface the planner core consumes.

pub mod config;
pub mod contract;
pub mod models;
pub mod pool;
pub mod queries;
