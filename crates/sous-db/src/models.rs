use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status of a meal plan's voting lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealPlanStatus {
    AwaitingVotes,
    Finalized,
    Expired,
}

impl MealPlanStatus {
    /// Whether a transition from `self` to `to` is a valid edge in the
    /// lifecycle graph. `finalized` and `expired` are terminal.
    pub fn can_transition_to(self, to: MealPlanStatus) -> bool {
        matches!(
            (self, to),
            (MealPlanStatus::AwaitingVotes, MealPlanStatus::Finalized)
                | (MealPlanStatus::AwaitingVotes, MealPlanStatus::Expired)
        )
    }
}

impl fmt::Display for MealPlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingVotes => "awaiting_votes",
            Self::Finalized => "finalized",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

impl FromStr for MealPlanStatus {
    type Err = MealPlanStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_votes" => Ok(Self::AwaitingVotes),
            "finalized" => Ok(Self::Finalized),
            "expired" => Ok(Self::Expired),
            other => Err(MealPlanStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MealPlanStatus`] string.
#[derive(Debug, Clone)]
pub struct MealPlanStatusParseError(pub String);

impl fmt::Display for MealPlanStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid meal plan status: {:?}", self.0)
    }
}

impl std::error::Error for MealPlanStatusParseError {}

// ---------------------------------------------------------------------------

/// Status of a derived preparation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealPlanTaskStatus {
    Unfinished,
    InProgress,
    Ignored,
    Finished,
}

impl MealPlanTaskStatus {
    /// Whether a transition from `self` to `to` is allowed. `finished` and
    /// `ignored` are terminal.
    pub fn can_transition_to(self, to: MealPlanTaskStatus) -> bool {
        matches!(
            (self, to),
            (MealPlanTaskStatus::Unfinished, MealPlanTaskStatus::InProgress)
                | (MealPlanTaskStatus::Unfinished, MealPlanTaskStatus::Ignored)
                | (MealPlanTaskStatus::Unfinished, MealPlanTaskStatus::Finished)
                | (MealPlanTaskStatus::InProgress, MealPlanTaskStatus::Finished)
                | (MealPlanTaskStatus::InProgress, MealPlanTaskStatus::Ignored)
        )
    }
}

impl fmt::Display for MealPlanTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unfinished => "unfinished",
            Self::InProgress => "in_progress",
            Self::Ignored => "ignored",
            Self::Finished => "finished",
        };
        f.write_str(s)
    }
}

impl FromStr for MealPlanTaskStatus {
    type Err = MealPlanTaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unfinished" => Ok(Self::Unfinished),
            "in_progress" => Ok(Self::InProgress),
            "ignored" => Ok(Self::Ignored),
            "finished" => Ok(Self::Finished),
            other => Err(MealPlanTaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MealPlanTaskStatus`] string.
#[derive(Debug, Clone)]
pub struct MealPlanTaskStatusParseError(pub String);

impl fmt::Display for MealPlanTaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid meal plan task status: {:?}", self.0)
    }
}

impl std::error::Error for MealPlanTaskStatusParseError {}

// ---------------------------------------------------------------------------

/// Acquisition status of a grocery list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GroceryListItemStatus {
    Unknown,
    Acquired,
    Unavailable,
    AlreadyOwned,
}

impl fmt::Display for GroceryListItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Acquired => "acquired",
            Self::Unavailable => "unavailable",
            Self::AlreadyOwned => "already_owned",
        };
        f.write_str(s)
    }
}

impl FromStr for GroceryListItemStatus {
    type Err = GroceryListItemStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "acquired" => Ok(Self::Acquired),
            "unavailable" => Ok(Self::Unavailable),
            "already_owned" => Ok(Self::AlreadyOwned),
            other => Err(GroceryListItemStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`GroceryListItemStatus`] string.
#[derive(Debug, Clone)]
pub struct GroceryListItemStatusParseError(pub String);

impl fmt::Display for GroceryListItemStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid grocery list item status: {:?}", self.0)
    }
}

impl std::error::Error for GroceryListItemStatusParseError {}

// ---------------------------------------------------------------------------

/// What kind of thing a recipe step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Ingredient,
    Instrument,
    Vessel,
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ingredient => "ingredient",
            Self::Instrument => "instrument",
            Self::Vessel => "vessel",
        };
        f.write_str(s)
    }
}

impl FromStr for ProductType {
    type Err = ProductTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingredient" => Ok(Self::Ingredient),
            "instrument" => Ok(Self::Instrument),
            "vessel" => Ok(Self::Vessel),
            other => Err(ProductTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ProductType`] string.
#[derive(Debug, Clone)]
pub struct ProductTypeParseError(pub String);

impl fmt::Display for ProductTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid product type: {:?}", self.0)
    }
}

impl std::error::Error for ProductTypeParseError {}

// ---------------------------------------------------------------------------

/// Serialization format for outbound webhook bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum WebhookContentType {
    #[sqlx(rename = "application/json")]
    #[serde(rename = "application/json")]
    Json,
    #[sqlx(rename = "application/xml")]
    #[serde(rename = "application/xml")]
    Xml,
}

impl fmt::Display for WebhookContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        };
        f.write_str(s)
    }
}

impl FromStr for WebhookContentType {
    type Err = WebhookContentTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "application/json" => Ok(Self::Json),
            "application/xml" => Ok(Self::Xml),
            other => Err(WebhookContentTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`WebhookContentType`] string.
#[derive(Debug, Clone)]
pub struct WebhookContentTypeParseError(pub String);

impl fmt::Display for WebhookContentTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid webhook content type: {:?}", self.0)
    }
}

impl std::error::Error for WebhookContentTypeParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A household -- the tenant boundary for meal plans and webhooks.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Household {
    pub id: String,
    pub name: String,
    /// Hex-encoded HMAC key used to sign outbound webhook bodies.
    pub webhook_encryption_key: String,
    pub created_at: DateTime<Utc>,
}

/// An outbound webhook registration.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Webhook {
    pub id: String,
    pub household_id: String,
    pub name: String,
    pub url: String,
    /// HTTP method, usually POST.
    pub method: String,
    pub content_type: WebhookContentType,
    /// Event types this webhook fires for. Empty means all.
    pub events: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// Whether this webhook should fire for the given event type.
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e == event_type)
    }
}

/// A measurement unit (grams, cups, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MeasurementUnit {
    pub id: String,
    pub name: String,
}

/// A concrete ingredient with its storage attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    pub storage_instructions: String,
    pub storage_temperature_min_celsius: Option<f64>,
    pub storage_temperature_max_celsius: Option<f64>,
}

/// A named preparation technique attached to a recipe step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Preparation {
    pub id: String,
    pub name: String,
    /// Marks preparations that must begin well before the event.
    pub long_prep: bool,
    pub minimum_lead_seconds: i64,
    pub maximum_lead_seconds: i64,
}

/// The output of a recipe step, referencable by later steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStepProduct {
    pub id: String,
    pub name: String,
    pub product_type: ProductType,
    pub measurement_unit: Option<MeasurementUnit>,
}

/// One ingredient consumed by a recipe step.
///
/// Exactly one of `ingredient` (a concrete ingredient with storage
/// attributes) and `recipe_step_product_id` (the output of an earlier step)
/// is populated; the database enforces this with a CHECK constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStepIngredient {
    pub id: String,
    pub name: String,
    pub measurement_unit: MeasurementUnit,
    pub minimum_quantity: f64,
    pub maximum_quantity: Option<f64>,
    pub ingredient: Option<Ingredient>,
    pub recipe_step_product_id: Option<String>,
}

/// One ordered step within a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStep {
    pub id: String,
    /// 0-based position within the recipe.
    pub index: usize,
    pub preparation: Preparation,
    pub ingredients: Vec<RecipeStepIngredient>,
    pub products: Vec<RecipeStepProduct>,
    pub notes: String,
}

/// A recipe: an ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub steps: Vec<RecipeStep>,
}

/// A meal, which groups one or more recipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Meal {
    pub id: String,
    pub name: String,
}

/// A single user's vote for a meal plan option.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanOptionVote {
    pub id: String,
    pub meal_plan_option_id: String,
    pub by_user: String,
    pub created_at: DateTime<Utc>,
}

/// One candidate meal for one event of a meal plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealPlanOption {
    pub id: String,
    pub meal: Meal,
    pub chosen: bool,
    pub tiebroken: bool,
    pub votes: Vec<MealPlanOptionVote>,
}

/// A scheduled occasion within a meal plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealPlanEvent {
    pub id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub options: Vec<MealPlanOption>,
}

/// A meal plan with its events, options, and votes hydrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealPlan {
    pub id: String,
    pub household_id: String,
    pub status: MealPlanStatus,
    pub voting_deadline: DateTime<Utc>,
    pub events: Vec<MealPlanEvent>,
    pub created_at: DateTime<Utc>,
}

/// A derived preparation task attached to a meal plan option.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanTask {
    pub id: String,
    pub meal_plan_option_id: String,
    pub creation_explanation: String,
    pub status: MealPlanTaskStatus,
    pub cannot_complete_before: DateTime<Utc>,
    pub cannot_complete_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a preparation task. The storage layer generates the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanTaskCreationInput {
    pub meal_plan_option_id: String,
    pub creation_explanation: String,
    pub cannot_complete_before: DateTime<Utc>,
    pub cannot_complete_after: DateTime<Utc>,
}

/// An aggregated grocery list line for a meal plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanGroceryListItem {
    pub id: String,
    pub meal_plan_id: String,
    pub ingredient_id: String,
    pub measurement_unit_id: String,
    pub minimum_quantity: f64,
    pub maximum_quantity: f64,
    pub status: GroceryListItemStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a grocery list item. The storage layer generates the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryListItemCreationInput {
    pub meal_plan_id: String,
    pub ingredient_id: String,
    pub measurement_unit_id: String,
    pub minimum_quantity: f64,
    pub maximum_quantity: f64,
}

// ---------------------------------------------------------------------------
// Finalization outcome
// ---------------------------------------------------------------------------

/// The winning option selected for one event during finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChosenOption {
    pub event_id: String,
    pub option_id: String,
    /// Set when the winner was decided by the id tie-break rather than by a
    /// strict vote majority.
    pub tiebroken: bool,
}

/// What should happen to a meal plan, as decided by the pure lifecycle
/// evaluation. The transactional apply step in the store turns this into
/// row updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanTransition {
    /// Mark the listed options chosen and the plan `finalized`.
    Finalize(Vec<ChosenOption>),
    /// Mark the plan `expired`.
    Expire,
    /// Leave the plan untouched.
    NoChange,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
