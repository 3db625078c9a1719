//! Wire payloads for the chore and data-changes topics. All payloads are
//! JSON documents.

use serde::{Deserialize, Serialize};

/// Event type published when a meal plan finalizes.
pub const MEAL_PLAN_FINALIZED: &str = "meal_plan_finalized";
/// Event type published when a meal plan expires unresolved.
pub const MEAL_PLAN_EXPIRED: &str = "meal_plan_expired";
/// Event type published for each preparation task materialized.
pub const MEAL_PLAN_TASK_CREATED: &str = "meal_plan_task_created";
/// Event type published for each grocery list item initialized.
pub const GROCERY_LIST_ITEM_CREATED: &str = "meal_plan_grocery_list_item_created";

/// The unit of periodic work named by a chore message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoreType {
    #[serde(rename = "finalize_meal_plans")]
    FinalizeExpiredMealPlans,
    CreateMealPlanTasks,
    InitializeGroceryLists,
}

/// A self-triggering directive placed on the chore topic by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoreMessage {
    pub chore_type: ChoreType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_plan_id: Option<String>,
}

impl ChoreMessage {
    pub fn new(chore_type: ChoreType) -> Self {
        Self {
            chore_type,
            meal_plan_id: None,
        }
    }

    pub fn for_meal_plan(chore_type: ChoreType, meal_plan_id: impl Into<String>) -> Self {
        Self {
            chore_type,
            meal_plan_id: Some(meal_plan_id.into()),
        }
    }
}

/// A post-hoc notification that some entity changed; the substrate for
/// webhook dispatch and search indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChangeMessage {
    pub event_type: String,
    pub household_id: String,
    pub entity_id: String,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chore_types_serialize_to_wire_names() {
        for (chore_type, wire) in [
            (ChoreType::FinalizeExpiredMealPlans, "finalize_meal_plans"),
            (ChoreType::CreateMealPlanTasks, "create_meal_plan_tasks"),
            (ChoreType::InitializeGroceryLists, "initialize_grocery_lists"),
        ] {
            let message = ChoreMessage::new(chore_type);
            let json = serde_json::to_value(&message).expect("serialize");
            assert_eq!(json["chore_type"], wire);
        }
    }

    #[test]
    fn chore_without_plan_id_omits_the_field() {
        let message = ChoreMessage::new(ChoreType::CreateMealPlanTasks);
        let json = serde_json::to_string(&message).expect("serialize");
        assert!(!json.contains("meal_plan_id"));
    }

    #[test]
    fn chore_roundtrip_with_plan_id() {
        let message = ChoreMessage::for_meal_plan(ChoreType::InitializeGroceryLists, "plan-9");
        let json = serde_json::to_string(&message).expect("serialize");
        let parsed: ChoreMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, message);
        assert_eq!(parsed.meal_plan_id.as_deref(), Some("plan-9"));
    }

    #[test]
    fn data_change_roundtrip() {
        let message = DataChangeMessage {
            event_type: MEAL_PLAN_FINALIZED.to_owned(),
            household_id: "h1".to_owned(),
            entity_id: "plan-1".to_owned(),
            entity_type: "meal_plan".to_owned(),
            payload: Some(serde_json::json!({"id": "plan-1"})),
        };
        let bytes = serde_json::to_vec(&message).expect("serialize");
        let parsed: DataChangeMessage = serde_json::from_slice(&bytes).expect("deserialize");
        assert_eq!(parsed, message);
    }

    #[test]
    fn unknown_chore_type_fails_to_parse() {
        let result =
            serde_json::from_str::<ChoreMessage>(r#"{"chore_type": "sweep_the_floor"}"#);
        assert!(result.is_err());
    }
}
