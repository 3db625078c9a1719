//! Meal plan lifecycle evaluation.
//!
//! The pure transition function lives here so it can be tested in
//! isolation; the transactional apply step is the store's
//! `apply_plan_transition`, which serializes concurrent finalizers on a
//! row-level lock and a status guard.

use chrono::{DateTime, Utc};

use sous_db::models::{ChosenOption, MealPlan, MealPlanOption, MealPlanStatus, PlanTransition};

/// Decide the winning option among an event's candidates.
///
/// The option with the highest vote tally wins; ties are broken by the
/// lexicographically smallest option id. Returns `None` when no option has
/// any votes. The boolean reports whether the tie-break decided the winner.
pub fn decide_option_winner(options: &[MealPlanOption]) -> Option<(String, bool)> {
    let max_votes = options.iter().map(|o| o.votes.len()).max()?;
    if max_votes == 0 {
        return None;
    }

    let mut leaders: Vec<&str> = options
        .iter()
        .filter(|o| o.votes.len() == max_votes)
        .map(|o| o.id.as_str())
        .collect();
    leaders.sort_unstable();

    let tiebroken = leaders.len() > 1;
    Some((leaders[0].to_owned(), tiebroken))
}

/// Evaluate what should happen to a meal plan at `now`.
///
/// A plan finalizes when every event has at least `vote_threshold` votes and
/// a unique winner; it expires once the deadline has passed and finalization
/// is still not possible. Plans already resolved never change again.
pub fn evaluate_plan(plan: &MealPlan, now: DateTime<Utc>, vote_threshold: usize) -> PlanTransition {
    if plan.status != MealPlanStatus::AwaitingVotes {
        return PlanTransition::NoChange;
    }

    let mut chosen = Vec::with_capacity(plan.events.len());
    let mut finalizable = !plan.events.is_empty();

    for event in &plan.events {
        // An option chosen earlier (a partially applied finalization) is
        // honored as-is.
        if let Some(existing) = event.options.iter().find(|o| o.chosen) {
            chosen.push(ChosenOption {
                event_id: event.id.clone(),
                option_id: existing.id.clone(),
                tiebroken: existing.tiebroken,
            });
            continue;
        }

        let total_votes: usize = event.options.iter().map(|o| o.votes.len()).sum();
        if total_votes < vote_threshold {
            finalizable = false;
            continue;
        }

        match decide_option_winner(&event.options) {
            Some((option_id, tiebroken)) => chosen.push(ChosenOption {
                event_id: event.id.clone(),
                option_id,
                tiebroken,
            }),
            None => finalizable = false,
        }
    }

    if finalizable {
        PlanTransition::Finalize(chosen)
    } else if now > plan.voting_deadline {
        PlanTransition::Expire
    } else {
        PlanTransition::NoChange
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sous_db::models::{Meal, MealPlanEvent, MealPlanOptionVote};

    fn vote(option_id: &str, user: &str) -> MealPlanOptionVote {
        MealPlanOptionVote {
            id: format!("vote-{option_id}-{user}"),
            meal_plan_option_id: option_id.to_owned(),
            by_user: user.to_owned(),
            created_at: Utc::now(),
        }
    }

    fn option(id: &str, voters: &[&str]) -> MealPlanOption {
        MealPlanOption {
            id: id.to_owned(),
            meal: Meal {
                id: format!("meal-{id}"),
                name: "dinner".to_owned(),
            },
            chosen: false,
            tiebroken: false,
            votes: voters.iter().map(|u| vote(id, u)).collect(),
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

    fn plan(deadline_offset: Duration, events: Vec<MealPlanEvent>) -> MealPlan {
        MealPlan {
            id: "plan-1".to_owned(),
            household_id: "household-1".to_owned(),
            status: MealPlanStatus::AwaitingVotes,
            voting_deadline: Utc::now() + deadline_offset,
            events,
            created_at: Utc::now() - Duration::days(1),
        }
    }

    #[test]
    fn winner_is_highest_tally() {
        let options = vec![
            option("opt-a", &["u1"]),
            option("opt-b", &["u2", "u3"]),
        ];
        let (winner, tiebroken) = decide_option_winner(&options).expect("winner");
        assert_eq!(winner, "opt-b");
        assert!(!tiebroken);
    }

    #[test]
    fn tie_breaks_to_smallest_id() {
        let options = vec![
            option("opt-b", &["u1"]),
            option("opt-a", &["u2"]),
        ];
        let (winner, tiebroken) = decide_option_winner(&options).expect("winner");
        assert_eq!(winner, "opt-a");
        assert!(tiebroken);
    }

    #[test]
    fn no_votes_means_no_winner() {
        let options = vec![option("opt-a", &[]), option("opt-b", &[])];
        assert!(decide_option_winner(&options).is_none());
    }

    #[test]
    fn plan_with_votes_finalizes() {
        let plan = plan(
            Duration::hours(1),
            vec![
                event("e1", vec![option("opt-a", &["u1"]), option("opt-b", &[])]),
                event("e2", vec![option("opt-c", &["u1", "u2"])]),
            ],
        );

        let transition = evaluate_plan(&plan, Utc::now(), 1);
        let PlanTransition::Finalize(chosen) = transition else {
            panic!("expected Finalize, got {transition:?}");
        };
        assert_eq!(chosen.len(), 2);
        assert_eq!(chosen[0].option_id, "opt-a");
        assert_eq!(chosen[1].option_id, "opt-c");
    }

    #[test]
    fn voteless_plan_past_deadline_expires() {
        let plan = plan(
            Duration::minutes(-1),
            vec![event("e1", vec![option("opt-a", &[])])],
        );
        assert_eq!(evaluate_plan(&plan, Utc::now(), 1), PlanTransition::Expire);
    }

    #[test]
    fn voteless_plan_before_deadline_waits() {
        let plan = plan(
            Duration::hours(1),
            vec![event("e1", vec![option("opt-a", &[])])],
        );
        assert_eq!(evaluate_plan(&plan, Utc::now(), 1), PlanTransition::NoChange);
    }

    #[test]
    fn one_voteless_event_blocks_finalization() {
        let plan = plan(
            Duration::minutes(-1),
            vec![
                event("e1", vec![option("opt-a", &["u1"])]),
                event("e2", vec![option("opt-b", &[])]),
            ],
        );
        assert_eq!(evaluate_plan(&plan, Utc::now(), 1), PlanTransition::Expire);
    }

    #[test]
    fn threshold_gates_finalization() {
        let plan = plan(
            Duration::hours(1),
            vec![event("e1", vec![option("opt-a", &["u1"])])],
        );
        // Two votes required, only one cast.
        assert_eq!(evaluate_plan(&plan, Utc::now(), 2), PlanTransition::NoChange);
    }

    #[test]
    fn already_resolved_plans_never_change() {
        let mut finalized = plan(
            Duration::minutes(-1),
            vec![event("e1", vec![option("opt-a", &["u1"])])],
        );
        finalized.status = MealPlanStatus::Finalized;
        assert_eq!(
            evaluate_plan(&finalized, Utc::now(), 1),
            PlanTransition::NoChange
        );

        let mut expired = finalized.clone();
        expired.status = MealPlanStatus::Expired;
        assert_eq!(
            evaluate_plan(&expired, Utc::now(), 1),
            PlanTransition::NoChange
        );
    }

    #[test]
    fn previously_chosen_option_is_honored() {
        let mut chosen_option = option("opt-a", &[]);
        chosen_option.chosen = true;
        let plan = plan(Duration::minutes(-1), vec![event("e1", vec![chosen_option])]);

        let transition = evaluate_plan(&plan, Utc::now(), 1);
        let PlanTransition::Finalize(chosen) = transition else {
            panic!("expected Finalize, got {transition:?}");
        };
        assert_eq!(chosen[0].option_id, "opt-a");
    }

    #[test]
    fn eventless_plan_expires_after_deadline() {
        let plan = plan(Duration::minutes(-1), vec![]);
        assert_eq!(evaluate_plan(&plan, Utc::now(), 1), PlanTransition::Expire);
    }
}
