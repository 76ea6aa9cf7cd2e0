use std::collections::BTreeSet;

use crate::contract::{StopOutcome, TrackingServer};

/// Returns the running servers in inventory order.
pub fn select_actionable(inventory: &[TrackingServer]) -> Vec<TrackingServer> {
    inventory
        .iter()
        .filter(|server| server.status.is_running())
        .cloned()
        .collect()
}

/// Checks that the outcomes cover the actionable set exactly once by name.
///
/// Each outcome is either stopped or failed, so one outcome per server means
/// the stopped and failed lists are disjoint and together equal the set.
pub fn validate_partition(
    actionable: &[TrackingServer],
    outcomes: &[StopOutcome],
) -> Result<(), String> {
    if outcomes.len() != actionable.len() {
        return Err(format!(
            "expected {} outcomes, got {}",
            actionable.len(),
            outcomes.len()
        ));
    }

    let mut outcome_names = BTreeSet::new();
    for outcome in outcomes {
        if !outcome_names.insert(outcome.name.as_str()) {
            return Err(format!("server '{}' has more than one outcome", outcome.name));
        }
    }

    let actionable_names: BTreeSet<&str> = actionable.iter().map(|s| s.name.as_str()).collect();
    if actionable_names != outcome_names {
        return Err("outcome names do not match the actionable servers".to_string());
    }

    Ok(())
}
