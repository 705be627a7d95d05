//! Research deduplication across runs.
//!
//! The identifiers already present in a track's `researchedIssues` are handed
//! to the research engine run as an exclusion list. After the run the state is
//! re-read and the set difference tells how much new research landed. The
//! pipeline itself never removes identifiers.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::core::artifacts::TrackState;

/// Rendered exclusion list when nothing has been researched yet.
pub const NONE_YET: &str = "none yet";

/// Already-researched identifiers, numeric ids in numeric order first.
pub fn exclusion_list(track: Option<&TrackState>) -> Vec<String> {
    let mut ids: Vec<String> = track
        .map(|t| t.researched_issues.keys().cloned().collect())
        .unwrap_or_default();
    ids.sort_by(|a, b| compare_ids(a, b));
    ids
}

pub fn render_exclusions(ids: &[String]) -> String {
    if ids.is_empty() {
        NONE_YET.to_string()
    } else {
        ids.join(", ")
    }
}

/// Identifiers present after the run that were not excluded before it.
pub fn new_identifiers(before: &[String], after: Option<&TrackState>) -> Vec<String> {
    let seen: BTreeSet<&str> = before.iter().map(String::as_str).collect();
    exclusion_list(after)
        .into_iter()
        .filter(|id| !seen.contains(id.as_str()))
        .collect()
}

fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track(ids: &[&str]) -> TrackState {
        let mut state = TrackState::default();
        for id in ids {
            state
                .researched_issues
                .insert((*id).to_string(), json!({"summary": "notes"}));
        }
        state
    }

    #[test]
    fn exclusion_list_contains_exactly_researched_ids() {
        let state = track(&["45", "12"]);
        assert_eq!(exclusion_list(Some(&state)), vec!["12", "45"]);
        assert_eq!(render_exclusions(&exclusion_list(Some(&state))), "12, 45");
    }

    #[test]
    fn numeric_ids_sort_numerically() {
        let state = track(&["100", "9", "gh-7"]);
        assert_eq!(exclusion_list(Some(&state)), vec!["9", "100", "gh-7"]);
    }

    #[test]
    fn empty_state_renders_none_yet() {
        assert!(exclusion_list(None).is_empty());
        assert_eq!(render_exclusions(&[]), NONE_YET);
    }

    #[test]
    fn new_identifiers_is_a_set_difference() {
        let before = exclusion_list(Some(&track(&["12", "45"])));
        let after = track(&["12", "45", "77"]);
        assert_eq!(new_identifiers(&before, Some(&after)), vec!["77"]);
    }

    #[test]
    fn new_identifiers_ignores_removed_entries() {
        let before = exclusion_list(Some(&track(&["12", "45"])));
        let after = track(&["45", "77", "78"]);
        assert_eq!(new_identifiers(&before, Some(&after)).len(), 2);
        assert!(new_identifiers(&before, None).is_empty());
    }
}
