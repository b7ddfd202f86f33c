// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! Rising edge detection for tamper readings

/// Whether an update should start an escalation.
///
/// Only a reading that is `true` and flagged as changed by its producer
/// counts. A source that stays tripped and re-reports `true` does not fire
/// again. The stored previous value is not consulted; the event's own
/// change flag is authoritative.
pub fn is_alarm_edge(_previous: Option<bool>, new_value: bool, value_changed: bool) -> bool {
    new_value && value_changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truth_table() {
        for previous in [None, Some(false), Some(true)] {
            for new_value in [false, true] {
                for changed in [false, true] {
                    let expected = new_value && changed;
                    assert_eq!(
                        is_alarm_edge(previous, new_value, changed),
                        expected,
                        "previous={:?} new={} changed={}",
                        previous,
                        new_value,
                        changed
                    );
                }
            }
        }
    }

    #[test]
    fn test_stable_true_is_not_an_edge() {
        assert!(!is_alarm_edge(Some(true), true, false));
        assert!(is_alarm_edge(Some(false), true, true));
    }
}
