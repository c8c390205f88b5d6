//! NodePool status conditions

use fleet_common::crd::{
    Condition, ConditionStatus, AS_EXPECTED_REASON, AUTOSCALING_ENABLED_CONDITION,
    VALIDATION_FAILED_REASON,
};

use crate::mode::ScalingMode;

/// Set a condition, replacing any existing condition of the same type.
///
/// `lastTransitionTime` only moves when the status changes; a reason or
/// message change keeps the previous timestamp. Returns true if anything
/// changed.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == new.type_) {
        None => {
            conditions.push(new);
            true
        }
        Some(existing) if existing.status != new.status => {
            *existing = new;
            true
        }
        Some(existing) => {
            if existing.reason == new.reason && existing.message == new.message {
                return false;
            }
            existing.reason = new.reason;
            existing.message = new.message;
            true
        }
    }
}

/// `AutoscalingEnabled` condition for a successfully resolved mode
pub fn autoscaling_condition(mode: &ScalingMode) -> Condition {
    match mode {
        ScalingMode::Fixed { .. } => Condition::new(
            AUTOSCALING_ENABLED_CONDITION,
            ConditionStatus::False,
            AS_EXPECTED_REASON,
            "",
        ),
        ScalingMode::Autoscaling { .. } => Condition::new(
            AUTOSCALING_ENABLED_CONDITION,
            ConditionStatus::True,
            AS_EXPECTED_REASON,
            "Ignoring nodeCount",
        ),
    }
}

/// `AutoscalingEnabled` condition for rejected bounds
pub fn validation_failed_condition(message: impl Into<String>) -> Condition {
    Condition::new(
        AUTOSCALING_ENABLED_CONDITION,
        ConditionStatus::False,
        VALIDATION_FAILED_REASON,
        message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn aged(mut condition: Condition) -> Condition {
        condition.last_transition_time = Utc::now() - Duration::hours(1);
        condition
    }

    #[test]
    fn adds_missing_condition() {
        let mut conditions = Vec::new();
        assert!(set_condition(
            &mut conditions,
            autoscaling_condition(&ScalingMode::Fixed { replicas: 1 })
        ));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, ConditionStatus::False);
    }

    #[test]
    fn identical_condition_is_a_no_op() {
        let original = aged(autoscaling_condition(&ScalingMode::Fixed { replicas: 1 }));
        let mut conditions = vec![original.clone()];

        let changed = set_condition(
            &mut conditions,
            autoscaling_condition(&ScalingMode::Fixed { replicas: 2 }),
        );

        assert!(!changed);
        assert_eq!(conditions, vec![original]);
    }

    /// Story: fixing invalid bounds keeps one condition and only moves the
    /// transition time when the status flips
    #[test]
    fn story_condition_replaced_in_place_across_transitions() {
        let failed = aged(validation_failed_condition("max must be equal or greater than min"));
        let failed_at = failed.last_transition_time;
        let mut conditions = vec![failed];

        // Same status (False), new reason: timestamp preserved
        assert!(set_condition(
            &mut conditions,
            autoscaling_condition(&ScalingMode::Fixed { replicas: 2 })
        ));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason, AS_EXPECTED_REASON);
        assert_eq!(conditions[0].message, "");
        assert_eq!(conditions[0].last_transition_time, failed_at);

        // Status flips to True: timestamp moves
        assert!(set_condition(
            &mut conditions,
            autoscaling_condition(&ScalingMode::Autoscaling { min: 1, max: 3 })
        ));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert_eq!(conditions[0].message, "Ignoring nodeCount");
        assert!(conditions[0].last_transition_time > failed_at);
    }

    #[test]
    fn other_condition_types_are_untouched() {
        let other = aged(Condition::new("Ready", ConditionStatus::True, "AsExpected", ""));
        let mut conditions = vec![other.clone()];
        set_condition(&mut conditions, validation_failed_condition("bad"));
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0], other);
    }
}
