//! Typed status conditions.
//!
//! A condition set holds at most one entry per condition type. Updates never
//! regress `observed_generation`, and `last_transition_time` only moves when
//! the status value actually flips, so repeated identical writes are
//! detectable as no-ops by the caller.

use crate::types::Generation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A typed status fact with reason and message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub observed_generation: Generation,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        condition_type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        observed_generation: Generation,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }
}

/// Condition type names used across kinds.
pub mod types {
    /// Spec was processed (valid and materialized into derived records).
    pub const ACCEPTED: &str = "Accepted";
    /// Remote endpoint reachable and credentials valid.
    pub const CONNECTED: &str = "Connected";
    /// Owned objects fully materialized.
    pub const READY: &str = "Ready";
}

/// Insert or update `candidate` in `conditions`, returning whether anything
/// observable changed.
///
/// `last_transition_time` is preserved from the existing entry unless the
/// status value flips. `observed_generation` never moves backwards; a
/// candidate carrying an older generation than the recorded one is dropped.
pub fn set_condition(conditions: &mut Vec<Condition>, mut candidate: Condition) -> bool {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == candidate.condition_type)
    {
        Some(existing) => {
            if candidate.observed_generation < existing.observed_generation {
                return false;
            }
            if existing.status == candidate.status {
                candidate.last_transition_time = existing.last_transition_time;
            }
            let changed = existing.status != candidate.status
                || existing.reason != candidate.reason
                || existing.message != candidate.message
                || existing.observed_generation != candidate.observed_generation;
            *existing = candidate;
            changed
        }
        None => {
            conditions.push(candidate);
            true
        }
    }
}

/// Look up a condition by type.
pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}

/// Whether a condition of the given type is present with status True.
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    matches!(
        find_condition(conditions, condition_type),
        Some(c) if c.status == ConditionStatus::True
    )
}
