//! Status computation shared by the per-kind reconcile bodies.
//!
//! Builds the condition set for a reconcile outcome. Persisting is left to
//! the kind bodies, which write only when a condition, the observed
//! generation, or a scalar status field actually changed: a status write
//! bumps the resource revision, so unconditional writes would re-trigger
//! reconciliation forever.

use crate::error::ReconcileError;
use crate::resource::condition::{types as condition_types, Condition, ConditionStatus};
use crate::types::Generation;

/// Reachability / credential validity. A credential failure reports
/// `CredentialsError`; any other failure leaves connectivity `Unknown`
/// rather than claiming the endpoint is down.
pub fn connected_condition(generation: Generation, err: Option<&ReconcileError>) -> Condition {
    match err {
        Some(e) if e.is_credential() => Condition::new(
            condition_types::CONNECTED,
            ConditionStatus::False,
            "CredentialsError",
            e.to_string(),
            generation,
        ),
        Some(e) => Condition::new(
            condition_types::CONNECTED,
            ConditionStatus::Unknown,
            "Unknown",
            e.to_string(),
            generation,
        ),
        None => Condition::new(
            condition_types::CONNECTED,
            ConditionStatus::True,
            "Connected",
            "Credentials validated successfully",
            generation,
        ),
    }
}

/// Full materialization of owned objects.
pub fn ready_condition(
    generation: Generation,
    err: Option<&ReconcileError>,
    success_message: &str,
) -> Condition {
    match err {
        Some(e) => Condition::new(
            condition_types::READY,
            ConditionStatus::False,
            "ReconcileFailed",
            e.to_string(),
            generation,
        ),
        None => Condition::new(
            condition_types::READY,
            ConditionStatus::True,
            "Ready",
            success_message,
            generation,
        ),
    }
}

/// Spec accepted and processed.
pub fn accepted_condition(generation: Generation, err: Option<&ReconcileError>) -> Condition {
    match err {
        Some(e) => Condition::new(
            condition_types::ACCEPTED,
            ConditionStatus::False,
            "ReconcileFailed",
            e.to_string(),
            generation,
        ),
        None => Condition::new(
            condition_types::ACCEPTED,
            ConditionStatus::True,
            "Reconciled",
            "",
            generation,
        ),
    }
}
