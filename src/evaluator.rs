//! Completeness evaluator: derives per-step status from a record and a schema

use std::collections::BTreeMap;

use crate::record::SubjectRecord;
use crate::schema::WizardSchema;

/// Derived per-step completeness, recomputed on every record change and
/// never mutated directly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepStatusMap {
    statuses: BTreeMap<u32, bool>,
    complete: bool,
}

impl StepStatusMap {
    /// Whether the given step is satisfied. Unknown step ids read as
    /// incomplete (fail closed).
    pub fn is_satisfied(&self, step_id: u32) -> bool {
        self.statuses.get(&step_id).copied().unwrap_or(false)
    }

    /// Whether every step of the wizard is satisfied
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Smallest step id that is not yet satisfied
    pub fn first_incomplete(&self) -> Option<u32> {
        self.statuses
            .iter()
            .find(|(_, satisfied)| !**satisfied)
            .map(|(step_id, _)| *step_id)
    }

    /// Iterate over `(step_id, satisfied)` pairs in step order
    pub fn iter(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        self.statuses.iter().map(|(id, ok)| (*id, *ok))
    }
}

/// Evaluate a record against a wizard schema.
///
/// For each step, the branch conditions select the active required fields;
/// the step is satisfied iff every active field resolves to a non-empty
/// value. A step whose conditions leave no field active is satisfied (its
/// branch was taken elsewhere). Pure and deterministic: identical inputs
/// always yield identical output.
pub fn evaluate(record: &SubjectRecord, schema: &WizardSchema) -> StepStatusMap {
    let mut statuses = BTreeMap::new();

    for step in &schema.steps {
        let satisfied = step
            .active_requirements(record)
            .into_iter()
            .all(|field| record.is_satisfied(field));
        statuses.insert(step.step_id, satisfied);
    }

    let complete = !statuses.is_empty() && statuses.values().all(|ok| *ok);

    StepStatusMap { statuses, complete }
}
