//! Step navigator: per-subject state machine over the wizard's steps
//!
//! Owns the subject record and the current step for exactly one subject at
//! a time. All completeness decisions go through the evaluator; all I/O
//! goes through the [`RecordStore`] boundary.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::NavigatorConfig;
use crate::error::EngineError;
use crate::evaluator::{evaluate, StepStatusMap};
use crate::record::SubjectRecord;
use crate::schema::WizardSchema;
use crate::store::RecordStore;
use crate::validation::validate_step;

/// Outcome of a step submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The payload was submitted and the updated record applied
    Applied { next_step: u32 },
    /// The step was already satisfied; the store was not called
    AlreadySatisfied { next_step: u32 },
    /// The subject changed while the submission was outstanding; the
    /// response was discarded
    Stale,
}

/// Returns the smallest incomplete step, or step 1 when every step is
/// satisfied (literal source behavior; callers distinguish the terminal
/// state via [`StepStatusMap::is_complete`])
pub fn determine_step(status: &StepStatusMap) -> u32 {
    status.first_incomplete().unwrap_or(1)
}

/// Per-subject navigator over a wizard schema
pub struct Navigator {
    store: Arc<dyn RecordStore>,
    schema: WizardSchema,
    auto_advance: bool,
    subject_id: String,
    record: SubjectRecord,
    status: StepStatusMap,
    current_step: u32,
    /// Bumped on subject change; responses carrying an older generation
    /// are discarded on arrival
    generation: u64,
    /// Steps with an outstanding submission, tagged with the generation
    /// they were started under
    in_flight: HashMap<u32, u64>,
    /// Set when the caller navigated manually; suppresses auto-advance
    /// until the displayed step is submitted
    manual_nav: bool,
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigator")
            .field("subject_id", &self.subject_id)
            .field("auto_advance", &self.auto_advance)
            .field("record", &self.record)
            .field("status", &self.status)
            .field("current_step", &self.current_step)
            .field("generation", &self.generation)
            .field("in_flight", &self.in_flight)
            .field("manual_nav", &self.manual_nav)
            .finish_non_exhaustive()
    }
}

impl Navigator {
    /// Construct a navigator for one subject: validates the schema, fetches
    /// the record, and adopts the externally persisted current step when it
    /// is a valid step id (the user may have navigated manually), deriving
    /// and persisting it otherwise.
    pub async fn load(
        store: Arc<dyn RecordStore>,
        schema: WizardSchema,
        config: &NavigatorConfig,
        subject_id: impl Into<String>,
    ) -> Result<Self, EngineError> {
        if let Err(problems) = schema.validate() {
            return Err(EngineError::InvalidSchema {
                wizard: schema.key.clone(),
                problems,
            });
        }

        let subject_id = subject_id.into();
        let record = store
            .fetch_record(&subject_id)
            .await
            .map_err(|source| EngineError::Fetch {
                subject_id: subject_id.clone(),
                source,
            })?;
        let status = evaluate(&record, &schema);

        let mut navigator = Self {
            store,
            schema,
            auto_advance: config.auto_advance,
            subject_id,
            record,
            status,
            current_step: 1,
            generation: 0,
            in_flight: HashMap::new(),
            manual_nav: false,
        };
        navigator.init_current_step().await;
        Ok(navigator)
    }

    /// Adopt the persisted step if valid, otherwise derive and persist
    async fn init_current_step(&mut self) {
        let persisted = match self.store.current_step(&self.subject_id).await {
            Ok(step) => step,
            Err(e) => {
                warn!(subject = %self.subject_id, "Could not read persisted step: {e}");
                None
            }
        };

        match persisted {
            Some(step) if step >= 1 && step <= self.schema.total_steps() => {
                self.current_step = step;
            }
            _ => {
                self.current_step = determine_step(&self.status);
                self.persist_current_step().await;
            }
        }
        info!(
            subject = %self.subject_id,
            step = self.current_step,
            "Navigator loaded"
        );
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn record(&self) -> &SubjectRecord {
        &self.record
    }

    pub fn status(&self) -> &StepStatusMap {
        &self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Move forward one step, clamped to the last step. Marks manual
    /// navigation, which suppresses the next auto-advance.
    pub async fn advance(&mut self) -> u32 {
        let target = (self.current_step + 1).min(self.schema.total_steps());
        self.navigate_to(target).await
    }

    /// Move back one step, clamped to step 1
    pub async fn retreat(&mut self) -> u32 {
        let target = self.current_step.saturating_sub(1).max(1);
        self.navigate_to(target).await
    }

    async fn navigate_to(&mut self, step: u32) -> u32 {
        if step != self.current_step {
            debug!(
                subject = %self.subject_id,
                from = self.current_step,
                to = step,
                "Manual navigation"
            );
            self.current_step = step;
            self.persist_current_step().await;
        }
        self.manual_nav = true;
        self.current_step
    }

    /// Refetch the subject record. On failure the record and the current
    /// step are kept and a retryable error is returned; the navigator never
    /// resets to step 1 because a fetch failed.
    pub async fn reload(&mut self) -> Result<(), EngineError> {
        let generation = self.generation;
        let record = self
            .store
            .fetch_record(&self.subject_id)
            .await
            .map_err(|source| EngineError::Fetch {
                subject_id: self.subject_id.clone(),
                source,
            })?;

        if self.generation != generation {
            debug!(subject = %self.subject_id, "Dropping stale fetch result");
            return Ok(());
        }

        // A fresh record invalidates any mark left behind by a submission
        // future that was dropped mid-flight
        self.in_flight.clear();
        self.apply_record(record).await;
        Ok(())
    }

    /// Switch to a different subject. Bumps the generation counter so any
    /// outstanding fetch or submission for the previous subject is
    /// discarded on arrival.
    pub async fn set_subject(&mut self, subject_id: impl Into<String>) -> Result<(), EngineError> {
        self.generation += 1;
        self.in_flight.clear();
        self.manual_nav = false;
        self.subject_id = subject_id.into();

        let record = self
            .store
            .fetch_record(&self.subject_id)
            .await
            .map_err(|source| EngineError::Fetch {
                subject_id: self.subject_id.clone(),
                source,
            })?;
        self.record = record;
        self.status = evaluate(&self.record, &self.schema);
        self.init_current_step().await;
        Ok(())
    }

    /// Submit a step payload.
    ///
    /// The payload is validated locally against the record first; a step
    /// whose data already satisfies its rule is not re-submitted; at most
    /// one submission per step may be in flight. On success the store's
    /// updated record replaces the local one wholesale before any
    /// transition decision is made.
    pub async fn submit(
        &mut self,
        step_id: u32,
        payload: SubjectRecord,
    ) -> Result<SubmitOutcome, EngineError> {
        if self.schema.get_step(step_id).is_none() {
            return Err(EngineError::UnknownStep {
                wizard: self.schema.key.clone(),
                step_id,
            });
        }

        // Validate against the candidate record so that cross-field
        // conditions can reference fields from earlier steps
        let mut candidate = self.record.clone();
        candidate.merge(payload.clone());
        let report = validate_step(&self.schema, step_id, &candidate);
        if !report.is_ok() {
            return Err(EngineError::Validation { step_id, report });
        }

        // Idempotent re-entry: a step already satisfied by the existing
        // record is not re-submitted
        if self.status.is_satisfied(step_id) {
            debug!(
                subject = %self.subject_id,
                step = step_id,
                "Step already satisfied, skipping submission"
            );
            if step_id == self.current_step {
                self.manual_nav = false;
            }
            self.maybe_auto_advance().await;
            return Ok(SubmitOutcome::AlreadySatisfied {
                next_step: self.current_step,
            });
        }

        let generation = self.generation;
        if self.in_flight.get(&step_id) == Some(&generation) {
            return Err(EngineError::SubmissionInFlight { step_id });
        }
        self.in_flight.insert(step_id, generation);

        let result = self
            .store
            .submit_step(&self.subject_id, step_id, payload)
            .await;

        if self.generation != generation {
            // Subject changed while the submission was outstanding
            debug!(step = step_id, "Dropping stale submission result");
            return Ok(SubmitOutcome::Stale);
        }
        self.in_flight.remove(&step_id);

        let updated = result.map_err(|source| EngineError::Submit {
            subject_id: self.subject_id.clone(),
            step_id,
            source,
        })?;

        if step_id == self.current_step {
            self.manual_nav = false;
        }
        self.apply_record(updated).await;
        Ok(SubmitOutcome::Applied {
            next_step: self.current_step,
        })
    }

    /// Replace the record, recompute step status, and auto-advance at most
    /// once. The direct jump to the first incomplete step (rather than a
    /// step-by-step walk) is what prevents transition storms when two steps
    /// reference each other's fields.
    async fn apply_record(&mut self, record: SubjectRecord) {
        self.record = record;
        self.status = evaluate(&self.record, &self.schema);
        self.maybe_auto_advance().await;
    }

    async fn maybe_auto_advance(&mut self) {
        if !self.auto_advance || self.manual_nav {
            return;
        }
        if !self.status.is_satisfied(self.current_step) {
            return;
        }
        if let Some(next) = self.status.first_incomplete() {
            if next != self.current_step {
                info!(
                    subject = %self.subject_id,
                    from = self.current_step,
                    to = next,
                    "Auto-advancing to next incomplete step"
                );
                self.current_step = next;
                self.persist_current_step().await;
            }
        }
    }

    /// Persist the current step as external view-state. Persistence
    /// failures are logged but do not fail navigation; the step value is
    /// authoritative in memory.
    async fn persist_current_step(&self) {
        if let Err(e) = self
            .store
            .set_current_step(&self.subject_id, self.current_step)
            .await
        {
            warn!(subject = %self.subject_id, "Could not persist current step: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;

    fn make_test_schema() -> WizardSchema {
        WizardSchema::from_json(
            r#"{
                "key": "REG",
                "name": "Registration",
                "steps": [
                    {
                        "step_id": 1,
                        "name": "profile",
                        "requires": [ { "field": "fullName" } ],
                        "fields": [ { "field": "fullName", "constraints": [ { "kind": "required" } ] } ]
                    },
                    {
                        "step_id": 2,
                        "name": "document",
                        "requires": [
                            { "field": "commercialRegistration",
                              "when": { "kind": "when_falsy", "field": "isFreelancer" } },
                            { "field": "freelancerLicense",
                              "when": { "kind": "when_truthy", "field": "isFreelancer" } }
                        ]
                    },
                    {
                        "step_id": 3,
                        "name": "bank",
                        "requires": [ { "field": "bankAccount" } ]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    async fn make_navigator(store: Arc<MemoryStore>, subject: &str) -> Navigator {
        Navigator::load(
            store,
            make_test_schema(),
            &NavigatorConfig::default(),
            subject,
        )
        .await
        .unwrap()
    }

    /// Store whose fetches always fail with a network error
    struct DownStore;

    #[async_trait]
    impl RecordStore for DownStore {
        async fn fetch_record(&self, _subject_id: &str) -> Result<SubjectRecord, StoreError> {
            Err(StoreError::network("connection refused"))
        }

        async fn submit_step(
            &self,
            _subject_id: &str,
            _step_id: u32,
            _payload: SubjectRecord,
        ) -> Result<SubjectRecord, StoreError> {
            Err(StoreError::network("connection refused"))
        }

        async fn current_step(&self, _subject_id: &str) -> Result<Option<u32>, StoreError> {
            Ok(None)
        }

        async fn set_current_step(&self, _s: &str, _step: u32) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_load_derives_first_incomplete_step() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_record(
                "cust-1",
                SubjectRecord::from_json(r#"{ "fullName": "Dana" }"#).unwrap(),
            )
            .await;

        let nav = make_navigator(store, "cust-1").await;
        assert_eq!(nav.current_step(), 2);
        assert!(!nav.is_complete());
    }

    #[tokio::test]
    async fn test_load_prefers_persisted_step() {
        let store = Arc::new(MemoryStore::new());
        store.put_record("cust-1", SubjectRecord::new()).await;
        store.set_current_step("cust-1", 3).await.unwrap();

        let nav = make_navigator(store, "cust-1").await;
        assert_eq!(nav.current_step(), 3);
    }

    #[tokio::test]
    async fn test_determine_step_all_complete_returns_one() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_record(
                "cust-1",
                SubjectRecord::from_json(
                    r#"{ "fullName": "Dana", "isFreelancer": true,
                         "freelancerLicense": { "number": "FL-1" },
                         "bankAccount": { "iban": "SA44" } }"#,
                )
                .unwrap(),
            )
            .await;

        let nav = make_navigator(store, "cust-1").await;
        assert!(nav.is_complete());
        assert_eq!(determine_step(nav.status()), 1);
    }

    #[tokio::test]
    async fn test_advance_and_retreat_clamp() {
        let store = Arc::new(MemoryStore::new());
        store.put_record("cust-1", SubjectRecord::new()).await;
        let mut nav = make_navigator(store, "cust-1").await;

        assert_eq!(nav.retreat().await, 1);
        assert_eq!(nav.advance().await, 2);
        assert_eq!(nav.advance().await, 3);
        assert_eq!(nav.advance().await, 3);
    }

    #[tokio::test]
    async fn test_submit_applies_and_auto_advances() {
        let store = Arc::new(MemoryStore::new());
        store.put_record("cust-1", SubjectRecord::new()).await;
        let mut nav = make_navigator(store.clone(), "cust-1").await;
        assert_eq!(nav.current_step(), 1);

        let payload = SubjectRecord::from_json(r#"{ "fullName": "Dana" }"#).unwrap();
        let outcome = nav.submit(1, payload).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Applied { next_step: 2 });
        assert_eq!(nav.current_step(), 2);
        // persisted view-state follows
        assert_eq!(store.current_step("cust-1").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_submit_validation_failure_leaves_state() {
        let store = Arc::new(MemoryStore::new());
        store.put_record("cust-1", SubjectRecord::new()).await;
        let mut nav = make_navigator(store, "cust-1").await;

        let payload = SubjectRecord::from_json(r#"{ "fullName": "" }"#).unwrap();
        let err = nav.submit(1, payload).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { step_id: 1, .. }));
        assert_eq!(nav.current_step(), 1);
        assert!(!nav.status().is_satisfied(1));
    }

    #[tokio::test]
    async fn test_idempotent_reentry_skips_store() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_record(
                "cust-1",
                SubjectRecord::from_json(r#"{ "fullName": "Dana" }"#).unwrap(),
            )
            .await;
        let mut nav = make_navigator(store.clone(), "cust-1").await;
        nav.retreat().await; // back onto the already-satisfied step 1

        let before = store.fetch_record("cust-1").await.unwrap();
        let payload = SubjectRecord::from_json(r#"{ "fullName": "Dana" }"#).unwrap();
        let outcome = nav.submit(1, payload).await.unwrap();

        assert!(matches!(outcome, SubmitOutcome::AlreadySatisfied { .. }));
        // the store record was not touched
        assert_eq!(store.fetch_record("cust-1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_manual_navigation_suppresses_auto_advance() {
        let store = Arc::new(MemoryStore::new());
        store.put_record("cust-1", SubjectRecord::new()).await;
        let mut nav = make_navigator(store, "cust-1").await;

        // user walks ahead to step 3 manually
        nav.advance().await;
        nav.advance().await;
        assert_eq!(nav.current_step(), 3);

        // submitting step 1 satisfies it, but the user navigated away, so
        // the navigator stays put
        let payload = SubjectRecord::from_json(r#"{ "fullName": "Dana" }"#).unwrap();
        nav.submit(1, payload).await.unwrap();
        assert_eq!(nav.current_step(), 3);
        assert!(nav.status().is_satisfied(1));
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_last_step() {
        let store = Arc::new(MemoryStore::new());
        store.put_record("cust-1", SubjectRecord::new()).await;
        let mut nav = make_navigator(store, "cust-1").await;
        nav.advance().await;
        assert_eq!(nav.current_step(), 2);

        // the backend goes down; reload must fail and keep the step
        nav.store = Arc::new(DownStore);
        let err = nav.reload().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(nav.current_step(), 2);
    }

    /// Store whose submissions never resolve
    struct HungStore;

    #[async_trait]
    impl RecordStore for HungStore {
        async fn fetch_record(&self, _subject_id: &str) -> Result<SubjectRecord, StoreError> {
            Ok(SubjectRecord::new())
        }

        async fn submit_step(
            &self,
            _subject_id: &str,
            _step_id: u32,
            _payload: SubjectRecord,
        ) -> Result<SubjectRecord, StoreError> {
            std::future::pending().await
        }

        async fn current_step(&self, _subject_id: &str) -> Result<Option<u32>, StoreError> {
            Ok(None)
        }

        async fn set_current_step(&self, _s: &str, _step: u32) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_single_flight_and_dropped_submission_recovery() {
        let store = Arc::new(MemoryStore::new());
        store.put_record("cust-1", SubjectRecord::new()).await;
        let mut nav = make_navigator(store.clone(), "cust-1").await;

        let payload = SubjectRecord::from_json(r#"{ "fullName": "Dana" }"#).unwrap();

        // a submission future dropped mid-flight leaves its mark behind
        nav.store = Arc::new(HungStore);
        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            nav.submit(1, payload.clone()),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(nav.in_flight.contains_key(&1));

        // a second submission for the same step is rejected, not interleaved
        let err = nav.submit(1, payload.clone()).await.unwrap_err();
        assert!(matches!(err, EngineError::SubmissionInFlight { step_id: 1 }));

        // a successful reload clears the mark and the step is usable again
        nav.store = store;
        nav.reload().await.unwrap();
        assert!(nav.in_flight.is_empty());
        assert!(nav.submit(1, payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_step_rejected() {
        let store = Arc::new(MemoryStore::new());
        store.put_record("cust-1", SubjectRecord::new()).await;
        let mut nav = make_navigator(store, "cust-1").await;

        let err = nav.submit(9, SubjectRecord::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownStep { step_id: 9, .. }));
    }

    #[tokio::test]
    async fn test_invalid_schema_rejected_on_load() {
        let schema = WizardSchema::from_json(
            r#"{ "key": "BAD", "name": "Bad", "steps": [ { "step_id": 5, "name": "x" } ] }"#,
        )
        .unwrap();
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());

        let err = Navigator::load(store, schema, &NavigatorConfig::default(), "cust-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSchema { .. }));
    }
}
