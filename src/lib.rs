//! Storeflow - conditional completeness and step navigation for
//! multi-step storefront wizards
//!
//! The engine evaluates a partially-filled, branching subject record
//! against declarative step rules, derives a completion state, and drives
//! step navigation idempotently. Transport, persistence, and rendering are
//! external collaborators behind the [`store::RecordStore`] boundary.

pub mod config;
pub mod error;
pub mod evaluator;
pub mod logging;
pub mod navigator;
pub mod record;
pub mod schema;
pub mod store;
pub mod validation;
pub mod visibility;
pub mod wizards;

pub use config::EngineConfig;
pub use error::EngineError;
pub use evaluator::{evaluate, StepStatusMap};
pub use navigator::{determine_step, Navigator, SubmitOutcome};
pub use record::{FieldValue, FileRef, SubjectRecord};
pub use schema::{Condition, Constraint, FieldRule, StepRule, WizardSchema};
pub use store::{MemoryStore, RecordStore, StoreError};
pub use validation::{validate_step, ErrorCode, ValidationReport};
pub use visibility::VisibilityTracker;
pub use wizards::WizardKind;
