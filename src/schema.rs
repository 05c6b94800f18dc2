//! Schema definitions for wizard step rules and field validation

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::record::{FieldValue, SubjectRecord};

/// Declarative schema for one multi-step wizard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardSchema {
    /// Unique wizard key (e.g. REGISTRATION, STORE)
    pub key: String,
    /// Display name of the wizard
    pub name: String,
    /// Brief description of what this wizard collects
    #[serde(default)]
    pub description: String,
    /// Ordered lifecycle steps; step ids are 1..=N
    pub steps: Vec<StepRule>,
}

/// Rule definition for a single step: the fields it requires for
/// completeness and the validation rules applied on submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRule {
    /// Step number, 1-based and contiguous
    pub step_id: u32,
    /// Step identifier (lowercase)
    pub name: String,
    /// Human-readable step name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Fields that must be non-empty for this step to count as complete
    #[serde(default)]
    pub requires: Vec<FieldRequirement>,
    /// Validation rules for fields submitted in this step
    #[serde(default)]
    pub fields: Vec<FieldRule>,
}

/// One required field, possibly gated on a branch condition that may
/// reference fields owned by other steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRequirement {
    /// Field name or dotted path (e.g. "bankAccount.iban")
    pub field: String,
    /// Condition under which this field is required
    #[serde(default)]
    pub when: Condition,
}

/// Branch condition evaluated against the whole record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Unconditionally active
    #[default]
    Always,
    /// Active when the referenced flag is `true`
    WhenTruthy { field: String },
    /// Active when the referenced flag is absent, `false`, or not a boolean
    WhenFalsy { field: String },
    /// Active when the referenced field equals the given value
    /// (an absent field compares as null)
    WhenEquals { field: String, value: FieldValue },
    /// Active when the referenced field differs from the given value
    WhenNotEquals { field: String, value: FieldValue },
}

impl Condition {
    /// Evaluate this condition against a record
    pub fn matches(&self, record: &SubjectRecord) -> bool {
        match self {
            Condition::Always => true,
            Condition::WhenTruthy { field } => record.bool_flag(field) == Some(true),
            Condition::WhenFalsy { field } => record.bool_flag(field) != Some(true),
            Condition::WhenEquals { field, value } => {
                record.get(field).unwrap_or(&FieldValue::Null) == value
            }
            Condition::WhenNotEquals { field, value } => {
                record.get(field).unwrap_or(&FieldValue::Null) != value
            }
        }
    }

    /// Name of the field this condition reads, if any
    fn referenced_field(&self) -> Option<&str> {
        match self {
            Condition::Always => None,
            Condition::WhenTruthy { field }
            | Condition::WhenFalsy { field }
            | Condition::WhenEquals { field, .. }
            | Condition::WhenNotEquals { field, .. } => Some(field),
        }
    }
}

/// Validation rules for a single field: base constraints plus conditional
/// overrides keyed on sibling field values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    /// Field name or dotted path within the step payload
    pub field: String,
    /// Constraints applied when no `when` clause matches
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Conditional overrides, evaluated in declaration order; the first
    /// matching clause replaces the base constraints entirely
    #[serde(default)]
    pub when: Vec<WhenClause>,
}

/// A conditional constraint override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhenClause {
    pub condition: Condition,
    pub constraints: Vec<Constraint>,
}

/// Standard validation rule vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// Field must hold a non-empty value
    Required,
    /// Text must match the given regex
    Pattern { regex: String },
    /// Value must be one of the given values
    OneOf { values: Vec<FieldValue> },
    /// Minimum text length
    MinLength { min: usize },
    /// Maximum text length
    MaxLength { max: usize },
    /// Maximum file size in bytes
    FileMaxSize { bytes: u64 },
    /// Allowed file MIME types
    FileMimeIn { mimes: Vec<String> },
    /// Date must be strictly after another date field of the same record
    DateAfter { field: String },
    /// Date must be strictly after today (a date equal to today is expired)
    DateInFuture,
    /// Birth date must yield a calendar-exact age within the range
    AgeBetween { min_years: u32, max_years: u32 },
}

impl WizardSchema {
    /// Parse a wizard schema from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validate the schema for consistency
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.steps.is_empty() {
            errors.push(format!("Wizard '{}' has no steps", self.key));
        }

        // Step ids must be 1..=N in declaration order
        for (idx, step) in self.steps.iter().enumerate() {
            let expected = (idx + 1) as u32;
            if step.step_id != expected {
                errors.push(format!(
                    "Step '{}' has id {} but position {} (ids must be contiguous from 1)",
                    step.name, step.step_id, expected
                ));
            }

            for req in &step.requires {
                if req.field.is_empty() {
                    errors.push(format!("Step '{}' requires an unnamed field", step.name));
                }
            }

            for rule in &step.fields {
                Self::check_constraints(&mut errors, &step.name, &rule.field, &rule.constraints);
                for clause in &rule.when {
                    if clause.condition == Condition::Always {
                        errors.push(format!(
                            "Field '{}' in step '{}' has an unconditional 'when' clause",
                            rule.field, step.name
                        ));
                    }
                    Self::check_constraints(&mut errors, &step.name, &rule.field, &clause.constraints);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check_constraints(
        errors: &mut Vec<String>,
        step_name: &str,
        field: &str,
        constraints: &[Constraint],
    ) {
        for constraint in constraints {
            match constraint {
                Constraint::Pattern { regex } => {
                    if let Err(e) = Regex::new(regex) {
                        errors.push(format!(
                            "Field '{field}' in step '{step_name}' has an invalid pattern: {e}"
                        ));
                    }
                }
                Constraint::OneOf { values } if values.is_empty() => {
                    errors.push(format!(
                        "Field '{field}' in step '{step_name}' has a one_of with no values"
                    ));
                }
                Constraint::AgeBetween {
                    min_years,
                    max_years,
                } if min_years > max_years => {
                    errors.push(format!(
                        "Field '{field}' in step '{step_name}' has an inverted age range"
                    ));
                }
                _ => {}
            }
        }
    }

    /// Get a step rule by id
    pub fn get_step(&self, step_id: u32) -> Option<&StepRule> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Get a step rule by name
    pub fn get_step_by_name(&self, name: &str) -> Option<&StepRule> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Number of steps
    pub fn total_steps(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Names of fields read by branch conditions anywhere in the schema
    pub fn branch_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .steps
            .iter()
            .flat_map(|s| {
                s.requires
                    .iter()
                    .filter_map(|r| r.when.referenced_field())
                    .chain(s.fields.iter().flat_map(|f| {
                        f.when.iter().filter_map(|w| w.condition.referenced_field())
                    }))
            })
            .collect();
        fields.sort_unstable();
        fields.dedup();
        fields
    }
}

impl StepRule {
    /// Get the display name, falling back to name if not set
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Required fields whose branch conditions are active for this record
    pub fn active_requirements<'a>(&'a self, record: &SubjectRecord) -> Vec<&'a str> {
        self.requires
            .iter()
            .filter(|req| req.when.matches(record))
            .map(|req| req.field.as_str())
            .collect()
    }
}
