//! Field dependency validator: interprets per-step validation schemas with
//! cross-field conditional overrides

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::record::{FieldValue, SubjectRecord};
use crate::schema::{Constraint, FieldRule, WizardSchema};

/// Machine-readable validation error codes. Translation and presentation
/// are an external concern; the engine never emits user-facing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Required,
    InvalidFormat,
    NotAllowed,
    TooShort,
    TooLong,
    FileTooLarge,
    UnsupportedFileType,
    DateNotAfter,
    DateExpired,
    AgeOutOfRange,
    InvalidDate,
    WrongType,
}

/// Per-field validation errors for one step submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationReport {
    errors: BTreeMap<String, Vec<ErrorCode>>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error codes recorded for a field, in constraint order
    pub fn field_errors(&self, field: &str) -> &[ErrorCode] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<ErrorCode>)> {
        self.errors.iter()
    }

    fn push(&mut self, field: &str, code: ErrorCode) {
        self.errors.entry(field.to_string()).or_default().push(code);
    }
}

/// Validate a step submission against the wizard schema.
///
/// Every field of the step is evaluated before returning; one failing field
/// never blocks the others. An unknown step id yields an empty report (the
/// navigator rejects unknown steps before validation).
pub fn validate_step(schema: &WizardSchema, step_id: u32, values: &SubjectRecord) -> ValidationReport {
    validate_step_on(schema, step_id, values, Utc::now().date_naive())
}

/// Same as [`validate_step`] with an explicit "today", so date and age
/// boundaries can be pinned in tests
pub fn validate_step_on(
    schema: &WizardSchema,
    step_id: u32,
    values: &SubjectRecord,
    today: NaiveDate,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    let Some(step) = schema.get_step(step_id) else {
        return report;
    };

    for rule in &step.fields {
        validate_field(rule, values, today, &mut report);
    }

    report
}

/// Pick the effective constraints for a field: the first `when` clause whose
/// condition matches replaces the base constraints outright (no merging)
fn effective_constraints<'a>(rule: &'a FieldRule, values: &SubjectRecord) -> &'a [Constraint] {
    for clause in &rule.when {
        if clause.condition.matches(values) {
            return &clause.constraints;
        }
    }
    &rule.constraints
}

fn validate_field(
    rule: &FieldRule,
    values: &SubjectRecord,
    today: NaiveDate,
    report: &mut ValidationReport,
) {
    let constraints = effective_constraints(rule, values);

    let Some(value) = values.get(&rule.field).filter(|v| !v.is_empty()) else {
        // An empty field can only fail `required`; the remaining
        // constraints apply to present values
        if constraints.contains(&Constraint::Required) {
            report.push(&rule.field, ErrorCode::Required);
        }
        return;
    };

    for constraint in constraints {
        match constraint {
            Constraint::Required => {}
            Constraint::Pattern { regex } => check_pattern(&rule.field, value, regex, report),
            Constraint::OneOf { values: allowed } => {
                if !allowed.contains(value) {
                    report.push(&rule.field, ErrorCode::NotAllowed);
                }
            }
            Constraint::MinLength { min } => match value.as_text() {
                Some(text) if text.chars().count() < *min => {
                    report.push(&rule.field, ErrorCode::TooShort);
                }
                Some(_) => {}
                None => report.push(&rule.field, ErrorCode::WrongType),
            },
            Constraint::MaxLength { max } => match value.as_text() {
                Some(text) if text.chars().count() > *max => {
                    report.push(&rule.field, ErrorCode::TooLong);
                }
                Some(_) => {}
                None => report.push(&rule.field, ErrorCode::WrongType),
            },
            Constraint::FileMaxSize { bytes } => match value.as_file() {
                Some(file) if file.size_bytes > *bytes => {
                    report.push(&rule.field, ErrorCode::FileTooLarge);
                }
                Some(_) => {}
                None => report.push(&rule.field, ErrorCode::WrongType),
            },
            Constraint::FileMimeIn { mimes } => match value.as_file() {
                Some(file) if !mimes.iter().any(|m| m.eq_ignore_ascii_case(&file.mime_type)) => {
                    report.push(&rule.field, ErrorCode::UnsupportedFileType);
                }
                Some(_) => {}
                None => report.push(&rule.field, ErrorCode::WrongType),
            },
            Constraint::DateAfter { field: other } => {
                check_date_after(&rule.field, value, values.get(other), report);
            }
            Constraint::DateInFuture => match parse_date(value) {
                Ok(date) => {
                    // inclusive boundary: a date equal to today counts as expired
                    if date <= today {
                        report.push(&rule.field, ErrorCode::DateExpired);
                    }
                }
                Err(code) => report.push(&rule.field, code),
            },
            Constraint::AgeBetween {
                min_years,
                max_years,
            } => match parse_date(value) {
                Ok(birth) => {
                    let age = age_on(birth, today);
                    if age < 0 || (age as u32) < *min_years || (age as u32) > *max_years {
                        report.push(&rule.field, ErrorCode::AgeOutOfRange);
                    }
                }
                Err(code) => report.push(&rule.field, code),
            },
        }
    }
}

fn check_pattern(field: &str, value: &FieldValue, pattern: &str, report: &mut ValidationReport) {
    let Some(text) = value.as_text() else {
        report.push(field, ErrorCode::WrongType);
        return;
    };
    match Regex::new(pattern) {
        Ok(re) => {
            if !re.is_match(text) {
                report.push(field, ErrorCode::InvalidFormat);
            }
        }
        Err(e) => {
            // Schema bug, not a user error; caught by WizardSchema::validate
            warn!("Skipping uncompilable pattern for field {field}: {e}");
        }
    }
}

fn check_date_after(
    field: &str,
    value: &FieldValue,
    other: Option<&FieldValue>,
    report: &mut ValidationReport,
) {
    let date = match parse_date(value) {
        Ok(d) => d,
        Err(code) => {
            report.push(field, code);
            return;
        }
    };
    // If the reference field is absent or unparseable there is nothing to
    // compare against; that field carries its own rules
    if let Some(Ok(other_date)) = other.map(parse_date) {
        if date <= other_date {
            report.push(field, ErrorCode::DateNotAfter);
        }
    }
}

/// Parse a date field in the wizard's YYYY-MM-DD format
fn parse_date(value: &FieldValue) -> Result<NaiveDate, ErrorCode> {
    let text = value.as_text().ok_or(ErrorCode::WrongType)?;
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| ErrorCode::InvalidDate)
}

/// Calendar-exact age: the year difference, minus one if the birth
/// month/day has not yet occurred this year
fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years
}
