//! Embedded wizard schemas for the built-in flows
//!
//! The registration and store-creation wizards ship with the engine;
//! callers with custom flows construct a [`WizardSchema`] themselves.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::schema::WizardSchema;

/// Cached map of wizard key to parsed schema (built at startup from the
/// embedded definitions)
static SCHEMA_MAP: Lazy<HashMap<String, WizardSchema>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for kind in WizardKind::all() {
        match WizardSchema::from_json(kind.schema_json()) {
            Ok(schema) => {
                map.insert(schema.key.clone(), schema);
            }
            Err(e) => panic!("embedded wizard schema {:?} does not parse: {e}", kind),
        }
    }
    map
});

/// Look up a built-in wizard schema by key (e.g. "REGISTRATION")
pub fn schema_for_key(key: &str) -> Option<&'static WizardSchema> {
    SCHEMA_MAP.get(key)
}

/// Built-in wizard flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardKind {
    /// KYC-style customer onboarding
    Registration,
    /// Storefront branding, template, and contact setup
    StoreCreation,
}

impl WizardKind {
    /// Returns all built-in wizard kinds
    pub fn all() -> &'static [WizardKind] {
        &[WizardKind::Registration, WizardKind::StoreCreation]
    }

    /// Wizard key matching the embedded schema's `key` field
    pub fn key(&self) -> &'static str {
        match self {
            WizardKind::Registration => "REGISTRATION",
            WizardKind::StoreCreation => "STORE",
        }
    }

    /// Raw embedded JSON for this wizard
    pub fn schema_json(&self) -> &'static str {
        match self {
            WizardKind::Registration => include_str!("registration.json"),
            WizardKind::StoreCreation => include_str!("store_creation.json"),
        }
    }

    /// Parsed schema for this wizard
    pub fn schema(&self) -> &'static WizardSchema {
        schema_for_key(self.key()).expect("embedded schema registered at startup")
    }
}
