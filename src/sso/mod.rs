/// External single-sign-on automation
///
/// Supervises a login performed by the user inside a remote page, detects
/// completion, scrapes the resulting profile and merges it into the local
/// identity store.

mod coordinator;
mod driver;

pub use coordinator::{CancelHandle, ExternalAuthCoordinator};
pub use driver::{login_marker_probe, profile_field_probe, xpath_property_probe, PageDriver};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Profile fields the flow must collect before it can advance
pub const REQUIRED_PROFILE_FIELDS: [&str; 4] = ["name", "email", "phone", "title"];

/// States of the SSO automation flow. `Completed`, `TimedOut` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsoState {
    Idle,
    AwaitingExternalLogin,
    DetectingCompletion,
    ScrapingProfile,
    AwaitingSecretInput,
    Completed,
    TimedOut,
    Cancelled,
}

/// Profile scraped from the external page once all required fields are in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoProfile {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub title: String,
}

/// Accumulates per-field probe results for one run. Finalizes only when
/// the complete required-field set is present; owned by the flow, never
/// shared across callbacks.
#[derive(Debug, Default)]
pub(crate) struct ProfileAccumulator {
    fields: HashMap<&'static str, String>,
}

impl ProfileAccumulator {
    pub fn insert(&mut self, field: &'static str, value: String) {
        self.fields.insert(field, value);
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Required fields still absent, in declaration order
    pub fn missing(&self) -> Vec<String> {
        REQUIRED_PROFILE_FIELDS
            .iter()
            .filter(|f| !self.has(f))
            .map(|f| f.to_string())
            .collect()
    }

    pub fn finalize(&self) -> Option<SsoProfile> {
        Some(SsoProfile {
            name: self.fields.get("name")?.clone(),
            email: self.fields.get("email")?.clone(),
            phone: self.fields.get("phone")?.clone(),
            title: self.fields.get("title")?.clone(),
        })
    }
}

/// Extract the field value from a raw probe result. The page renders the
/// field as a label line followed by the value lines; the label and blank
/// lines are dropped. Empty results mean the field is not present yet.
pub(crate) fn parse_field_probe(field: &str, raw: &str) -> Option<String> {
    let value = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case(field))
        .collect::<Vec<_>>()
        .join(" ");

    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_probe_strips_label() {
        assert_eq!(
            parse_field_probe("name", "\nName\n  John \n Doe \n"),
            Some("John Doe".to_string())
        );
        assert_eq!(
            parse_field_probe("email", "Email\nuser@b.edu"),
            Some("user@b.edu".to_string())
        );
    }

    #[test]
    fn test_parse_field_probe_empty_is_none() {
        assert_eq!(parse_field_probe("phone", ""), None);
        assert_eq!(parse_field_probe("phone", "\nPhone\n \n"), None);
    }

    #[test]
    fn test_accumulator_finalizes_only_when_complete() {
        let mut acc = ProfileAccumulator::default();
        acc.insert("name", "John Doe".to_string());
        acc.insert("email", "a@b.edu".to_string());

        assert!(acc.finalize().is_none());
        assert_eq!(acc.missing(), vec!["phone", "title"]);

        acc.insert("phone", "123".to_string());
        acc.insert("title", "PI".to_string());

        let profile = acc.finalize().unwrap();
        assert_eq!(profile.name, "John Doe");
        assert!(acc.missing().is_empty());
    }
}
