//! The fact store: everything discovered about the input so far.
//!
//! Facts accrue monotonically across inspector passes. Overwrites are
//! allowed only as refinements and bump a revision counter the chain
//! driver uses for fixed-point detection.

use crate::classify::SourceKind;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Fact-name constants. Every inspector and the synthesizer reference
/// facts through these, never through ad-hoc strings.
pub mod names {
    /// Raw identity as given on the command line.
    pub const INPUT: &str = "input";
    /// Source kind assigned by the classifier.
    pub const SOURCE_KIND: &str = "source_kind";
    /// Display name of the application.
    pub const APP_NAME: &str = "app_name";
    /// CFBundleIdentifier.
    pub const BUNDLE_ID: &str = "bundle_id";
    /// Which Info.plist key carries the usable version.
    pub const VERSION_KEY: &str = "version_key";
    pub const VERSION: &str = "version";
    /// Developer or organization name used for output destinations.
    pub const DEVELOPER: &str = "developer";
    pub const DESCRIPTION: &str = "description";
    pub const DOWNLOAD_URL: &str = "download_url";
    /// Local path of the resolved download artifact.
    pub const DOWNLOAD_FILE: &str = "download_file";
    /// dmg / zip / tgz / pkg, guessed then possibly refined.
    pub const DOWNLOAD_FORMAT: &str = "download_format";
    pub const DOWNLOAD_SHA256: &str = "download_sha256";
    /// Alternate user agent that must be persisted into recipe headers.
    pub const USER_AGENT: &str = "user_agent";
    /// Local path of the located .app bundle.
    pub const APP_PATH: &str = "app_path";
    pub const SPARKLE_FEED: &str = "sparkle_feed";
    /// "newest_first" | "oldest_first" | "ambiguous".
    pub const SPARKLE_ORDER: &str = "sparkle_order";
    pub const SPARKLE_PROVIDES_VERSION: &str = "sparkle_provides_version";
    pub const ICON_PATH: &str = "icon_path";
    /// "signed" | "legacy" | "unsigned".
    pub const CODESIGN_STATUS: &str = "codesign_status";
    pub const CODESIGN_AUTHORITIES: &str = "codesign_authorities";
    pub const CODESIGN_REQUIREMENTS: &str = "codesign_requirements";
    pub const IS_APP_STORE: &str = "is_app_store";
    /// Regex needed to select among multiple release asset patterns.
    pub const ASSET_REGEX: &str = "asset_regex";
    pub const GITHUB_REPO: &str = "github_repo";
    pub const SOURCEFORGE_PROJECT: &str = "sourceforge_project";
    pub const BITBUCKET_REPO: &str = "bitbucket_repo";
    /// Set when a bare installer app was found instead of the target.
    pub const INSTALLER_FOUND: &str = "installer_found";
    /// Fatal marker: input is permanently unusable; aborts the chain.
    pub const UNUSABLE: &str = "unusable";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FactValue {
    Text(String),
    Flag(bool),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        FactValue::Text(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        FactValue::Text(value)
    }
}

impl From<bool> for FactValue {
    fn from(value: bool) -> Self {
        FactValue::Flag(value)
    }
}

impl From<Vec<String>> for FactValue {
    fn from(value: Vec<String>) -> Self {
        FactValue::List(value)
    }
}

#[derive(Debug, Default)]
pub struct FactStore {
    facts: BTreeMap<String, FactValue>,
    inspections: BTreeSet<(String, SourceKind)>,
    revision: u64,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absence is a normal, expected state, distinct from inspector error.
    pub fn get(&self, name: &str) -> Option<&FactValue> {
        self.facts.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.facts.get(name) {
            Some(FactValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.facts.get(name), Some(FactValue::Flag(true)))
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.facts.get(name) {
            Some(FactValue::List(value)) => Some(value.as_slice()),
            _ => None,
        }
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.facts.contains_key(name)
    }

    /// Always succeeds. Overwriting with a different value is a refinement
    /// and bumps the revision; setting an equal value changes nothing.
    pub fn set(&mut self, name: &str, value: impl Into<FactValue>) {
        let value = value.into();
        match self.facts.get(name) {
            Some(existing) if *existing == value => {}
            Some(existing) => {
                tracing::debug!(fact = name, ?existing, new = ?value, "fact refined");
                self.facts.insert(name.to_string(), value);
                self.revision += 1;
            }
            None => {
                self.facts.insert(name.to_string(), value);
                self.revision += 1;
            }
        }
    }

    /// Monotonic counter bumped on every new or changed fact.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn has_inspected(&self, inspector_id: &str, kind: SourceKind) -> bool {
        self.inspections
            .contains(&(inspector_id.to_string(), kind))
    }

    /// Marked after invocation regardless of outcome, so each
    /// (inspector, source-kind) pair runs at most once per run.
    pub fn mark_inspected(&mut self, inspector_id: &str, kind: SourceKind) {
        self.inspections.insert((inspector_id.to_string(), kind));
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Flattened snapshot for the `Complete` event.
    pub fn snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        self.facts
            .iter()
            .filter_map(|(name, value)| {
                serde_json::to_value(value)
                    .ok()
                    .map(|json| (name.clone(), json))
            })
            .collect()
    }
}
