//! Best-effort description lookup from a third-party software catalog.
//!
//! Purely advisory: any failure is an info line, never a warning, and the
//! pipeline continues without a description.

use super::Inspector;
use crate::events::EventSink;
use crate::facts::{names, FactStore};
use crate::io::{get_text_with_fallback, Io};
use anyhow::{Context, Result};
use serde_json::Value;

const CATALOG_SEARCH: &str = "https://itunes.apple.com/search";

pub struct DescriptionCatalogInspector;

impl Inspector for DescriptionCatalogInspector {
    fn id(&self) -> &'static str {
        "description_catalog"
    }

    fn ready(&self, facts: &FactStore) -> bool {
        facts.is_set(names::APP_NAME) && !facts.is_set(names::DESCRIPTION)
    }

    fn inspect(&self, facts: &mut FactStore, io: &Io, sink: &mut EventSink) -> Result<()> {
        let app_name = facts
            .text(names::APP_NAME)
            .context("app_name fact vanished")?
            .to_string();
        let url = format!(
            "{CATALOG_SEARCH}?term={}&entity=macSoftware&limit=1",
            query_encode(&app_name)
        );

        let description = match lookup(io, &url) {
            Ok(Some(description)) => description,
            Ok(None) => {
                sink.info(format!("catalog has no entry for {app_name}"));
                return Ok(());
            }
            Err(err) => {
                sink.info(format!("catalog lookup failed for {app_name}: {err:#}"));
                return Ok(());
            }
        };

        facts.set(names::DESCRIPTION, first_sentence(&description));
        sink.reminder("description was auto-fetched from a catalog; review it before publishing");
        Ok(())
    }
}

fn lookup(io: &Io, url: &str) -> Result<Option<String>> {
    let (body, _) = get_text_with_fallback(io.fetcher.as_ref(), url)?;
    let value: Value = serde_json::from_str(&body).context("parse catalog JSON")?;
    let description = value
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(|result| result.get("description"))
        .and_then(Value::as_str)
        .map(|description| description.trim().to_string())
        .filter(|description| !description.is_empty());
    Ok(description)
}

fn query_encode(term: &str) -> String {
    term.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_string()
            } else if ch.is_whitespace() {
                "+".to_string()
            } else {
                let mut buf = [0u8; 4];
                ch.encode_utf8(&mut buf)
                    .bytes()
                    .map(|byte| format!("%{byte:02X}"))
                    .collect()
            }
        })
        .collect()
}

/// Catalog blurbs run long; keep the first sentence for the recipe.
fn first_sentence(description: &str) -> String {
    let flattened = description.replace('\n', " ");
    match flattened.find(". ") {
        Some(idx) => flattened[..idx + 1].trim().to_string(),
        None => flattened.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_terms_are_encoded() {
        assert_eq!(query_encode("Tool App"), "Tool+App");
        assert_eq!(query_encode("A&B"), "A%26B");
    }

    #[test]
    fn long_blurbs_are_trimmed_to_one_sentence() {
        let blurb = "Tool edits things. It also does much more.\nReally.";
        assert_eq!(first_sentence(blurb), "Tool edits things.");
        assert_eq!(first_sentence("One liner"), "One liner");
    }
}
