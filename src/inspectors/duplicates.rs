//! Catch near-duplicate recipe naming before the operator publishes one.

use super::Inspector;
use crate::events::EventSink;
use crate::facts::{names, FactStore};
use crate::io::Io;
use crate::tool::search_recipes;
use crate::util::filename_safe;
use anyhow::{Context, Result};

pub struct NearDuplicateInspector;

impl Inspector for NearDuplicateInspector {
    fn id(&self) -> &'static str {
        "near_duplicates"
    }

    fn ready(&self, facts: &FactStore) -> bool {
        facts.is_set(names::APP_NAME)
    }

    fn inspect(&self, facts: &mut FactStore, io: &Io, sink: &mut EventSink) -> Result<()> {
        let app_name = facts
            .text(names::APP_NAME)
            .context("app_name fact vanished")?
            .to_string();
        let normalized = filename_safe(&app_name);

        let mut hits = Vec::new();
        for term in [app_name.as_str(), normalized.as_str()] {
            match search_recipes(io.runner.as_ref(), term) {
                Ok(found) => hits.extend(found),
                // The index being unreachable is the guard's concern, not
                // this advisory check's.
                Err(err) => {
                    tracing::debug!(term, error = %err, "duplicate search skipped");
                    return Ok(());
                }
            }
        }
        hits.sort();
        hits.dedup();

        let near: Vec<String> = hits
            .into_iter()
            .filter(|hit| {
                let stem = hit.split('.').next().unwrap_or(hit);
                stem != app_name && stem != normalized
            })
            .collect();
        if !near.is_empty() {
            sink.reminder(format!(
                "similarly named recipes already exist ({}); double-check this is not a duplicate",
                near.join(", ")
            ));
        }
        Ok(())
    }
}
