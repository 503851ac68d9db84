//! Read-only interface to the downstream recipe tool's index.

use crate::io::Runner;
use crate::util::filename_safe;
use anyhow::Result;

/// Search the recipe index for a term. Returns the matching recipe names,
/// or an error when the tool itself cannot be invoked.
pub fn search_recipes(runner: &dyn Runner, term: &str) -> Result<Vec<String>> {
    let program = recipe_tool_program();
    let output = runner.run(&program, &["search", term])?;
    if !output.success() {
        // The tool reports "nothing found" through a nonzero exit.
        return Ok(Vec::new());
    }
    Ok(parse_search_output(&output.stdout))
}

/// Resolve the tool to a full path when installed; the bare name otherwise
/// so spawn failures surface as "unavailable".
fn recipe_tool_program() -> String {
    crate::io::find_recipe_tool()
        .and_then(|path| path.to_str().map(|p| p.to_string()))
        .unwrap_or_else(|| "autopkg".to_string())
}

fn parse_search_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|token| token.ends_with(".recipe"))
        .map(|token| token.to_string())
        .collect()
}

/// Outcome of the pre-synthesis existing-recipe check.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    Proceed,
    /// Hits found and overriding was not requested.
    AlreadyCovered(Vec<String>),
    /// The recipe tool could not be invoked; treated as no hits.
    Unavailable,
}

/// Query the index for the literal display name and its filename-safe
/// variant. Runs once per invocation, before any synthesis.
pub fn check_existing(runner: &dyn Runner, app_name: &str, ignore_existing: bool) -> GuardDecision {
    let mut terms = vec![app_name.to_string()];
    let normalized = filename_safe(app_name);
    if normalized != app_name {
        terms.push(normalized);
    }

    let mut hits = Vec::new();
    for term in &terms {
        match search_recipes(runner, term) {
            Ok(found) => hits.extend(found),
            Err(err) => {
                tracing::debug!(term, error = %err, "recipe index search failed");
                return GuardDecision::Unavailable;
            }
        }
    }
    hits.sort();
    hits.dedup();

    if hits.is_empty() || ignore_existing {
        GuardDecision::Proceed
    } else {
        GuardDecision::AlreadyCovered(hits)
    }
}
