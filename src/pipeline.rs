//! End-to-end orchestration: classify, inspect to a fixed point, guard
//! against existing recipes, resolve the build plan, synthesize.

use crate::classify::classify_input;
use crate::events::{EventSink, Reporter, RunSummary};
use crate::facts::{names, FactStore};
use crate::inspectors::run_chain;
use crate::io::Io;
use crate::recipes::{resolve_build_plan, RecipeType};
use crate::synth::{synthesize, SynthesisConfig};
use crate::tool::{check_existing, GuardDecision};
use anyhow::{anyhow, Result};
use std::path::PathBuf;

pub struct RunConfig {
    pub input: String,
    pub recipe_types: Vec<RecipeType>,
    pub output_dir: PathBuf,
    pub ignore_existing: bool,
    pub identifier_prefix: String,
    pub deployment_source: Option<String>,
}

/// Run the whole pipeline for one input. A returned error is a fatal
/// abort and is mirrored as an error event, so listeners that only watch
/// the event channel still see why the run died; everything recoverable
/// has already been reported as a warning or error event along the way.
pub fn run(config: &RunConfig, io: &Io, reporter: &mut dyn Reporter) -> Result<RunSummary> {
    let mut sink = EventSink::new(reporter);
    match run_stages(config, io, &mut sink) {
        Ok(summary) => Ok(summary),
        Err(err) => {
            sink.error(format!("run aborted: {err:#}"));
            Err(err)
        }
    }
}

fn run_stages(config: &RunConfig, io: &Io, sink: &mut EventSink) -> Result<RunSummary> {
    let mut facts = FactStore::new();

    let kind = classify_input(&config.input, io, &mut facts, sink)?;
    run_chain(&mut facts, kind, io, sink)?;

    let app_name = facts
        .text(names::APP_NAME)
        .ok_or_else(|| anyhow!("inspection finished without resolving an app name"))?
        .to_string();

    match check_existing(io.runner.as_ref(), &app_name, config.ignore_existing) {
        GuardDecision::Proceed => {}
        GuardDecision::AlreadyCovered(hits) => {
            sink.info(format!(
                "existing recipes already cover {app_name}: {}",
                hits.join(", ")
            ));
            sink.reminder(
                "recipes for this app already exist; rerun with --ignore-existing to build anyway",
            );
            return Ok(sink.complete(facts.snapshot()));
        }
        GuardDecision::Unavailable => {
            sink.warning("recipe index tool unavailable; skipping the existing-recipe check");
        }
    }

    let plan = resolve_build_plan(&config.recipe_types);
    sink.info(format!(
        "build plan: {}",
        plan.iter()
            .map(RecipeType::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    ));

    let synth_config = SynthesisConfig {
        output_dir: &config.output_dir,
        identifier_prefix: &config.identifier_prefix,
        deployment_source: config.deployment_source.as_deref(),
    };
    synthesize(&plan, &facts, &synth_config, io, sink)?;

    Ok(sink.complete(facts.snapshot()))
}
