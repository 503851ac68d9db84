use anyhow::{Context, Result};
use clap::Parser;
use recipe_forge::cli::Cli;
use recipe_forge::events::{ConsoleReporter, JsonLinesReporter, Reporter};
use recipe_forge::io::Io;
use recipe_forge::pipeline::{run, RunConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let scratch = tempfile::tempdir().context("create scratch directory")?;
    let io = Io::system(scratch.path().to_path_buf());

    let mut reporter: Box<dyn Reporter> = if cli.json {
        Box::new(JsonLinesReporter)
    } else {
        Box::new(ConsoleReporter::new(cli.verbose))
    };

    let config = RunConfig {
        input: cli.input,
        recipe_types: cli.recipe_types,
        output_dir: cli.output,
        ignore_existing: cli.ignore_existing,
        identifier_prefix: cli.identifier_prefix,
        deployment_source: cli.deployment_source,
    };

    // Exit status reflects aborts only; per-type errors such as output
    // collisions are reported through the event stream and the final
    // summary counts.
    run(&config, &io, reporter.as_mut())?;
    Ok(())
}
