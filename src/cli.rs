//! CLI argument parsing.
//!
//! The CLI stays thin: it collects the input and the knobs, then hands a
//! `RunConfig` to the pipeline, so the same core logic can be driven from
//! tests without a terminal.

use crate::recipes::RecipeType;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "rforge",
    version,
    about = "Gathers facts about a Mac app and writes recipes for it",
    after_help = "Inputs:\n  a path to an .app bundle, installer, or archive\n  a Sparkle appcast URL\n  a GitHub, BitBucket, or SourceForge project URL\n  a direct download URL\n\nExamples:\n  rforge /Applications/Example.app\n  rforge https://example.com/appcast.xml --recipe-type munki\n  rforge https://github.com/owner/tool --recipe-type jamf --output ~/recipes"
)]
pub struct Cli {
    /// App bundle path, archive path, or URL to inspect
    pub input: String,

    /// Recipe type to build; repeatable, prerequisites are added automatically
    #[arg(long = "recipe-type", value_enum, default_values_t = vec![RecipeType::Download])]
    pub recipe_types: Vec<RecipeType>,

    /// Directory recipes and icons are written under
    #[arg(long, value_name = "DIR", default_value = "recipes")]
    pub output: PathBuf,

    /// Build even when the recipe index already covers this app
    #[arg(long)]
    pub ignore_existing: bool,

    /// Reverse-DNS prefix for generated recipe identifiers
    #[arg(long, value_name = "PREFIX", default_value = "local")]
    pub identifier_prefix: String,

    /// Package source URL or path for deployment recipes (required for jamf)
    #[arg(long, value_name = "SRC")]
    pub deployment_source: Option<String>,

    /// Show info-level progress lines
    #[arg(long)]
    pub verbose: bool,

    /// Emit one JSON object per event instead of text lines
    #[arg(long)]
    pub json: bool,
}
