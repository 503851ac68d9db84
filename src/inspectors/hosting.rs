//! Source-hosting project lookups: GitHub in full, BitBucket and
//! SourceForge best-effort.

use super::Inspector;
use crate::classify::SourceKind;
use crate::events::EventSink;
use crate::facts::{names, FactStore};
use crate::io::{get_text_with_fallback, Io};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;

/// Preference order when a release exposes several usable assets.
const ASSET_EXTENSIONS: &[&str] = &[".dmg", ".zip", ".tar.gz", ".tgz", ".pkg"];

pub struct SourceHostingInspector;

impl Inspector for SourceHostingInspector {
    fn id(&self) -> &'static str {
        "source_hosting"
    }

    fn source_kinds(&self) -> &'static [SourceKind] {
        &[
            SourceKind::GitHubRepo,
            SourceKind::BitBucketRepo,
            SourceKind::SourceForgeProject,
        ]
    }

    fn ready(&self, facts: &FactStore) -> bool {
        let has_project = facts.is_set(names::GITHUB_REPO)
            || facts.is_set(names::BITBUCKET_REPO)
            || facts.is_set(names::SOURCEFORGE_PROJECT);
        has_project && (!facts.is_set(names::DOWNLOAD_URL) || !facts.is_set(names::DESCRIPTION))
    }

    fn inspect(&self, facts: &mut FactStore, io: &Io, sink: &mut EventSink) -> Result<()> {
        if let Some(repo) = facts.text(names::GITHUB_REPO).map(|r| r.to_string()) {
            inspect_github(&repo, facts, io, sink)
        } else if let Some(repo) = facts.text(names::BITBUCKET_REPO).map(|r| r.to_string()) {
            inspect_bitbucket(&repo, facts, io, sink)
        } else if let Some(project) = facts
            .text(names::SOURCEFORGE_PROJECT)
            .map(|p| p.to_string())
        {
            inspect_sourceforge(&project, facts, io, sink)
        } else {
            Err(anyhow!("no hosting project fact present"))
        }
    }
}

fn get_json(io: &Io, url: &str) -> Result<Value> {
    let (body, _) = get_text_with_fallback(io.fetcher.as_ref(), url)?;
    serde_json::from_str(&body).with_context(|| format!("parse JSON from {url}"))
}

fn inspect_github(repo: &str, facts: &mut FactStore, io: &Io, sink: &mut EventSink) -> Result<()> {
    let meta = get_json(io, &format!("https://api.github.com/repos/{repo}"))?;
    if let Some(description) = meta.get("description").and_then(Value::as_str) {
        if !description.is_empty() && !facts.is_set(names::DESCRIPTION) {
            facts.set(names::DESCRIPTION, description);
        }
    }
    if !facts.is_set(names::APP_NAME) {
        if let Some(name) = meta.get("name").and_then(Value::as_str) {
            facts.set(names::APP_NAME, name);
        }
    }
    if !facts.is_set(names::DEVELOPER) {
        if let Some(owner) = meta
            .get("owner")
            .and_then(|owner| owner.get("login"))
            .and_then(Value::as_str)
        {
            facts.set(names::DEVELOPER, owner);
        }
    }

    let release = match get_json(
        io,
        &format!("https://api.github.com/repos/{repo}/releases/latest"),
    ) {
        Ok(release) => release,
        Err(err) => {
            sink.warning(format!("no usable release metadata for {repo}: {err:#}"));
            return Ok(());
        }
    };

    let asset_names: Vec<String> = release
        .get("assets")
        .and_then(Value::as_array)
        .map(|assets| {
            assets
                .iter()
                .filter_map(|asset| asset.get("name").and_then(Value::as_str))
                .map(|name| name.to_string())
                .collect()
        })
        .unwrap_or_default();

    let chosen = choose_asset(&asset_names)
        .ok_or_else(|| anyhow!("latest release of {repo} has no recognizable asset"))?;
    let url = release
        .get("assets")
        .and_then(Value::as_array)
        .and_then(|assets| {
            assets.iter().find(|asset| {
                asset.get("name").and_then(Value::as_str) == Some(chosen.as_str())
            })
        })
        .and_then(|asset| asset.get("browser_download_url"))
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("asset {chosen} has no download URL"))?;
    facts.set(names::DOWNLOAD_URL, url);

    if distinct_patterns(&asset_names) > 1 {
        let pattern = asset_pattern_regex(&chosen);
        sink.reminder(format!(
            "release exposes several asset naming patterns; the recipe selects assets matching `{pattern}`"
        ));
        facts.set(names::ASSET_REGEX, pattern);
    }

    if !facts.is_set(names::VERSION) {
        if let Some(tag) = release.get("tag_name").and_then(Value::as_str) {
            facts.set(names::VERSION, tag.trim_start_matches('v'));
        }
    }
    Ok(())
}

fn inspect_bitbucket(
    repo: &str,
    facts: &mut FactStore,
    io: &Io,
    sink: &mut EventSink,
) -> Result<()> {
    let meta = get_json(io, &format!("https://api.bitbucket.org/2.0/repositories/{repo}"))?;
    if let Some(description) = meta.get("description").and_then(Value::as_str) {
        if !description.trim().is_empty() && !facts.is_set(names::DESCRIPTION) {
            facts.set(names::DESCRIPTION, description.trim());
        }
    }
    if !facts.is_set(names::APP_NAME) {
        if let Some(name) = meta.get("name").and_then(Value::as_str) {
            facts.set(names::APP_NAME, name);
        }
    }

    let downloads = get_json(
        io,
        &format!("https://api.bitbucket.org/2.0/repositories/{repo}/downloads"),
    )?;
    let url = downloads
        .get("values")
        .and_then(Value::as_array)
        .and_then(|values| values.first())
        .and_then(|value| value.get("links"))
        .and_then(|links| links.get("self"))
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str);
    match url {
        Some(url) => facts.set(names::DOWNLOAD_URL, url),
        None => sink.warning(format!("{repo} exposes no downloads")),
    }
    Ok(())
}

fn inspect_sourceforge(
    project: &str,
    facts: &mut FactStore,
    io: &Io,
    sink: &mut EventSink,
) -> Result<()> {
    match get_json(io, &format!("https://sourceforge.net/rest/p/{project}")) {
        Ok(meta) => {
            if let Some(summary) = meta.get("short_description").and_then(Value::as_str) {
                if !summary.trim().is_empty() && !facts.is_set(names::DESCRIPTION) {
                    facts.set(names::DESCRIPTION, summary.trim());
                }
            }
            if !facts.is_set(names::APP_NAME) {
                if let Some(name) = meta.get("name").and_then(Value::as_str) {
                    facts.set(names::APP_NAME, name);
                }
            }
        }
        Err(err) => sink.warning(format!("project metadata lookup failed: {err:#}")),
    }

    let best = get_json(
        io,
        &format!("https://sourceforge.net/projects/{project}/best_release.json"),
    )?;
    let url = best
        .get("release")
        .and_then(|release| release.get("url"))
        .and_then(Value::as_str);
    match url {
        Some(url) => facts.set(names::DOWNLOAD_URL, url),
        None => sink.warning(format!("{project} has no best-release download")),
    }
    Ok(())
}

fn choose_asset(names: &[String]) -> Option<String> {
    for extension in ASSET_EXTENSIONS {
        if let Some(name) = names
            .iter()
            .find(|name| name.to_ascii_lowercase().ends_with(extension))
        {
            return Some(name.clone());
        }
    }
    None
}

/// Count naming shapes after collapsing version digits, so
/// "Tool-1.2.dmg" and "Tool-1.3.dmg" are one pattern but
/// "Tool-arm64.dmg" is another.
fn distinct_patterns(names: &[String]) -> usize {
    let mut shapes: Vec<String> = names.iter().map(|name| collapse_digits(name)).collect();
    shapes.sort();
    shapes.dedup();
    shapes.len()
}

fn collapse_digits(name: &str) -> String {
    let mut out = String::new();
    let mut in_run = false;
    let mut chars = name.chars().peekable();
    while let Some(ch) = chars.next() {
        if version_run_char(ch, in_run, chars.peek()) {
            if !in_run {
                out.push('#');
                in_run = true;
            }
        } else {
            in_run = false;
            out.push(ch);
        }
    }
    out
}

/// A dot continues a version run only when digits follow, so the final
/// extension dot stays literal.
fn version_run_char(ch: char, in_run: bool, next: Option<&char>) -> bool {
    ch.is_ascii_digit()
        || (in_run && ch == '.' && next.map(|c| c.is_ascii_digit()).unwrap_or(false))
}

/// Regex matching the chosen asset across versions: digit-and-dot runs
/// become a numeric wildcard, everything else is escaped literally.
fn asset_pattern_regex(name: &str) -> String {
    let mut out = String::new();
    let mut literal = String::new();
    let mut in_run = false;
    let mut chars = name.chars().peekable();
    while let Some(ch) = chars.next() {
        if version_run_char(ch, in_run, chars.peek()) {
            if !in_run {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str("[0-9.]+");
                in_run = true;
            }
        } else {
            in_run = false;
            literal.push(ch);
        }
    }
    out.push_str(&regex::escape(&literal));
    out
}
