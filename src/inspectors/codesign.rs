//! Code-signing facts via the `codesign` probe.
//!
//! v2 signing yields ordered authority names and a requirements string.
//! Legacy (v1 sealed resources) and unsigned apps get explicit statuses;
//! authority data is never fabricated for them.

use super::Inspector;
use crate::events::EventSink;
use crate::facts::{names, FactStore};
use crate::io::{Io, Runner};
use anyhow::{anyhow, Context, Result};

pub struct CodesignInspector;

impl Inspector for CodesignInspector {
    fn id(&self) -> &'static str {
        "codesign"
    }

    fn ready(&self, facts: &FactStore) -> bool {
        facts.is_set(names::APP_PATH) && !facts.is_set(names::CODESIGN_STATUS)
    }

    fn inspect(&self, facts: &mut FactStore, io: &Io, sink: &mut EventSink) -> Result<()> {
        let app_path = facts
            .text(names::APP_PATH)
            .context("app_path fact vanished")?
            .to_string();

        let display = io
            .runner
            .run("codesign", &["--display", "--verbose=4", &app_path])?;
        // codesign writes its display output to stderr.
        let details = format!("{}\n{}", display.stderr, display.stdout);

        if !display.success() {
            if details.contains("not signed") {
                facts.set(names::CODESIGN_STATUS, "unsigned");
                sink.warning("app is unsigned; the pkg recipe will skip signature verification");
                return Ok(());
            }
            return Err(anyhow!("codesign probe failed: {}", display.stderr.trim()));
        }

        if sealed_resources_version(&details) == Some(1) {
            facts.set(names::CODESIGN_STATUS, "legacy");
            sink.warning("app uses legacy v1 signing; treating it like an unsigned app");
            return Ok(());
        }

        let authorities = authority_names(&details);
        if authorities.is_empty() {
            facts.set(names::CODESIGN_STATUS, "unsigned");
            sink.warning("no signing authorities found; treating app as unsigned");
            return Ok(());
        }

        facts.set(names::CODESIGN_STATUS, "signed");
        if let Some(developer) = developer_from_authority(&authorities[0]) {
            facts.set(names::DEVELOPER, developer);
        }
        facts.set(names::CODESIGN_AUTHORITIES, authorities);

        match requirements(io.runner.as_ref(), &app_path) {
            Ok(Some(reqs)) => facts.set(names::CODESIGN_REQUIREMENTS, reqs),
            Ok(None) => sink.info("codesign reported no designated requirement"),
            Err(err) => sink.warning(format!("requirements probe failed: {err:#}")),
        }
        Ok(())
    }
}

fn sealed_resources_version(details: &str) -> Option<u32> {
    let line = details
        .lines()
        .find(|line| line.trim_start().starts_with("Sealed Resources version="))?;
    let rest = line.split("version=").nth(1)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Ordered as codesign prints them: leaf first.
fn authority_names(details: &str) -> Vec<String> {
    details
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Authority="))
        .map(|name| name.to_string())
        .collect()
}

/// "Developer ID Application: Vendor Name (TEAMID)" → "Vendor Name".
fn developer_from_authority(authority: &str) -> Option<String> {
    let after_colon = authority.split_once(": ").map(|(_, rest)| rest)?;
    let name = match after_colon.rsplit_once(" (") {
        Some((name, team)) if team.ends_with(')') => name,
        _ => after_colon,
    };
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn requirements(runner: &dyn Runner, app_path: &str) -> Result<Option<String>> {
    let output = runner.run("codesign", &["--display", "-r-", app_path])?;
    if !output.success() {
        return Err(anyhow!("codesign -r- failed: {}", output.stderr.trim()));
    }
    let combined = format!("{}\n{}", output.stdout, output.stderr);
    let requirement = combined
        .lines()
        .find_map(|line| line.strip_prefix("designated => "))
        .map(|req| req.trim().to_string());
    Ok(requirement)
}
