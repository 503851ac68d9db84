//! Input classification: assign a source kind to the raw input string.
//!
//! Ordered tests, first match wins. Classification is total over parseable
//! inputs; only a path that neither exists on disk nor parses as an
//! http(s) URL is fatal.

use crate::events::EventSink;
use crate::facts::{names, FactStore};
use crate::io::Io;
use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LocalApp,
    LocalArchive,
    LocalInstaller,
    GitHubRepo,
    BitBucketRepo,
    SourceForgeProject,
    SparkleFeed,
    DirectDownload,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::LocalApp => "local_app",
            SourceKind::LocalArchive => "local_archive",
            SourceKind::LocalInstaller => "local_installer",
            SourceKind::GitHubRepo => "github_repo",
            SourceKind::BitBucketRepo => "bitbucket_repo",
            SourceKind::SourceForgeProject => "sourceforge_project",
            SourceKind::SparkleFeed => "sparkle_feed",
            SourceKind::DirectDownload => "direct_download",
        }
    }
}

const ARCHIVE_EXTENSIONS: &[&str] = &["dmg", "zip", "tgz", "tbz", "gz", "bz2", "tar", "xz"];

/// Classify the input and seed the fact store with the source kind and the
/// kind-specific identity facts.
pub fn classify_input(
    input: &str,
    io: &Io,
    facts: &mut FactStore,
    sink: &mut EventSink,
) -> Result<SourceKind> {
    let kind = classify(input, io, sink)?;
    facts.set(names::INPUT, input);
    facts.set(names::SOURCE_KIND, kind.as_str());
    seed_identity(input, kind, facts);
    sink.info(format!("input classified as {}", kind.as_str()));
    Ok(kind)
}

fn classify(input: &str, io: &Io, sink: &mut EventSink) -> Result<SourceKind> {
    let path = Path::new(input);
    if path.exists() {
        return classify_local(path);
    }

    if !input.starts_with("http://") && !input.starts_with("https://") {
        return Err(anyhow!(
            "input is neither an existing path nor an http(s) URL: {input}"
        ));
    }

    if let Some(kind) = classify_hosting_url(input) {
        return Ok(kind);
    }

    if looks_like_feed(input, io, sink) {
        return Ok(SourceKind::SparkleFeed);
    }

    // Catch-all: any other URL is treated as a direct download.
    Ok(SourceKind::DirectDownload)
}

fn classify_local(path: &Path) -> Result<SourceKind> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("app") if path.is_dir() => Ok(SourceKind::LocalApp),
        Some("pkg") | Some("mpkg") => Ok(SourceKind::LocalInstaller),
        Some(ext) if ARCHIVE_EXTENSIONS.contains(&ext) => Ok(SourceKind::LocalArchive),
        _ => Err(anyhow!(
            "existing path is neither an app bundle, an archive, nor an installer: {}",
            path.display()
        )),
    }
}

fn classify_hosting_url(input: &str) -> Option<SourceKind> {
    let github = Regex::new(r"^https?://(?:www\.)?github\.com/[^/]+/[^/?#]+").ok()?;
    if github.is_match(input) {
        return Some(SourceKind::GitHubRepo);
    }
    let bitbucket = Regex::new(r"^https?://(?:www\.)?bitbucket\.org/[^/]+/[^/?#]+").ok()?;
    if bitbucket.is_match(input) {
        return Some(SourceKind::BitBucketRepo);
    }
    let sourceforge = Regex::new(r"^https?://(?:www\.)?sourceforge\.net/projects/[^/?#]+").ok()?;
    if sourceforge.is_match(input) {
        return Some(SourceKind::SourceForgeProject);
    }
    None
}

/// Content-type sniff for appcast feeds. A failed HEAD or GET is not an
/// error here; the URL simply falls through to the direct-download case.
fn looks_like_feed(url: &str, io: &Io, sink: &mut EventSink) -> bool {
    let content_type = match io.fetcher.head_content_type(url) {
        Ok(Some(content_type)) => content_type,
        Ok(None) => String::new(),
        Err(err) => {
            sink.info(format!("content-type sniff failed for {url}: {err:#}"));
            String::new()
        }
    };

    let xml_ish = content_type.contains("xml") || content_type.contains("rss");
    let path_ish = url.ends_with(".xml") || url.ends_with(".rss") || url.contains("appcast");
    if !xml_ish && !path_ish {
        return false;
    }

    match crate::io::get_text_with_fallback(io.fetcher.as_ref(), url) {
        Ok((body, _)) => {
            let head: String = body.chars().take(4096).collect();
            head.contains("<rss") || head.contains("sparkle") || head.contains("<feed")
        }
        Err(err) => {
            sink.info(format!("feed confirmation fetch failed for {url}: {err:#}"));
            false
        }
    }
}

fn seed_identity(input: &str, kind: SourceKind, facts: &mut FactStore) {
    match kind {
        SourceKind::LocalApp => facts.set(names::APP_PATH, input),
        SourceKind::LocalArchive | SourceKind::LocalInstaller => {
            facts.set(names::DOWNLOAD_FILE, input);
        }
        SourceKind::GitHubRepo => {
            if let Some(repo) = hosting_slug(input, "github.com/") {
                facts.set(names::GITHUB_REPO, repo);
            }
        }
        SourceKind::BitBucketRepo => {
            if let Some(repo) = hosting_slug(input, "bitbucket.org/") {
                facts.set(names::BITBUCKET_REPO, repo);
            }
        }
        SourceKind::SourceForgeProject => {
            if let Some(project) = hosting_slug(input, "sourceforge.net/projects/") {
                let name = project.split('/').next().unwrap_or(&project).to_string();
                facts.set(names::SOURCEFORGE_PROJECT, name);
            }
        }
        SourceKind::SparkleFeed => facts.set(names::SPARKLE_FEED, input),
        SourceKind::DirectDownload => facts.set(names::DOWNLOAD_URL, input),
    }
}

/// Extract "owner/name" (or project path) following a hosting domain.
fn hosting_slug(url: &str, domain_marker: &str) -> Option<String> {
    let start = url.find(domain_marker)? + domain_marker.len();
    let rest = &url[start..];
    let trimmed = rest
        .split(['?', '#'])
        .next()
        .unwrap_or(rest)
        .trim_end_matches('/');
    let mut parts = trimmed.split('/');
    let owner = parts.next()?;
    if owner.is_empty() {
        return None;
    }
    match parts.next() {
        Some(name) if !name.is_empty() => {
            Some(format!("{owner}/{}", name.trim_end_matches(".git")))
        }
        _ => Some(owner.to_string()),
    }
}
