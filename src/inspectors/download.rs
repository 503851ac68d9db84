//! Resolve a download URL to a local artifact and pin down its format.

use super::Inspector;
use crate::events::EventSink;
use crate::facts::{names, FactStore};
use crate::io::{download_with_fallback, Io};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

pub struct DownloadInspector;

impl Inspector for DownloadInspector {
    fn id(&self) -> &'static str {
        "download"
    }

    fn ready(&self, facts: &FactStore) -> bool {
        facts.is_set(names::DOWNLOAD_URL) && !facts.is_set(names::DOWNLOAD_FILE)
    }

    fn inspect(&self, facts: &mut FactStore, io: &Io, sink: &mut EventSink) -> Result<()> {
        let url = facts
            .text(names::DOWNLOAD_URL)
            .context("download_url fact vanished")?
            .to_string();

        let file_name = file_name_from_url(&url);
        let dest = io.scratch_path(&file_name);
        sink.info(format!("downloading {url}"));
        let agent_override = download_with_fallback(io.fetcher.as_ref(), &url, &dest)?;
        if let Some(agent) = agent_override {
            sink.info("download required a browser user agent; recording it for the recipe");
            facts.set(names::USER_AGENT, agent);
        }

        facts.set(names::DOWNLOAD_FILE, dest.display().to_string());
        if let Some(format) = guess_format_from_name(&file_name) {
            facts.set(names::DOWNLOAD_FORMAT, format);
        }
        match hash_and_sniff(&dest) {
            Ok((sha256, sniffed)) => {
                // Magic bytes refine (or establish) the extension guess.
                if let Some(format) = sniffed {
                    facts.set(names::DOWNLOAD_FORMAT, format);
                }
                facts.set(names::DOWNLOAD_SHA256, sha256);
            }
            Err(err) => sink.warning(format!("reading downloaded file back failed: {err}")),
        }
        Ok(())
    }
}

fn file_name_from_url(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    let candidate = trimmed.rsplit('/').next().unwrap_or("");
    if candidate.is_empty() {
        "download".to_string()
    } else {
        candidate.to_string()
    }
}

/// One streaming read of the artifact: the head bytes feed the
/// magic-number sniff, the whole stream feeds the checksum. Artifacts can
/// be multi-gigabyte images, so the file is never held in memory.
fn hash_and_sniff(path: &Path) -> Result<(String, Option<&'static str>)> {
    let mut file =
        fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut head = [0u8; 600];
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let sniffed = sniff_format_bytes(&head[..filled]);

    let mut hasher = Sha256::new();
    hasher.update(&head[..filled]);
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("hash {}", path.display()))?;
    Ok((format!("{:x}", hasher.finalize()), sniffed))
}

pub(crate) fn guess_format_from_name(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".dmg") {
        Some("dmg")
    } else if lower.ends_with(".zip") {
        Some("zip")
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Some("tgz")
    } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz") {
        Some("tbz")
    } else if lower.ends_with(".tar") {
        Some("tar")
    } else if lower.ends_with(".pkg") || lower.ends_with(".mpkg") {
        Some("pkg")
    } else {
        None
    }
}

/// Identify archive formats by leading magic bytes. A dmg has no leading
/// magic (its koly trailer sits at the end), so dmg detection stays with
/// the extension guess.
fn sniff_format_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"PK\x03\x04") {
        Some("zip")
    } else if bytes.starts_with(&[0x1f, 0x8b]) {
        Some("tgz")
    } else if bytes.starts_with(b"BZh") {
        Some("tbz")
    } else if bytes.starts_with(b"xar!") {
        Some("pkg")
    } else if bytes.len() > 512 && &bytes[257..262] == b"ustar" {
        Some("tar")
    } else {
        None
    }
}
