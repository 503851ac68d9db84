//! I/O collaborators used by inspectors.
//!
//! Network fetches and subprocess probes sit behind small traits so every
//! inspector can be exercised against scripted doubles without touching
//! the network or the host toolchain.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Agent string sent on first attempts.
pub const DEFAULT_USER_AGENT: &str = "recipe-forge/0.1";

/// Browser-shaped agent used for the single retry after a refused fetch.
/// When the retry succeeds, the agent must be persisted into the generated
/// recipe's request headers.
pub const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko)";

pub trait Fetcher {
    fn get_text(&self, url: &str, user_agent: &str) -> Result<String>;
    fn head_content_type(&self, url: &str) -> Result<Option<String>>;
    fn download(&self, url: &str, dest: &Path, user_agent: &str) -> Result<()>;
}

/// Blocking HTTP via ureq.
pub struct UreqFetcher;

impl Fetcher for UreqFetcher {
    fn get_text(&self, url: &str, user_agent: &str) -> Result<String> {
        let mut response = ureq::get(url)
            .header("User-Agent", user_agent)
            .call()
            .with_context(|| format!("GET {url}"))?;
        let body = response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("read body of {url}"))?;
        Ok(body)
    }

    fn head_content_type(&self, url: &str) -> Result<Option<String>> {
        let response = ureq::head(url)
            .header("User-Agent", DEFAULT_USER_AGENT)
            .call()
            .with_context(|| format!("HEAD {url}"))?;
        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        Ok(content_type)
    }

    fn download(&self, url: &str, dest: &Path, user_agent: &str) -> Result<()> {
        let mut response = ureq::get(url)
            .header("User-Agent", user_agent)
            .call()
            .with_context(|| format!("GET {url}"))?;
        let mut file = fs::File::create(dest)
            .with_context(|| format!("create {}", dest.display()))?;
        let mut reader = response.body_mut().as_reader();
        std::io::copy(&mut reader, &mut file)
            .with_context(|| format!("download {url} to {}", dest.display()))?;
        Ok(())
    }
}

/// True when the failure looks like the server filtering on user agent
/// (a 403/406-style refusal) rather than a missing resource or a
/// transport fault. Only those refusals warrant the browser-agent retry.
fn agent_refusal(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(http) = cause.downcast_ref::<ureq::Error>() {
            return matches!(http, ureq::Error::StatusCode(403 | 406));
        }
        let text = cause.to_string();
        text.contains("403") || text.contains("406")
    })
}

/// Fetch text, retrying once with the browser agent when the server
/// refused the default one.
///
/// Returns the body plus the agent override to persist, if any.
pub fn get_text_with_fallback(fetcher: &dyn Fetcher, url: &str) -> Result<(String, Option<String>)> {
    match fetcher.get_text(url, DEFAULT_USER_AGENT) {
        Ok(body) => Ok((body, None)),
        Err(first_err) => {
            if !agent_refusal(&first_err) {
                return Err(first_err);
            }
            tracing::debug!(url, error = %first_err, "retrying with fallback user agent");
            let body = fetcher
                .get_text(url, FALLBACK_USER_AGENT)
                .map_err(|_| first_err)?;
            Ok((body, Some(FALLBACK_USER_AGENT.to_string())))
        }
    }
}

/// Download a file, retrying once with the browser agent when the server
/// refused the default one.
pub fn download_with_fallback(
    fetcher: &dyn Fetcher,
    url: &str,
    dest: &Path,
) -> Result<Option<String>> {
    match fetcher.download(url, dest, DEFAULT_USER_AGENT) {
        Ok(()) => Ok(None),
        Err(first_err) => {
            if !agent_refusal(&first_err) {
                return Err(first_err);
            }
            tracing::debug!(url, error = %first_err, "retrying download with fallback user agent");
            fetcher
                .download(url, dest, FALLBACK_USER_AGENT)
                .map_err(|_| first_err)?;
            Ok(Some(FALLBACK_USER_AGENT.to_string()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

pub trait Runner {
    fn run(&self, program: &str, args: &[&str]) -> Result<RunOutput>;
}

/// Runs real subprocesses (`plutil`, `codesign`, `sips`, `hdiutil`,
/// `ditto`, `tar`, `autopkg`).
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<RunOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("run {program}"))?;
        Ok(RunOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// The bundle of collaborators handed to inspectors, plus the run-owned
/// scratch directory every temporary file lands in.
pub struct Io {
    pub fetcher: Box<dyn Fetcher>,
    pub runner: Box<dyn Runner>,
    pub scratch: PathBuf,
}

impl Io {
    pub fn system(scratch: PathBuf) -> Self {
        Self {
            fetcher: Box::new(UreqFetcher),
            runner: Box::new(SystemRunner),
            scratch,
        }
    }

    /// Scratch path for a download or unpack product.
    pub fn scratch_path(&self, file_name: &str) -> PathBuf {
        self.scratch.join(file_name)
    }
}

/// Locate the downstream recipe tool, if installed.
pub fn find_recipe_tool() -> Option<PathBuf> {
    which::which("autopkg").ok()
}

/// Run `plutil` to convert a property list to JSON.
pub fn plist_to_json(runner: &dyn Runner, path: &Path) -> Result<serde_json::Value> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("non-UTF-8 plist path: {}", path.display()))?;
    let output = runner.run("plutil", &["-convert", "json", "-o", "-", path_str])?;
    if !output.success() {
        return Err(anyhow!(
            "plutil failed for {}: {}",
            path.display(),
            output.stderr.trim()
        ));
    }
    serde_json::from_str(&output.stdout)
        .with_context(|| format!("parse plutil JSON for {}", path.display()))
}
