//! Shared test infrastructure: an on-disk fake app bundle plus scripted
//! doubles for the network and the host probes, so pipeline runs are
//! hermetic.

use anyhow::{anyhow, Result};
use recipe_forge::io::{Fetcher, Io, RunOutput, Runner};
use std::fs;
use std::path::{Path, PathBuf};

/// Info.plist content as `plutil -convert json` would emit it for the
/// fixture app.
pub const FIXTURE_PLIST_JSON: &str = r#"{
  "CFBundleName": "Example",
  "CFBundleIdentifier": "com.example.example",
  "CFBundleShortVersionString": "3.1.4",
  "CFBundleVersion": "314",
  "CFBundleIconFile": "Example",
  "SUFeedURL": "https://example.test/appcast.xml"
}"#;

/// Newest-first appcast matching the fixture app.
const FIXTURE_APPCAST: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:sparkle="http://www.andymatuschak.org/xml-namespaces/sparkle">
  <channel>
    <item>
      <title>Release 3.1.4</title>
      <enclosure url="https://example.test/Example-3.1.4.dmg" sparkle:shortVersionString="3.1.4"/>
    </item>
    <item>
      <title>Release 3.1.3</title>
      <enclosure url="https://example.test/Example-3.1.3.dmg" sparkle:shortVersionString="3.1.3"/>
    </item>
  </channel>
</rss>
"#;

const SIGNED_DISPLAY: &str = "\
Executable=/Applications/Example.app/Contents/MacOS/Example
Identifier=com.example.example
CodeDirectory v=20500 size=1234 flags=0x10000(runtime) hashes=30+7 location=embedded
Authority=Developer ID Application: Example Corp (ABC1234DEF)
Authority=Developer ID Certification Authority
Authority=Apple Root CA
Sealed Resources version=2 rules=13 files=120
";

const DESIGNATED_REQUIREMENT: &str =
    "designated => identifier \"com.example.example\" and anchor apple generic\n";

/// Create a minimal .app bundle on disk. The plist bytes are opaque to the
/// pipeline; the scripted runner answers for `plutil`.
pub fn fake_app(dir: &Path) -> PathBuf {
    let app = dir.join("Example.app");
    let resources = app.join("Contents/Resources");
    fs::create_dir_all(&resources).expect("create bundle dirs");
    fs::write(app.join("Contents/Info.plist"), b"bplist00fixture").expect("write plist");
    fs::write(resources.join("Example.icns"), b"icns").expect("write icns");
    app
}

/// Serves the catalog search endpoint; everything else is refused so a
/// test fails loudly if the pipeline reaches for an unexpected URL.
pub struct StubFetcher {
    pub catalog_description: Option<&'static str>,
}

impl Fetcher for StubFetcher {
    fn get_text(&self, url: &str, _user_agent: &str) -> Result<String> {
        if url.starts_with("https://itunes.apple.com/search") {
            return match self.catalog_description {
                Some(description) => Ok(format!(
                    r#"{{"resultCount":1,"results":[{{"description":"{description}"}}]}}"#
                )),
                None => Ok(r#"{"resultCount":0,"results":[]}"#.to_string()),
            };
        }
        if url == "https://example.test/appcast.xml" {
            return Ok(FIXTURE_APPCAST.to_string());
        }
        Err(anyhow!("unexpected GET {url}"))
    }

    fn head_content_type(&self, url: &str) -> Result<Option<String>> {
        Err(anyhow!("unexpected HEAD {url}"))
    }

    fn download(&self, url: &str, dest: &Path, _user_agent: &str) -> Result<()> {
        if url.starts_with("https://example.test/") {
            fs::write(dest, b"fixture dmg bytes")?;
            return Ok(());
        }
        Err(anyhow!("unexpected download {url}"))
    }
}

/// Answers the host probes the pipeline runs for a signed local app:
/// `plutil`, `codesign`, `sips`, and the recipe index search.
pub struct ScriptedRunner {
    /// Recipe names the index search reports; empty means "nothing found".
    pub search_hits: Vec<&'static str>,
}

impl Runner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<RunOutput> {
        match program {
            "plutil" => Ok(ok_output(FIXTURE_PLIST_JSON.to_string(), String::new())),
            "codesign" if args.contains(&"-r-") => {
                Ok(ok_output(DESIGNATED_REQUIREMENT.to_string(), String::new()))
            }
            "codesign" => Ok(ok_output(String::new(), SIGNED_DISPLAY.to_string())),
            "sips" => {
                let dest = args.last().ok_or_else(|| anyhow!("sips without dest"))?;
                fs::write(dest, b"png")?;
                Ok(ok_output(String::new(), String::new()))
            }
            program if program.ends_with("autopkg") => {
                if self.search_hits.is_empty() {
                    return Ok(RunOutput {
                        status: Some(1),
                        stdout: String::new(),
                        stderr: "Nothing found.\n".to_string(),
                    });
                }
                let stdout = self
                    .search_hits
                    .iter()
                    .map(|hit| format!("{hit}    a-repo    recipes/{hit}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(ok_output(stdout, String::new()))
            }
            other => Err(anyhow!("unexpected probe: {other}")),
        }
    }
}

fn ok_output(stdout: String, stderr: String) -> RunOutput {
    RunOutput {
        status: Some(0),
        stdout,
        stderr,
    }
}

pub fn scripted_io(scratch: PathBuf, search_hits: Vec<&'static str>) -> Io {
    fs::create_dir_all(&scratch).expect("create scratch");
    Io {
        fetcher: Box::new(StubFetcher {
            catalog_description: Some("Example edits things. It is quite capable."),
        }),
        runner: Box::new(ScriptedRunner { search_hits }),
        scratch,
    }
}
