//! Recipe synthesis: map facts onto templates, one recipe per resolved
//! type, plus the converted icon for presentation-bearing types.

use crate::events::EventSink;
use crate::facts::{names, FactStore};
use crate::io::{Io, Runner};
use crate::recipes::RecipeType;
use crate::templates::template_for;
use crate::util::filename_safe;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Parent namespace for override-style recipes wrapping App Store apps.
const APP_STORE_PARENT_PREFIX: &str = "com.github.appstore";

pub struct SynthesisConfig<'a> {
    pub output_dir: &'a Path,
    pub identifier_prefix: &'a str,
    pub deployment_source: Option<&'a str>,
}

/// Build every recipe in the plan, in order. Individual failures (missing
/// facts, output collisions, icon conversion) stay local to their type;
/// dependents of a type that produced nothing are skipped.
pub fn synthesize(
    plan: &[RecipeType],
    facts: &FactStore,
    cfg: &SynthesisConfig<'_>,
    io: &Io,
    sink: &mut EventSink,
) -> Result<()> {
    let app_name = facts
        .text(names::APP_NAME)
        .ok_or_else(|| anyhow!("no app name resolved; nothing to synthesize"))?
        .to_string();
    let safe_name = filename_safe(&app_name);
    let app_store = facts.flag(names::IS_APP_STORE);

    let dest_dir = cfg.output_dir.join(filename_safe(
        facts.text(names::DEVELOPER).unwrap_or(&app_name),
    ));

    let mut satisfied: BTreeSet<RecipeType> = BTreeSet::new();
    let mut icon_attempted = false;

    for &recipe_type in plan {
        if app_store && recipe_type == RecipeType::Download {
            // Override-style recipes pull from the App Store parent, so a
            // standalone download recipe would be dead weight.
            sink.info("App Store origin; skipping the standalone download recipe");
            satisfied.insert(RecipeType::Download);
            continue;
        }

        if let Some(unmet) = unmet_dependency(recipe_type, &satisfied) {
            sink.warning(format!(
                "skipping {recipe_type} recipe: required {unmet} recipe was not built"
            ));
            continue;
        }

        if let Some(reason) = missing_precondition(recipe_type, facts, cfg) {
            sink.warning(format!("skipping {recipe_type} recipe: {reason}"));
            continue;
        }

        let document = render(recipe_type, facts, cfg, &app_name, &safe_name, app_store)?;
        let dest = dest_dir.join(format!("{safe_name}.{recipe_type}.recipe"));
        if dest.exists() {
            sink.error(format!(
                "output collision: {} already exists; not overwriting",
                dest.display()
            ));
            // The pre-existing recipe still satisfies dependents.
            satisfied.insert(recipe_type);
            continue;
        }
        fs::create_dir_all(&dest_dir)
            .with_context(|| format!("create {}", dest_dir.display()))?;
        fs::write(&dest, document).with_context(|| format!("write {}", dest.display()))?;
        sink.recipe_created(
            format!("{recipe_type} recipe for {app_name}"),
            dest.display().to_string(),
        );
        satisfied.insert(recipe_type);

        if recipe_type.wants_icon() && !icon_attempted {
            icon_attempted = true;
            produce_icon(facts, io.runner.as_ref(), &dest_dir, &safe_name, sink);
        }
    }
    Ok(())
}

fn unmet_dependency(
    recipe_type: RecipeType,
    satisfied: &BTreeSet<RecipeType>,
) -> Option<RecipeType> {
    recipe_type
        .required_types()
        .into_iter()
        .find(|required| *required != recipe_type && !satisfied.contains(required))
}

/// Format-specific prerequisite facts. Returning Some is a per-type skip
/// with a warning, never a run failure.
fn missing_precondition(
    recipe_type: RecipeType,
    facts: &FactStore,
    cfg: &SynthesisConfig<'_>,
) -> Option<String> {
    match recipe_type {
        RecipeType::Download => {
            if !facts.is_set(names::DOWNLOAD_URL) {
                return Some("no download URL was resolved".to_string());
            }
        }
        RecipeType::Pkg => {
            if !facts.is_set(names::DOWNLOAD_FILE) {
                return Some("no resolved download artifact".to_string());
            }
            if !facts.is_set(names::CODESIGN_STATUS) {
                return Some("code-signing status was never determined".to_string());
            }
            if !facts.is_set(names::BUNDLE_ID) {
                return Some("no bundle identifier".to_string());
            }
        }
        RecipeType::Munki => {
            if !facts.is_set(names::DESCRIPTION) {
                return Some("no description available for pkginfo".to_string());
            }
        }
        RecipeType::Install => {}
        RecipeType::Jamf => {
            if cfg.deployment_source.is_none() {
                return Some("no deployment package source configured".to_string());
            }
        }
        RecipeType::Intune | RecipeType::Filewave => {}
    }
    None
}

fn render(
    recipe_type: RecipeType,
    facts: &FactStore,
    cfg: &SynthesisConfig<'_>,
    app_name: &str,
    safe_name: &str,
    app_store: bool,
) -> Result<String> {
    let prefix = cfg.identifier_prefix;
    let identifier = format!("{prefix}.{recipe_type}.{safe_name}");
    let parent_identifier = match recipe_type {
        RecipeType::Download => String::new(),
        RecipeType::Pkg | RecipeType::Munki | RecipeType::Install => {
            if app_store {
                format!("{APP_STORE_PARENT_PREFIX}.{recipe_type}")
            } else {
                format!("{prefix}.download.{safe_name}")
            }
        }
        RecipeType::Jamf | RecipeType::Intune | RecipeType::Filewave => {
            format!("{prefix}.pkg.{safe_name}")
        }
    };

    let mut vars: Vec<(&str, String)> = vec![
        ("app_name", xml_escape(app_name)),
        ("identifier", identifier),
        ("parent_identifier", parent_identifier),
        (
            "description",
            xml_escape(facts.text(names::DESCRIPTION).unwrap_or_default()),
        ),
        (
            "developer",
            xml_escape(facts.text(names::DEVELOPER).unwrap_or_default()),
        ),
        (
            "bundle_id",
            xml_escape(facts.text(names::BUNDLE_ID).unwrap_or_default()),
        ),
        (
            "version_key",
            facts
                .text(names::VERSION_KEY)
                .unwrap_or("CFBundleShortVersionString")
                .to_string(),
        ),
        (
            "deployment_source",
            xml_escape(cfg.deployment_source.unwrap_or_default()),
        ),
    ];

    if recipe_type == RecipeType::Download {
        vars.push((
            "download_url",
            xml_escape(facts.text(names::DOWNLOAD_URL).unwrap_or_default()),
        ));
        vars.push((
            "download_format",
            facts.text(names::DOWNLOAD_FORMAT).unwrap_or("dmg").to_string(),
        ));
        vars.push(("extra_input", download_extra_input(facts)));
        vars.push(("request_headers", request_headers_block(facts)));
        vars.push(("verification", verification_block(facts)));
    }

    fill(template_for(recipe_type), &vars)
}

/// Optional Input entries for the download recipe: asset selection pattern
/// and the artifact checksum recorded at inspection time.
fn download_extra_input(facts: &FactStore) -> String {
    let mut block = String::new();
    if let Some(pattern) = facts.text(names::ASSET_REGEX) {
        block.push_str(&format!(
            "\n\t\t<key>ASSET_PATTERN</key>\n\t\t<string>{}</string>",
            xml_escape(pattern)
        ));
    }
    if let Some(sha256) = facts.text(names::DOWNLOAD_SHA256) {
        block.push_str(&format!(
            "\n\t\t<key>EXPECTED_SHA256</key>\n\t\t<string>{sha256}</string>"
        ));
    }
    block
}

/// Persist the alternate user agent into the recipe's request headers when
/// the inspection-time fetch needed it.
fn request_headers_block(facts: &FactStore) -> String {
    match facts.text(names::USER_AGENT) {
        Some(agent) => format!(
            "\n\t\t\t\t<key>request_headers</key>\n\t\t\t\t<dict>\
             \n\t\t\t\t\t<key>User-Agent</key>\n\t\t\t\t\t<string>{}</string>\
             \n\t\t\t\t</dict>",
            xml_escape(agent)
        ),
        None => String::new(),
    }
}

fn verification_block(facts: &FactStore) -> String {
    if facts.text(names::CODESIGN_STATUS) != Some("signed") {
        return String::new();
    }
    let Some(requirement) = facts.text(names::CODESIGN_REQUIREMENTS) else {
        return String::new();
    };
    format!(
        "\n\t\t<dict>\
         \n\t\t\t<key>Processor</key>\
         \n\t\t\t<string>CodeSignatureVerifier</string>\
         \n\t\t\t<key>Arguments</key>\
         \n\t\t\t<dict>\
         \n\t\t\t\t<key>input_path</key>\
         \n\t\t\t\t<string>%pathname%/*.app</string>\
         \n\t\t\t\t<key>requirement</key>\
         \n\t\t\t\t<string>{}</string>\
         \n\t\t\t</dict>\
         \n\t\t</dict>",
        xml_escape(requirement)
    )
}

/// Substitute `{{name}}` slots; a leftover slot is an internal error, not
/// a malformed recipe on disk.
fn fill(template: &str, vars: &[(&str, String)]) -> Result<String> {
    let mut document = template.to_string();
    for (name, value) in vars {
        document = document.replace(&format!("{{{{{name}}}}}"), value);
    }
    if let Some(idx) = document.find("{{") {
        let tail: String = document[idx..].chars().take(40).collect();
        return Err(anyhow!("unfilled template slot near `{tail}`"));
    }
    Ok(document)
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Convert the discovered icon to a 300x300 PNG beside the recipes.
/// Failure is a warning; the recipe has already been written.
fn produce_icon(
    facts: &FactStore,
    runner: &dyn Runner,
    dest_dir: &Path,
    safe_name: &str,
    sink: &mut EventSink,
) {
    let Some(icon_path) = facts.text(names::ICON_PATH) else {
        sink.warning("no icon was discovered; presentation recipes will lack one");
        return;
    };
    let dest = dest_dir.join(format!("{safe_name}.png"));
    if dest.exists() {
        sink.warning(format!(
            "icon {} already exists; not overwriting",
            dest.display()
        ));
        return;
    }
    match convert_icon(runner, icon_path, &dest) {
        Ok(()) => sink.icon_created(
            format!("300x300 icon for {safe_name}"),
            dest.display().to_string(),
        ),
        Err(err) => sink.warning(format!("icon conversion failed: {err:#}")),
    }
}

fn convert_icon(runner: &dyn Runner, source: &str, dest: &PathBuf) -> Result<()> {
    let dest_str = dest
        .to_str()
        .ok_or_else(|| anyhow!("non-UTF-8 icon path: {}", dest.display()))?;
    let output = runner.run(
        "sips",
        &[
            "-s",
            "format",
            "png",
            "--resampleHeightWidth",
            "300",
            "300",
            source,
            "--out",
            dest_str,
        ],
    )?;
    if !output.success() {
        return Err(anyhow!("sips failed: {}", output.stderr.trim()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingReporter, Event};
    use crate::io::RunOutput;
    use crate::recipes::resolve_build_plan;

    /// Pretends sips succeeded and drops a placeholder PNG.
    struct FakeSips;

    impl Runner for FakeSips {
        fn run(&self, program: &str, args: &[&str]) -> Result<RunOutput> {
            assert_eq!(program, "sips");
            let dest = args.last().expect("sips dest");
            fs::write(dest, b"png").expect("write fake png");
            Ok(RunOutput {
                status: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn offline_io(runner: Box<dyn Runner>) -> Io {
        struct NoNetwork;
        impl crate::io::Fetcher for NoNetwork {
            fn get_text(&self, url: &str, _ua: &str) -> Result<String> {
                Err(anyhow!("unexpected GET {url}"))
            }
            fn head_content_type(&self, url: &str) -> Result<Option<String>> {
                Err(anyhow!("unexpected HEAD {url}"))
            }
            fn download(&self, url: &str, _dest: &Path, _ua: &str) -> Result<()> {
                Err(anyhow!("unexpected download {url}"))
            }
        }
        Io {
            fetcher: Box::new(NoNetwork),
            runner,
            scratch: PathBuf::from("/tmp"),
        }
    }

    fn full_facts() -> FactStore {
        let mut facts = FactStore::new();
        facts.set(names::APP_NAME, "Tool");
        facts.set(names::DEVELOPER, "Example Corp");
        facts.set(names::BUNDLE_ID, "com.example.tool");
        facts.set(names::VERSION_KEY, "CFBundleShortVersionString");
        facts.set(names::VERSION, "1.2.3");
        facts.set(names::DESCRIPTION, "Tool edits things.");
        facts.set(names::DOWNLOAD_URL, "https://example.test/Tool.dmg");
        facts.set(names::DOWNLOAD_FILE, "/scratch/Tool.dmg");
        facts.set(names::DOWNLOAD_FORMAT, "dmg");
        facts.set(names::CODESIGN_STATUS, "signed");
        facts.set(
            names::CODESIGN_REQUIREMENTS,
            "identifier \"com.example.tool\" and anchor apple generic",
        );
        facts.set(names::ICON_PATH, "/apps/Tool.app/Contents/Resources/Tool.icns");
        facts
    }

    fn run_synth(
        plan: &[RecipeType],
        facts: &FactStore,
        output_dir: &Path,
    ) -> Vec<Event> {
        let mut collector = CollectingReporter::default();
        {
            let mut sink = EventSink::new(&mut collector);
            let cfg = SynthesisConfig {
                output_dir,
                identifier_prefix: "local",
                deployment_source: Some("/packages"),
            };
            let io = offline_io(Box::new(FakeSips));
            synthesize(plan, facts, &cfg, &io, &mut sink).expect("synthesize");
        }
        collector.events
    }

    fn count<F: Fn(&Event) -> bool>(events: &[Event], pred: F) -> usize {
        events.iter().filter(|event| pred(event)).count()
    }

    #[test]
    fn full_facts_produce_one_recipe_per_type_and_one_icon() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plan = resolve_build_plan(&[RecipeType::Munki, RecipeType::Jamf]);
        let events = run_synth(&plan, &full_facts(), dir.path());

        assert_eq!(
            count(&events, |e| matches!(e, Event::RecipeCreated { .. })),
            4,
            "download, pkg, munki, jamf"
        );
        assert_eq!(count(&events, |e| matches!(e, Event::IconCreated { .. })), 1);
        assert_eq!(count(&events, |e| matches!(e, Event::Warning { .. })), 0);

        let download = dir
            .path()
            .join("ExampleCorp")
            .join("Tool.download.recipe");
        let body = fs::read_to_string(download).expect("download recipe");
        assert!(body.contains("<string>local.download.Tool</string>"));
        assert!(body.contains("https://example.test/Tool.dmg"));
        assert!(body.contains("CodeSignatureVerifier"));
        assert!(!body.contains("{{"), "no unfilled slots");
    }

    #[test]
    fn missing_description_skips_munki_but_not_download() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut facts = full_facts();
        facts = {
            // Rebuild without a description; facts never get removed.
            let mut bare = FactStore::new();
            for name in [
                names::APP_NAME,
                names::DEVELOPER,
                names::BUNDLE_ID,
                names::DOWNLOAD_URL,
                names::DOWNLOAD_FILE,
                names::DOWNLOAD_FORMAT,
                names::CODESIGN_STATUS,
            ] {
                if let Some(value) = facts.text(name) {
                    bare.set(name, value.to_string());
                }
            }
            bare
        };
        let plan = resolve_build_plan(&[RecipeType::Munki]);
        let events = run_synth(&plan, &facts, dir.path());

        assert_eq!(
            count(&events, |e| matches!(e, Event::RecipeCreated { .. })),
            1,
            "only download lands"
        );
        assert!(events.iter().any(|event| matches!(
            event,
            Event::Warning { message } if message.contains("skipping munki")
        )));
    }

    #[test]
    fn skipped_base_type_skips_dependents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut facts = FactStore::new();
        facts.set(names::APP_NAME, "Tool");
        // No download URL at all: download skips, pkg and jamf cascade.
        let plan = resolve_build_plan(&[RecipeType::Jamf]);
        let events = run_synth(&plan, &facts, dir.path());

        assert_eq!(count(&events, |e| matches!(e, Event::RecipeCreated { .. })), 0);
        assert_eq!(count(&events, |e| matches!(e, Event::Warning { .. })), 3);
    }

    #[test]
    fn output_collision_errors_and_preserves_the_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest_dir = dir.path().join("ExampleCorp");
        fs::create_dir_all(&dest_dir).expect("create");
        let existing = dest_dir.join("Tool.download.recipe");
        fs::write(&existing, b"operator-owned bytes").expect("write");

        let events = run_synth(&[RecipeType::Download], &full_facts(), dir.path());
        assert_eq!(count(&events, |e| matches!(e, Event::RecipeCreated { .. })), 0);
        assert_eq!(count(&events, |e| matches!(e, Event::Error { .. })), 1);
        assert_eq!(
            fs::read(&existing).expect("read back"),
            b"operator-owned bytes"
        );
    }

    #[test]
    fn app_store_origin_reroutes_to_override_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut facts = full_facts();
        facts.set(names::IS_APP_STORE, true);
        let plan = resolve_build_plan(&[RecipeType::Munki]);
        let events = run_synth(&plan, &facts, dir.path());

        // Download is suppressed; pkg and munki become overrides.
        assert_eq!(count(&events, |e| matches!(e, Event::RecipeCreated { .. })), 2);
        let munki = dir.path().join("ExampleCorp").join("Tool.munki.recipe");
        let body = fs::read_to_string(munki).expect("munki recipe");
        assert!(body.contains("com.github.appstore.munki"));
    }

    #[test]
    fn unsigned_apps_get_no_verification_block() {
        let mut facts = full_facts();
        facts.set(names::CODESIGN_STATUS, "unsigned");
        let dir = tempfile::tempdir().expect("tempdir");
        let events = run_synth(&[RecipeType::Download], &facts, dir.path());
        assert_eq!(count(&events, |e| matches!(e, Event::RecipeCreated { .. })), 1);

        let body = fs::read_to_string(
            dir.path().join("ExampleCorp").join("Tool.download.recipe"),
        )
        .expect("recipe");
        assert!(!body.contains("CodeSignatureVerifier"));
    }

    #[test]
    fn fill_rejects_unknown_slots() {
        let err = fill("<string>{{mystery}}</string>", &[]).unwrap_err();
        assert!(err.to_string().contains("mystery"));
    }
}
