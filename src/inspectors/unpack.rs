//! Unpack the downloaded artifact and locate the application bundle.

use super::download::guess_format_from_name;
use super::Inspector;
use crate::events::EventSink;
use crate::facts::{names, FactStore};
use crate::io::{Io, Runner};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct UnpackInspector;

impl Inspector for UnpackInspector {
    fn id(&self) -> &'static str {
        "unpack"
    }

    fn ready(&self, facts: &FactStore) -> bool {
        facts.is_set(names::DOWNLOAD_FILE) && !facts.is_set(names::APP_PATH)
    }

    fn inspect(&self, facts: &mut FactStore, io: &Io, sink: &mut EventSink) -> Result<()> {
        let file = facts
            .text(names::DOWNLOAD_FILE)
            .context("download_file fact vanished")?
            .to_string();
        let file_name = Path::new(&file)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("download")
            .to_string();

        let format = facts
            .text(names::DOWNLOAD_FORMAT)
            .map(|f| f.to_string())
            .or_else(|| guess_format_from_name(&file_name).map(|f| f.to_string()))
            .ok_or_else(|| anyhow!("cannot determine archive format of {file_name}"))?;
        facts.set(names::DOWNLOAD_FORMAT, format.clone());

        if format == "pkg" {
            // Installer packages are not unpacked; recipes wrap the
            // installer directly. The file stem seeds a refinable name.
            sink.info("installer package input; app metadata will be limited");
            if !facts.is_set(names::APP_NAME) {
                if let Some(stem) = Path::new(&file_name).file_stem().and_then(|s| s.to_str()) {
                    facts.set(names::APP_NAME, stem);
                }
            }
            return Ok(());
        }

        let unpack_root = io.scratch_path("unpacked");
        fs::create_dir_all(&unpack_root)
            .with_context(|| format!("create {}", unpack_root.display()))?;
        sink.info(format!("unpacking {file_name} ({format})"));
        unpack(io.runner.as_ref(), &format, Path::new(&file), &unpack_root)?;

        let apps = find_app_bundles(&unpack_root)?;
        match choose_app(&apps) {
            Choice::App(path) => {
                facts.set(names::APP_PATH, path.display().to_string());
            }
            Choice::InstallerOnly(path) => {
                facts.set(names::INSTALLER_FOUND, true);
                sink.warning(format!(
                    "only an installer app was found ({}); verify the generated recipes install the real target",
                    path.file_name().and_then(|n| n.to_str()).unwrap_or("installer")
                ));
                facts.set(names::APP_PATH, path.display().to_string());
            }
            Choice::None => {
                facts.set(
                    names::UNUSABLE,
                    format!("no usable application found inside {file_name}"),
                );
            }
        }
        Ok(())
    }
}

fn unpack(runner: &dyn Runner, format: &str, file: &Path, dest: &Path) -> Result<()> {
    let file_str = file
        .to_str()
        .ok_or_else(|| anyhow!("non-UTF-8 archive path: {}", file.display()))?;
    let dest_str = dest
        .to_str()
        .ok_or_else(|| anyhow!("non-UTF-8 destination path: {}", dest.display()))?;

    let output = match format {
        "zip" => runner.run("ditto", &["-x", "-k", file_str, dest_str])?,
        "tgz" | "tbz" | "tar" => runner.run("tar", &["-xf", file_str, "-C", dest_str])?,
        "dmg" => return unpack_dmg(runner, file_str, dest),
        other => return Err(anyhow!("unsupported archive format: {other}")),
    };
    if !output.success() {
        return Err(anyhow!(
            "unpack of {} failed: {}",
            file.display(),
            output.stderr.trim()
        ));
    }
    Ok(())
}

/// Mount the image, copy everything visible out, detach. The detach runs
/// even when the copy fails so no mount leaks past the run.
fn unpack_dmg(runner: &dyn Runner, file: &str, dest: &Path) -> Result<()> {
    let mount_point = dest.with_file_name("mnt");
    let mount_str = mount_point
        .to_str()
        .ok_or_else(|| anyhow!("non-UTF-8 mount path"))?;
    let attach = runner.run(
        "hdiutil",
        &["attach", file, "-nobrowse", "-mountpoint", mount_str],
    )?;
    if !attach.success() {
        return Err(anyhow!("hdiutil attach failed: {}", attach.stderr.trim()));
    }

    let dest_str = dest.to_str().ok_or_else(|| anyhow!("non-UTF-8 destination path"))?;
    let copy = runner.run("ditto", &[mount_str, dest_str]);
    let detach = runner.run("hdiutil", &["detach", mount_str, "-force"]);

    let copy = copy?;
    if !copy.success() {
        return Err(anyhow!("copy out of disk image failed: {}", copy.stderr.trim()));
    }
    if let Ok(detach) = detach {
        if !detach.success() {
            tracing::debug!(stderr = %detach.stderr.trim(), "hdiutil detach failed");
        }
    }
    Ok(())
}

/// Recursively collect `.app` bundles; the search does not descend into a
/// bundle once found, and the app may sit anywhere in the tree.
fn find_app_bundles(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    collect_apps(root, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_apps(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) == Some("app") {
            found.push(path);
        } else {
            collect_apps(&path, found)?;
        }
    }
    Ok(())
}

enum Choice<'a> {
    App(&'a PathBuf),
    InstallerOnly(&'a PathBuf),
    None,
}

fn choose_app(apps: &[PathBuf]) -> Choice<'_> {
    let is_installer = |path: &PathBuf| {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_ascii_lowercase().contains("install"))
            .unwrap_or(false)
    };
    if let Some(app) = apps.iter().find(|path| !is_installer(path)) {
        return Choice::App(app);
    }
    match apps.first() {
        Some(installer) => Choice::InstallerOnly(installer),
        None => Choice::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_app_bundles_below_the_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("payload/extras/Tool.app/Contents");
        fs::create_dir_all(&nested).expect("create");
        let apps = find_app_bundles(dir.path()).expect("search");
        assert_eq!(apps.len(), 1);
        assert!(apps[0].ends_with("Tool.app"));
    }

    #[test]
    fn prefers_the_target_app_over_an_installer() {
        let a = PathBuf::from("/x/Tool Installer.app");
        let b = PathBuf::from("/x/Tool.app");
        let apps = vec![a.clone(), b.clone()];
        match choose_app(&apps) {
            Choice::App(path) => assert_eq!(path, &b),
            _ => panic!("expected the non-installer app"),
        }
    }

    #[test]
    fn lone_installer_is_flagged_not_silently_used() {
        let installer = PathBuf::from("/x/Tool Installer.app");
        let apps = vec![installer.clone()];
        match choose_app(&apps) {
            Choice::InstallerOnly(path) => assert_eq!(path, &installer),
            _ => panic!("expected installer-only choice"),
        }
    }

    #[test]
    fn empty_tree_yields_none() {
        assert!(matches!(choose_app(&[]), Choice::None));
    }
}
