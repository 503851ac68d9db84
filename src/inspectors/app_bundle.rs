//! Read bundle metadata out of an application's Info.plist, and detect
//! the App Store receipt marker.

use super::Inspector;
use crate::events::EventSink;
use crate::facts::{names, FactStore};
use crate::io::{plist_to_json, Io};
use crate::util::is_version_shaped;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::path::Path;

const SHORT_VERSION_KEY: &str = "CFBundleShortVersionString";
const RAW_VERSION_KEY: &str = "CFBundleVersion";

pub struct AppBundleInspector;

impl Inspector for AppBundleInspector {
    fn id(&self) -> &'static str {
        "app_bundle"
    }

    fn ready(&self, facts: &FactStore) -> bool {
        facts.is_set(names::APP_PATH) && !facts.is_set(names::BUNDLE_ID)
    }

    fn inspect(&self, facts: &mut FactStore, io: &Io, sink: &mut EventSink) -> Result<()> {
        let app_path = facts
            .text(names::APP_PATH)
            .context("app_path fact vanished")?
            .to_string();
        let app = Path::new(&app_path);
        let info_plist = app.join("Contents/Info.plist");
        if !info_plist.exists() {
            return Err(anyhow!("{} has no Info.plist", app.display()));
        }

        let info = plist_to_json(io.runner.as_ref(), &info_plist)?;
        let dict = info
            .as_object()
            .ok_or_else(|| anyhow!("Info.plist is not a dictionary"))?;

        let name = dict
            .get("CFBundleName")
            .and_then(Value::as_str)
            .or_else(|| dict.get("CFBundleDisplayName").and_then(Value::as_str))
            .map(|name| name.to_string())
            .or_else(|| {
                app.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(|stem| stem.to_string())
            })
            .ok_or_else(|| anyhow!("cannot determine app name"))?;
        facts.set(names::APP_NAME, name.clone());

        if let Some(bundle_id) = dict.get("CFBundleIdentifier").and_then(Value::as_str) {
            facts.set(names::BUNDLE_ID, bundle_id);
        } else {
            sink.warning(format!("{name} has no CFBundleIdentifier"));
        }

        let (version_key, version) = select_version(dict);
        if let Some(version) = version {
            facts.set(names::VERSION_KEY, version_key);
            facts.set(names::VERSION, version);
        } else {
            sink.warning(format!("{name} exposes no usable version key"));
        }

        match icon_resource(dict) {
            Some(icon_name) => {
                let icon = app.join("Contents/Resources").join(with_icns(&icon_name));
                facts.set(names::ICON_PATH, icon.display().to_string());
            }
            None => sink.info(format!("{name} declares no icon resource")),
        }

        if let Some(feed) = dict.get("SUFeedURL").and_then(Value::as_str) {
            sink.info(format!("{name} embeds a Sparkle feed: {feed}"));
            facts.set(names::SPARKLE_FEED, feed);
        }
        Ok(())
    }
}

/// Prefer the short version string, falling back to the raw key when the
/// short one is absent or not a dotted-numeric version.
fn select_version(dict: &serde_json::Map<String, Value>) -> (&'static str, Option<String>) {
    let short = dict.get(SHORT_VERSION_KEY).and_then(Value::as_str);
    if let Some(short) = short {
        if is_version_shaped(short) {
            return (SHORT_VERSION_KEY, Some(short.to_string()));
        }
    }
    let raw = dict.get(RAW_VERSION_KEY).and_then(Value::as_str);
    (RAW_VERSION_KEY, raw.map(|raw| raw.to_string()))
}

/// Legacy single-icon key, or the modern icon-set dictionary preferring
/// the last (largest) entry.
fn icon_resource(dict: &serde_json::Map<String, Value>) -> Option<String> {
    if let Some(files) = dict
        .get("CFBundleIcons")
        .and_then(|icons| icons.get("CFBundlePrimaryIcon"))
        .and_then(|primary| primary.get("CFBundleIconFiles"))
        .and_then(Value::as_array)
    {
        if let Some(last) = files.iter().rev().find_map(Value::as_str) {
            return Some(last.to_string());
        }
    }
    dict.get("CFBundleIconFile")
        .and_then(Value::as_str)
        .map(|name| name.to_string())
}

fn with_icns(name: &str) -> String {
    if Path::new(name).extension().is_some() {
        name.to_string()
    } else {
        format!("{name}.icns")
    }
}

/// Flags App-Store origin via the embedded receipt marker, which reroutes
/// synthesis toward override-style artifacts.
pub struct AppStoreReceiptInspector;

impl Inspector for AppStoreReceiptInspector {
    fn id(&self) -> &'static str {
        "app_store_receipt"
    }

    fn ready(&self, facts: &FactStore) -> bool {
        facts.is_set(names::APP_PATH) && !facts.is_set(names::IS_APP_STORE)
    }

    fn inspect(&self, facts: &mut FactStore, _io: &Io, sink: &mut EventSink) -> Result<()> {
        let app_path = facts
            .text(names::APP_PATH)
            .context("app_path fact vanished")?
            .to_string();
        let receipt = Path::new(&app_path).join("Contents/_MASReceipt/receipt");
        let from_app_store = receipt.exists();
        facts.set(names::IS_APP_STORE, from_app_store);
        if from_app_store {
            sink.reminder(
                "App Store origin detected; override-style recipes will be produced instead of standalone ones",
            );
        }
        Ok(())
    }
}
