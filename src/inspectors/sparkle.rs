//! Fetch and interpret a Sparkle appcast.
//!
//! Feeds disagree about whether the newest entry comes first or last; the
//! ordering heuristic parses the versions of the two most recent-looking
//! entries and picks the ordering that yields a decreasing sequence. Ties
//! and unparseable versions are flagged ambiguous, not guessed around.

use super::Inspector;
use crate::events::EventSink;
use crate::facts::{names, FactStore};
use crate::io::{get_text_with_fallback, Io};
use crate::util::compare_versions;
use anyhow::{anyhow, Context, Result};
use std::cmp::Ordering;

const SPARKLE_NS: &str = "http://www.andymatuschak.org/xml-namespaces/sparkle";

pub struct SparkleFeedInspector;

impl Inspector for SparkleFeedInspector {
    fn id(&self) -> &'static str {
        "sparkle_feed"
    }

    fn ready(&self, facts: &FactStore) -> bool {
        facts.is_set(names::SPARKLE_FEED) && !facts.is_set(names::SPARKLE_ORDER)
    }

    fn inspect(&self, facts: &mut FactStore, io: &Io, sink: &mut EventSink) -> Result<()> {
        let feed_url = facts
            .text(names::SPARKLE_FEED)
            .context("sparkle_feed fact vanished")?
            .to_string();

        let (body, agent_override) = get_text_with_fallback(io.fetcher.as_ref(), &feed_url)?;
        if let Some(agent) = agent_override {
            sink.info("feed required a browser user agent; recording it for the recipe");
            facts.set(names::USER_AGENT, agent);
        }

        let entries = parse_appcast(&body)?;
        if entries.is_empty() {
            return Err(anyhow!("appcast has no entries: {feed_url}"));
        }

        let order = detect_order(&entries);
        facts.set(names::SPARKLE_ORDER, order.as_str());
        if order == FeedOrder::Ambiguous {
            sink.warning(
                "appcast entry ordering is ambiguous; verify the recipe downloads the latest version",
            );
        }

        let latest = match order {
            FeedOrder::OldestFirst => entries.last(),
            // Ambiguous feeds fall back to the common newest-first layout.
            FeedOrder::NewestFirst | FeedOrder::Ambiguous => entries.first(),
        }
        .context("entries checked non-empty")?;

        facts.set(
            names::SPARKLE_PROVIDES_VERSION,
            latest.version.is_some(),
        );
        if let Some(version) = &latest.version {
            if !facts.is_set(names::VERSION) {
                facts.set(names::VERSION, version.as_str());
            }
        }
        match &latest.url {
            Some(url) => {
                sink.info(format!("appcast points at {url}"));
                facts.set(names::DOWNLOAD_URL, url.as_str());
            }
            None => sink.warning("latest appcast entry has no enclosure URL"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FeedEntry {
    pub(crate) version: Option<String>,
    pub(crate) url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum FeedOrder {
    NewestFirst,
    OldestFirst,
    Ambiguous,
}

impl FeedOrder {
    fn as_str(self) -> &'static str {
        match self {
            FeedOrder::NewestFirst => "newest_first",
            FeedOrder::OldestFirst => "oldest_first",
            FeedOrder::Ambiguous => "ambiguous",
        }
    }
}

pub(crate) fn parse_appcast(body: &str) -> Result<Vec<FeedEntry>> {
    let doc = roxmltree::Document::parse(body).context("parse appcast XML")?;
    let mut entries = Vec::new();
    for item in doc.descendants().filter(|node| node.has_tag_name("item")) {
        let enclosure = item
            .children()
            .find(|child| child.has_tag_name("enclosure"));
        let url = enclosure
            .and_then(|node| node.attribute("url"))
            .map(|url| url.to_string());
        let version = enclosure
            .and_then(|node| {
                node.attribute((SPARKLE_NS, "shortVersionString"))
                    .or_else(|| node.attribute((SPARKLE_NS, "version")))
            })
            .map(|version| version.to_string())
            .or_else(|| {
                item.children()
                    .find(|child| {
                        child.has_tag_name((SPARKLE_NS, "shortVersionString"))
                            || child.has_tag_name((SPARKLE_NS, "version"))
                    })
                    .and_then(|node| node.text())
                    .map(|version| version.trim().to_string())
            });
        entries.push(FeedEntry { version, url });
    }
    Ok(entries)
}

/// Sample the two head entries: a decreasing version pair means the feed is
/// newest-first; an increasing pair means oldest-first. Single-entry feeds
/// are trivially newest-first.
pub(crate) fn detect_order(entries: &[FeedEntry]) -> FeedOrder {
    if entries.len() < 2 {
        return FeedOrder::NewestFirst;
    }
    let first = entries[0].version.as_deref();
    let second = entries[1].version.as_deref();
    match (first, second) {
        (Some(first), Some(second)) => match compare_versions(first, second) {
            Some(Ordering::Greater) => FeedOrder::NewestFirst,
            Some(Ordering::Less) => FeedOrder::OldestFirst,
            Some(Ordering::Equal) | None => FeedOrder::Ambiguous,
        },
        _ => FeedOrder::Ambiguous,
    }
}
