//! The inspector chain: pluggable inspection units driven to a fixed point.
//!
//! Each pass walks the ordered registry. An inspector is invoked only when
//! it has not yet run for the (inspector, source-kind) pair, its kind
//! filter matches, and its prerequisite facts are present. The chain stops
//! when a full pass leaves the fact store revision unchanged; a hard pass
//! cap turns any oscillation bug into a loud internal error instead of a
//! silent stop.

mod app_bundle;
mod codesign;
mod description;
mod download;
mod duplicates;
mod hosting;
mod sparkle;
mod unpack;

use crate::classify::SourceKind;
use crate::events::EventSink;
use crate::facts::{names, FactStore};
use crate::io::Io;
use anyhow::{anyhow, Result};

pub trait Inspector {
    fn id(&self) -> &'static str;

    /// Coarse kind filter; an empty slice means "any kind".
    fn source_kinds(&self) -> &'static [SourceKind] {
        &[]
    }

    /// Prerequisites present and the inspector's work not yet done. A
    /// missing prerequisite is not an error; the inspector simply waits
    /// for a later pass.
    fn ready(&self, facts: &FactStore) -> bool;

    /// Perform the inspection. An `Err` is absorbed by the driver as a
    /// warning event; facts the inspector would have produced stay unset.
    fn inspect(&self, facts: &mut FactStore, io: &Io, sink: &mut EventSink) -> Result<()>;
}

/// The ordered registry. Order is the declared priority order; within one
/// pass an earlier inspector's facts are visible to later ones.
pub fn registry() -> Vec<Box<dyn Inspector>> {
    vec![
        Box::new(download::DownloadInspector),
        Box::new(unpack::UnpackInspector),
        Box::new(app_bundle::AppBundleInspector),
        Box::new(app_bundle::AppStoreReceiptInspector),
        Box::new(codesign::CodesignInspector),
        Box::new(sparkle::SparkleFeedInspector),
        Box::new(hosting::SourceHostingInspector),
        Box::new(description::DescriptionCatalogInspector),
        Box::new(duplicates::NearDuplicateInspector),
    ]
}

pub fn run_chain(
    facts: &mut FactStore,
    kind: SourceKind,
    io: &Io,
    sink: &mut EventSink,
) -> Result<()> {
    run_chain_with(&registry(), facts, kind, io, sink)
}

pub(crate) fn run_chain_with(
    inspectors: &[Box<dyn Inspector>],
    facts: &mut FactStore,
    kind: SourceKind,
    io: &Io,
    sink: &mut EventSink,
) -> Result<()> {
    let max_passes = inspectors.len() + 1;
    let mut pass = 0;
    loop {
        pass += 1;
        if pass > max_passes {
            return Err(anyhow!(
                "inspector chain exceeded {max_passes} passes without reaching a fixed point"
            ));
        }
        let before = facts.revision();
        for inspector in inspectors {
            if facts.has_inspected(inspector.id(), kind) {
                continue;
            }
            let kinds = inspector.source_kinds();
            if !kinds.is_empty() && !kinds.contains(&kind) {
                continue;
            }
            if !inspector.ready(facts) {
                continue;
            }

            tracing::debug!(inspector = inspector.id(), pass, "running inspector");
            let result = inspector.inspect(facts, io, sink);
            facts.mark_inspected(inspector.id(), kind);
            if let Err(err) = result {
                sink.warning(format!("{} inspection failed: {err:#}", inspector.id()));
            }

            if let Some(reason) = facts.text(names::UNUSABLE) {
                return Err(anyhow!("input unusable: {reason}"));
            }
        }
        if facts.revision() == before {
            tracing::debug!(pass, "inspector chain reached fixed point");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingReporter, Event};
    use std::path::PathBuf;

    fn offline_io() -> Io {
        struct NoNetwork;
        impl crate::io::Fetcher for NoNetwork {
            fn get_text(&self, url: &str, _ua: &str) -> Result<String> {
                Err(anyhow!("unexpected GET {url}"))
            }
            fn head_content_type(&self, url: &str) -> Result<Option<String>> {
                Err(anyhow!("unexpected HEAD {url}"))
            }
            fn download(&self, url: &str, _dest: &std::path::Path, _ua: &str) -> Result<()> {
                Err(anyhow!("unexpected download {url}"))
            }
        }
        Io {
            fetcher: Box::new(NoNetwork),
            runner: Box::new(crate::io::SystemRunner),
            scratch: PathBuf::from("/tmp"),
        }
    }

    struct SetOnce {
        id: &'static str,
        fact: &'static str,
        needs: Option<&'static str>,
    }

    impl Inspector for SetOnce {
        fn id(&self) -> &'static str {
            self.id
        }
        fn ready(&self, facts: &FactStore) -> bool {
            let prereq_ok = self.needs.map(|name| facts.is_set(name)).unwrap_or(true);
            prereq_ok && !facts.is_set(self.fact)
        }
        fn inspect(&self, facts: &mut FactStore, _io: &Io, _sink: &mut EventSink) -> Result<()> {
            facts.set(self.fact, "done");
            Ok(())
        }
    }

    struct AlwaysFails;

    impl Inspector for AlwaysFails {
        fn id(&self) -> &'static str {
            "always_fails"
        }
        fn ready(&self, _facts: &FactStore) -> bool {
            true
        }
        fn inspect(&self, _facts: &mut FactStore, _io: &Io, _sink: &mut EventSink) -> Result<()> {
            Err(anyhow!("boom"))
        }
    }

    #[test]
    fn chain_reaches_fixed_point_across_dependent_passes() {
        // b depends on a but is registered first, so its fact lands on the
        // second pass; the third pass observes no change and stops.
        let inspectors: Vec<Box<dyn Inspector>> = vec![
            Box::new(SetOnce {
                id: "b",
                fact: "fact_b",
                needs: Some("fact_a"),
            }),
            Box::new(SetOnce {
                id: "a",
                fact: "fact_a",
                needs: None,
            }),
        ];
        let mut facts = FactStore::new();
        let mut collector = CollectingReporter::default();
        let mut sink = EventSink::new(&mut collector);
        let io = offline_io();

        run_chain_with(
            &inspectors,
            &mut facts,
            SourceKind::DirectDownload,
            &io,
            &mut sink,
        )
        .expect("chain");
        assert_eq!(facts.text("fact_a"), Some("done"));
        assert_eq!(facts.text("fact_b"), Some("done"));
    }

    #[test]
    fn failing_inspector_becomes_a_warning_and_runs_once() {
        let inspectors: Vec<Box<dyn Inspector>> = vec![Box::new(AlwaysFails)];
        let mut facts = FactStore::new();
        let mut collector = CollectingReporter::default();
        let mut sink = EventSink::new(&mut collector);
        let io = offline_io();

        run_chain_with(
            &inspectors,
            &mut facts,
            SourceKind::DirectDownload,
            &io,
            &mut sink,
        )
        .expect("a failing inspector is recoverable");

        let warnings: Vec<_> = collector
            .events
            .iter()
            .filter(|event| matches!(event, Event::Warning { .. }))
            .collect();
        assert_eq!(warnings.len(), 1, "marked after failure, never retried");
    }

    #[test]
    fn shared_breadcrumb_stops_duplicate_ids() {
        struct Oscillator;
        impl Inspector for Oscillator {
            fn id(&self) -> &'static str {
                "oscillator"
            }
            fn ready(&self, _facts: &FactStore) -> bool {
                true
            }
            fn inspect(&self, facts: &mut FactStore, _io: &Io, _sink: &mut EventSink) -> Result<()> {
                let next = facts.revision().to_string();
                facts.set("wobble", next);
                Ok(())
            }
        }

        let inspectors: Vec<Box<dyn Inspector>> =
            (0..4).map(|_| Box::new(Oscillator) as _).collect();
        let mut facts = FactStore::new();
        let mut collector = CollectingReporter::default();
        let mut sink = EventSink::new(&mut collector);
        let io = offline_io();

        // All instances share one id, so after the first invocation the
        // breadcrumb stops the rest; the chain still terminates cleanly.
        run_chain_with(
            &inspectors,
            &mut facts,
            SourceKind::DirectDownload,
            &io,
            &mut sink,
        )
        .expect("breadcrumbs stop duplicate ids");
        assert_eq!(facts.text("wobble"), Some("0"));
    }

    #[test]
    fn unusable_fact_aborts_the_chain() {
        struct Blocker;
        impl Inspector for Blocker {
            fn id(&self) -> &'static str {
                "blocker"
            }
            fn ready(&self, _facts: &FactStore) -> bool {
                true
            }
            fn inspect(&self, facts: &mut FactStore, _io: &Io, _sink: &mut EventSink) -> Result<()> {
                facts.set(names::UNUSABLE, "no usable application found");
                Ok(())
            }
        }

        let inspectors: Vec<Box<dyn Inspector>> = vec![Box::new(Blocker)];
        let mut facts = FactStore::new();
        let mut collector = CollectingReporter::default();
        let mut sink = EventSink::new(&mut collector);
        let io = offline_io();

        let err = run_chain_with(
            &inspectors,
            &mut facts,
            SourceKind::DirectDownload,
            &io,
            &mut sink,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no usable application"));
    }
}
