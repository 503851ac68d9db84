//! Structured event reporting.
//!
//! Events are the only channel through which a caller learns progress and
//! results. Reporters are explicit listeners handed to the pipeline; there
//! is no process-wide registration.

use serde::Serialize;
use std::collections::BTreeMap;

/// A single pipeline notification. Fire-and-forget; never stored as state.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Info { message: String },
    Warning { message: String },
    Error { message: String },
    Reminder { message: String },
    RecipeCreated { message: String, path: String },
    IconCreated { message: String, path: String },
    Complete { summary: RunSummary },
}

/// Final snapshot carried by the `Complete` event.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct RunSummary {
    pub recipes: usize,
    pub icons: usize,
    pub warnings: usize,
    pub errors: usize,
    pub reminders: usize,
    /// Facts discovered during the run, flattened for display.
    pub facts: BTreeMap<String, serde_json::Value>,
}

pub trait Reporter {
    fn report(&mut self, event: &Event);
}

/// Renders leveled text lines for a terminal. Info lines are suppressed
/// unless verbose, so non-verbose runs show only milestones.
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&mut self, event: &Event) {
        match event {
            Event::Info { message } => {
                if self.verbose {
                    println!("[info] {message}");
                }
            }
            Event::Warning { message } => eprintln!("[warning] {message}"),
            Event::Error { message } => eprintln!("[error] {message}"),
            Event::Reminder { message } => println!("[reminder] {message}"),
            Event::RecipeCreated { message, path } => println!("[recipe] {message} ({path})"),
            Event::IconCreated { message, path } => println!("[icon] {message} ({path})"),
            Event::Complete { summary } => {
                println!(
                    "[complete] {} recipe(s), {} icon(s); {} warning(s), {} error(s), {} reminder(s)",
                    summary.recipes,
                    summary.icons,
                    summary.warnings,
                    summary.errors,
                    summary.reminders
                );
            }
        }
    }
}

/// Mirrors every event as one JSON object per line so a listening process
/// can subscribe per event kind.
pub struct JsonLinesReporter;

impl Reporter for JsonLinesReporter {
    fn report(&mut self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => eprintln!("[error] serialize event: {err}"),
        }
    }
}

/// Collects events in memory. Used by tests and by the pipeline's own
/// summary accounting.
#[derive(Default)]
pub struct CollectingReporter {
    pub events: Vec<Event>,
}

impl Reporter for CollectingReporter {
    fn report(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

/// Wraps a reporter and accumulates the counts carried by the final
/// `Complete` event.
pub struct EventSink<'a> {
    reporter: &'a mut dyn Reporter,
    pub warnings: usize,
    pub errors: usize,
    pub reminders: usize,
    pub recipes: usize,
    pub icons: usize,
}

impl<'a> EventSink<'a> {
    pub fn new(reporter: &'a mut dyn Reporter) -> Self {
        Self {
            reporter,
            warnings: 0,
            errors: 0,
            reminders: 0,
            recipes: 0,
            icons: 0,
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.emit(Event::Info {
            message: message.into(),
        });
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.emit(Event::Warning {
            message: message.into(),
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.emit(Event::Error {
            message: message.into(),
        });
    }

    pub fn reminder(&mut self, message: impl Into<String>) {
        self.emit(Event::Reminder {
            message: message.into(),
        });
    }

    pub fn recipe_created(&mut self, message: impl Into<String>, path: impl Into<String>) {
        self.emit(Event::RecipeCreated {
            message: message.into(),
            path: path.into(),
        });
    }

    pub fn icon_created(&mut self, message: impl Into<String>, path: impl Into<String>) {
        self.emit(Event::IconCreated {
            message: message.into(),
            path: path.into(),
        });
    }

    pub fn complete(&mut self, facts: BTreeMap<String, serde_json::Value>) -> RunSummary {
        let summary = RunSummary {
            recipes: self.recipes,
            icons: self.icons,
            warnings: self.warnings,
            errors: self.errors,
            reminders: self.reminders,
            facts,
        };
        self.emit(Event::Complete {
            summary: summary.clone(),
        });
        summary
    }

    fn emit(&mut self, event: Event) {
        match &event {
            Event::Warning { .. } => self.warnings += 1,
            Event::Error { .. } => self.errors += 1,
            Event::Reminder { .. } => self.reminders += 1,
            Event::RecipeCreated { .. } => self.recipes += 1,
            Event::IconCreated { .. } => self.icons += 1,
            Event::Info { .. } | Event::Complete { .. } => {}
        }
        self.reporter.report(&event);
    }
}
