//! Fact-gathering and recipe-synthesis engine for package automation
//! recipes.
//!
//! The pipeline classifies an input (app bundle, archive, appcast URL,
//! hosting-site URL, or direct download URL), drives a chain of inspectors
//! over a shared fact store until no new facts appear, then renders one
//! recipe per requested type from the gathered facts.

pub mod classify;
pub mod cli;
pub mod events;
pub mod facts;
pub mod inspectors;
pub mod io;
pub mod pipeline;
pub mod recipes;
pub mod synth;
pub mod templates;
pub mod tool;
pub mod util;
