//! Terminal support desk.
//!
//! Wires the ticket session to concrete adapters: the Postgres record store,
//! the classifier's HTTP endpoint as the classification trigger, a
//! plain-text renderer for the desk view, and line-by-line ticket entry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod input;
pub mod render;
pub mod trigger;

pub use config::Config;
pub use input::{run_input, submit_line};
pub use render::render;
pub use trigger::HttpClassificationTrigger;
