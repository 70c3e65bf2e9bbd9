//! Terminal rendering for runtally summaries.
//!
//! The core emits summary lines as `${TAG}` markup template strings and
//! leaves all color handling here: [`render_markup`] resolves the tags,
//! [`ConsoleUi`] is the [`TerminalSink`](runtally_core::TerminalSink)
//! that writes rendered lines to stdout and stderr.

pub mod markup;
pub mod ui;

pub use markup::{rainbow, render_markup};
pub use ui::ConsoleUi;
