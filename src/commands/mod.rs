//! Command implementations
//!
//! `register` runs before the export when `--ask-phones` is given;
//! `export` is the main run.

pub mod export;
pub mod register;

pub use export::{ExportSummary, Exporter, SessionReport};
pub use register::run as register_run;
