//! Reporting: terminal tables for a finished (or aborted) run.

pub mod format;

pub use format::*;
