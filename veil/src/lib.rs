//! VEIL: an interpreter for trigger-dispatched scripts embedded in HTML
//! documents.
//!
//! - [`script`]: the language (segmenter, block tracker, registry, handlers, expressions)
//! - [`pattern`]: trigger text → match patterns
//! - [`output`]: where console lines and body fragments go
//! - [`host`]: finding and running the scripts of a host document

pub mod cli;
pub mod config;
pub mod embedded;
pub mod error;
pub mod host;
pub mod logging;
pub mod output;
pub mod pattern;
pub mod script;
