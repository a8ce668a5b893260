//! Host document embedding.
//!
//! A host page pulls VEIL scripts in with
//! `<script type="text/veil" src="…"></script>`.  [`discover_scripts`] finds
//! those references in document order and [`run_document`] loads and runs
//! each one, every script in a fresh run context.  All output goes to the
//! one sink, so body fragments from every script end up in the same page.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::LoadError;
use crate::output::OutputSink;
use crate::script::{Interpreter, RunReport};

/// MIME type marking a VEIL script element.
pub const SCRIPT_TYPE: &str = "text/veil";

fn script_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<script\b([^>]*)>").expect("script tag regex"))
}

fn attribute() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b([a-z][a-z0-9_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("attribute regex")
    })
}

/// The `src` of every VEIL script element in `html`, in document order.
///
/// Elements without a `src` are ignored.
pub fn discover_scripts(html: &str) -> Vec<String> {
    script_tag()
        .captures_iter(html)
        .filter_map(|tag| {
            let attrs = tag.get(1)?.as_str();
            let mut ty = None;
            let mut src = None;
            for a in attribute().captures_iter(attrs) {
                let value = a
                    .get(2)
                    .or_else(|| a.get(3))
                    .or_else(|| a.get(4))
                    .map(|m| m.as_str().trim());
                match a[1].to_ascii_lowercase().as_str() {
                    "type" => ty = value,
                    "src" => src = value,
                    _ => {}
                }
            }
            let is_veil = ty.is_some_and(|t| t.eq_ignore_ascii_case(SCRIPT_TYPE));
            match src {
                Some(s) if is_veil && !s.is_empty() => Some(s.to_owned()),
                _ => None,
            }
        })
        .collect()
}

/// Outcome of running a set of scripts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostReport {
    /// Scripts that loaded and ran.
    pub scripts: usize,
    /// Scripts that could not be read.
    pub load_failures: usize,
    /// Counters summed over every run.
    pub run: RunReport,
}

/// Load and run each script in turn.
///
/// A script that cannot be read is logged and skipped.
pub async fn run_scripts(
    paths: &[PathBuf],
    interp: &Interpreter,
    sink: &mut dyn OutputSink,
) -> HostReport {
    let mut report = HostReport::default();
    for path in paths {
        match tokio::fs::read_to_string(path).await {
            Ok(src) => {
                info!(script = %path.display(), "running");
                let run = interp.run(&src, sink);
                report.run.merge(&run);
                report.scripts += 1;
            }
            Err(source) => {
                let e = LoadError::Read { path: path.clone(), source };
                warn!("skipping script: {e}");
                report.load_failures += 1;
            }
        }
    }
    report
}

/// Run every VEIL script referenced by the document at `path`.
///
/// Script references resolve relative to the document's directory.  Only a
/// failure to read the document itself is returned as an error.
pub async fn run_document(
    path: &Path,
    interp: &Interpreter,
    sink: &mut dyn OutputSink,
) -> Result<HostReport, LoadError> {
    let html = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::Read { path: path.to_path_buf(), source })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let scripts: Vec<PathBuf> = discover_scripts(&html)
        .iter()
        .map(|src| base.join(src))
        .collect();
    info!(document = %path.display(), scripts = scripts.len(), "document loaded");
    Ok(run_scripts(&scripts, interp, sink).await)
}
