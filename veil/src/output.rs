//! Output sinks for script runs.
//!
//! A run produces two streams: console lines (`print`, `printS`) and
//! fragments appended to the host document's body (`appendToBody`,
//! `dump`).  Where they end up is up to the [`OutputSink`]:
//! - [`StdSink`]: console to stdout, body collected and written on finish
//! - [`BufferSink`]: both captured in memory for tests and embedding

use std::io::{self, Write};

/// Destination for everything a script run emits.
pub trait OutputSink {
    /// Write one console line.
    fn console(&mut self, line: &str);

    /// Append a fragment to the document body.
    fn append_to_body(&mut self, html: &str);
}

/// Sink that captures both channels in memory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferSink {
    pub console: Vec<String>,
    pub body: Vec<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The body fragments joined in append order.
    pub fn body_html(&self) -> String {
        self.body.concat()
    }

    /// Clear captured output.
    pub fn clear(&mut self) {
        self.console.clear();
        self.body.clear();
    }
}

impl OutputSink for BufferSink {
    fn console(&mut self, line: &str) {
        self.console.push(line.to_owned());
    }

    fn append_to_body(&mut self, html: &str) {
        self.body.push(html.to_owned());
    }
}

/// Sink that prints console lines as they arrive and keeps the body.
///
/// Body fragments are only written by [`StdSink::finish`], after every
/// script of a document has run.
pub struct StdSink<W: Write = io::Stdout> {
    out: W,
    body: Vec<String>,
}

impl StdSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> StdSink<W> {
    pub fn new(out: W) -> Self {
        StdSink {
            out,
            body: Vec::new(),
        }
    }

    /// Body fragments appended so far.
    pub fn body(&self) -> &[String] {
        &self.body
    }

    /// Write the collected body as a minimal HTML document to `dest`.
    pub fn finish(self, dest: &mut dyn Write) -> io::Result<()> {
        writeln!(dest, "<!DOCTYPE html>")?;
        writeln!(dest, "<html><body>")?;
        for fragment in &self.body {
            writeln!(dest, "{fragment}")?;
        }
        writeln!(dest, "</body></html>")?;
        dest.flush()
    }

    /// Consume the sink, returning the console writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> OutputSink for StdSink<W> {
    fn console(&mut self, line: &str) {
        // A closed stdout is not worth aborting the run over.
        let _ = writeln!(self.out, "{line}");
    }

    fn append_to_body(&mut self, html: &str) {
        self.body.push(html.to_owned());
    }
}
