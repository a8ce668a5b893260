use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use veil::cli::Cli;
use veil::config::{Config, Input};
use veil::host::{run_document, run_scripts};
use veil::logging;
use veil::output::StdSink;
use veil::script::Interpreter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_cli(Cli::parse()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("veil: {e}");
            return ExitCode::from(2);
        }
    };
    logging::init(&config.log_spec);

    // ── Load functions (the only suspension point before running) ────────────
    let (registry, load_errors) = config.load_registry().await;
    if registry.is_empty() {
        error!("no functions loaded; only bare expressions will run");
    }
    let interp = Interpreter::new(Arc::new(registry));

    // ── Run ───────────────────────────────────────────────────────────────────
    let mut sink = StdSink::stdout();
    let report = match &config.input {
        Input::Scripts(paths) => run_scripts(paths, &interp, &mut sink).await,
        Input::Document(path) => match run_document(path, &interp, &mut sink).await {
            Ok(r) => r,
            Err(e) => {
                eprintln!("veil: {e}");
                return ExitCode::FAILURE;
            }
        },
    };
    info!(?report, load_errors = load_errors.len(), "done");

    // ── Write the document body ───────────────────────────────────────────────
    let document_mode = matches!(config.input, Input::Document(_));
    if document_mode || !sink.body().is_empty() || config.body_out.is_some() {
        let mut doc = Vec::new();
        let written = match sink.finish(&mut doc) {
            Ok(()) => match &config.body_out {
                Some(path) => tokio::fs::write(path, &doc).await,
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&doc)
                }
            },
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            eprintln!("veil: cannot write document body: {e}");
            return ExitCode::FAILURE;
        }
    }

    if report.load_failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
