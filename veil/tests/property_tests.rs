use std::path::Path;

use proptest::prelude::*;
use veil::output::BufferSink;
use veil::pattern::{mask_literals, TriggerPattern};
use veil::script::sanitize::escape_angle_brackets;
use veil::script::segment::{segment, template_open_after};
use veil::script::{Interpreter, Registry, Value};

/// The on-disk `functions/` directory must load cleanly and agree with the
/// embedded copy.
#[tokio::test]
async fn functions_dir_matches_embedded() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("functions");
    let (on_disk, errors) = Registry::load_dir(&dir).await;
    assert!(errors.is_empty(), "load errors: {errors:?}");

    let embedded = Registry::builtin();
    let disk_triggers: Vec<_> = on_disk.triggers().collect();
    let embedded_triggers: Vec<_> = embedded.triggers().collect();
    assert_eq!(disk_triggers, embedded_triggers);
    for f in on_disk.iter() {
        assert_eq!(embedded.get(f.trigger()).map(|e| e.kind), Some(f.kind));
    }
}

/// Number of unescaped backticks in `s`.
fn backticks(s: &str) -> usize {
    let mut n = 0;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '`' => n += 1,
            _ => {}
        }
    }
    n
}

proptest! {
    /// Segmenting arbitrary text never panics.
    #[test]
    fn segmenter_does_not_panic(s in "\\PC*") {
        let _ = segment(&s);
    }

    /// Running arbitrary text never panics.
    #[test]
    fn interpreter_does_not_panic(s in "[ -~\n]{0,200}") {
        let mut sink = BufferSink::new();
        let _ = Interpreter::with_builtins().run(&s, &mut sink);
    }

    /// Deep parenthesis and prefix-operator nesting is rejected, and the
    /// statement after it still runs.
    #[test]
    fn deep_nesting_does_not_overflow(
        depth in 65usize..6_000,
        prefix in prop::sample::select(vec!["(", "!", "-", "!(", "-("]),
    ) {
        let close = ")".repeat(depth * prefix.matches('(').count());
        let src = format!("print({}1{close});\nprint(`after`);", prefix.repeat(depth));
        let mut sink = BufferSink::new();
        let report = Interpreter::with_builtins().run(&src, &mut sink);
        prop_assert_eq!(sink.console, vec!["undefined".to_owned(), "after".to_owned()]);
        prop_assert_eq!(report.eval_failures, 1);
    }

    /// Lines made only of code and closed templates keep the parity of
    /// their backticks.
    #[test]
    fn statements_never_leave_templates_open(
        lines in prop::collection::vec("[a-z ;`\n]{0,12}", 0..8)
    ) {
        let src = lines.join("\n");
        let stmts = segment(&src);
        // Only the final statement can be left open, and only at end of input.
        for stmt in stmts.iter().take(stmts.len().saturating_sub(1)) {
            prop_assert!(!template_open_after(&stmt.text, false), "open: {:?}", stmt.text);
            prop_assert_eq!(backticks(&stmt.text) % 2, 0);
        }
    }

    /// Escaped output never contains raw angle brackets.
    #[test]
    fn sanitizer_removes_angle_brackets(s in "\\PC*") {
        let out = escape_angle_brackets(&s);
        prop_assert!(!out.contains('<') && !out.contains('>'));
    }

    /// Masking keeps byte length, so match offsets stay valid.
    #[test]
    fn masking_preserves_length(s in "\\PC*") {
        prop_assert_eq!(mask_literals(&s).len(), s.len());
    }

    /// A trigger quoted inside a string literal never matches.
    #[test]
    fn quoted_trigger_never_matches(inner in "[a-z (]{0,10}") {
        let pat = TriggerPattern::new("print(").unwrap();
        let stmt = format!("let s = \"{inner}print({inner}\";");
        prop_assert!(!pat.matches(&stmt));
    }

    /// Printing a declared number reproduces it.
    #[test]
    fn declared_numbers_print_back(n in -100_000i64..100_000) {
        let mut sink = BufferSink::new();
        let src = format!("let n: number = {n};\nprint(`${{n}}`);\nprint(n);");
        Interpreter::with_builtins().run(&src, &mut sink);
        let expected = Value::Number(n as f64).to_string();
        prop_assert_eq!(sink.console, vec![expected.clone(), expected]);
    }
}
