//! Prometheus text exposition format.
//!
//! Renders gauge samples into the Prometheus text exposition format for
//! scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use crate::collector::GaugeSample;

const METRIC: &str = "scanner_event_info";

/// Render gauge samples as a single `scanner_event_info` gauge family.
pub fn render_prometheus(samples: &[GaugeSample]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# HELP {METRIC} Scanner events.");
    let _ = writeln!(out, "# TYPE {METRIC} gauge");
    for s in samples {
        let _ = writeln!(
            out,
            "{METRIC}{{service_id=\"{}\",url=\"{}\",directory=\"{}\"}} {}",
            escape_label(&s.service_id),
            escape_label(&s.url),
            escape_label(&s.directory),
            s.value
        );
    }

    out
}

/// Escape a label value: backslash, double quote and newline.
fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
