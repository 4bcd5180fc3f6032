//! Prometheus text exposition format rendering.

use std::fmt::Write;

use crate::collector::MetricSample;

/// Content type of the rendered output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples in the Prometheus text format.
///
/// Samples are grouped by metric name in order of first appearance, and each
/// group gets one `# HELP` and `# TYPE` header. Within a group the samples
/// keep their relative order.
pub fn render(samples: &[MetricSample]) -> String {
    let mut output = String::with_capacity(samples.len() * 100);
    let mut groups: Vec<(&str, Vec<&MetricSample>)> = Vec::new();

    for sample in samples {
        match groups.iter_mut().find(|(name, _)| *name == sample.name) {
            Some((_, group)) => group.push(sample),
            None => groups.push((sample.name.as_str(), vec![sample])),
        }
    }

    for (name, group) in groups {
        let help = group
            .iter()
            .map(|s| s.help.as_str())
            .find(|h| !h.is_empty());
        if let Some(help) = help {
            writeln!(output, "# HELP {} {}", name, escape_help(help)).ok();
        }
        writeln!(output, "# TYPE {} gauge", name).ok();

        for sample in group {
            writeln!(
                output,
                "{}{} {}",
                sample.name,
                format_labels(&sample.labels),
                format_value(sample.value)
            )
            .ok();
        }
    }

    output
}

/// Whether `name` matches `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Whether `name` matches `[a-zA-Z_][a-zA-Z0-9_]*` and is not reserved.
pub fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape help text. Quotes are allowed unescaped here.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_groups_by_name() {
        let samples = vec![
            MetricSample::gauge("mastodon_num_statuses", "statuses per week", 12.0)
                .with_label("week", "100"),
            MetricSample::gauge("mastodon_num_statuses", "statuses per week", 8.0)
                .with_label("week", "200"),
            MetricSample::gauge("mastodon_up", "was the last query successful", 1.0),
        ];

        let output = render(&samples);

        assert_eq!(
            output,
            "# HELP mastodon_num_statuses statuses per week\n\
             # TYPE mastodon_num_statuses gauge\n\
             mastodon_num_statuses{week=\"100\"} 12\n\
             mastodon_num_statuses{week=\"200\"} 8\n\
             # HELP mastodon_up was the last query successful\n\
             # TYPE mastodon_up gauge\n\
             mastodon_up 1\n"
        );
    }

    #[test]
    fn test_render_merges_non_adjacent_samples() {
        let samples = vec![
            MetricSample::gauge("mastodon_a", "first", 1.0).with_label("k", "x"),
            MetricSample::gauge("mastodon_b", "second", 2.0),
            MetricSample::gauge("mastodon_a", "first", 3.0).with_label("k", "y"),
        ];

        let output = render(&samples);

        assert_eq!(output.matches("# TYPE mastodon_a gauge").count(), 1);
        assert_eq!(output.matches("# HELP mastodon_a first").count(), 1);
        assert_eq!(
            output,
            "# HELP mastodon_a first\n\
             # TYPE mastodon_a gauge\n\
             mastodon_a{k=\"x\"} 1\n\
             mastodon_a{k=\"y\"} 3\n\
             # HELP mastodon_b second\n\
             # TYPE mastodon_b gauge\n\
             mastodon_b 2\n"
        );
    }

    #[test]
    fn test_render_without_help() {
        let output = render(&[MetricSample::gauge("x", "", 0.0)]);
        assert_eq!(output, "# TYPE x gauge\nx 0\n");
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_escape_help() {
        assert_eq!(escape_help("a \"b\"\nc\\d"), "a \"b\"\\nc\\\\d");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(3.25), "3.25");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn test_metric_name_validity() {
        assert!(is_valid_metric_name("mastodon_up"));
        assert!(is_valid_metric_name("ns:sub_metric"));
        assert!(!is_valid_metric_name("9lives"));
        assert!(!is_valid_metric_name("has-dash"));
        assert!(!is_valid_metric_name(""));
    }

    #[test]
    fn test_label_name_validity() {
        assert!(is_valid_label_name("week"));
        assert!(!is_valid_label_name("__reserved"));
        assert!(!is_valid_label_name("a:b"));
        assert!(!is_valid_label_name(""));
    }
}
