use crate::outputs::OutputValue;

pub const SENSITIVE_PLACEHOLDER: &str = "(sensitive)";
pub const TRUNCATION_MARKER: &str = "...(truncated)";
pub const AGGREGATE_SEPARATOR: &str = ", ";

/// `name=value`, or `name=(sensitive)` for sensitive outputs.
pub fn render_pair(output: &OutputValue) -> String {
    if output.is_sensitive() {
        format!("{}={SENSITIVE_PLACEHOLDER}", output.name())
    } else {
        format!("{}={}", output.name(), output.expose_value())
    }
}

/// Value written to a directly mapped attribute. Sensitive outputs are
/// replaced entirely by their masked pair.
pub fn render_direct(output: &OutputValue) -> String {
    if output.is_sensitive() {
        render_pair(output)
    } else {
        output.expose_value().to_string()
    }
}

pub fn render_aggregate<'a>(outputs: impl IntoIterator<Item = &'a OutputValue>) -> String {
    outputs
        .into_iter()
        .map(render_pair)
        .collect::<Vec<_>>()
        .join(AGGREGATE_SEPARATOR)
}

/// Cuts `value` to at most `max_chars` characters including the marker.
/// A limit shorter than the marker keeps only the marker's head.
/// Returns `None` when the value already fits.
pub fn truncate_to_limit(value: &str, max_chars: usize) -> Option<String> {
    if value.chars().count() <= max_chars {
        return None;
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    let keep = max_chars.saturating_sub(marker_len);
    let truncated = value
        .chars()
        .take(keep)
        .chain(TRUNCATION_MARKER.chars())
        .take(max_chars)
        .collect::<String>();
    Some(truncated)
}
