//! Namer: cluster-safe object names and label values.
//!
//! Every name is a pure function of the identity parts, so the same
//! evaluation always maps to the same objects and teardown can recompute
//! them without any lookup.

/// Upper bound for object names and label values.
pub const MAX_NAME_LENGTH: usize = 63;

/// Prefix shared by every object this runtime creates.
pub const NAME_PREFIX: &str = "eval-job-";

/// Suffix distinguishing the data object from its run object.
pub const DATA_OBJECT_SUFFIX: &str = "-spec";

/// Replacement for input that sanitizes to nothing.
const EMPTY_FALLBACK: &str = "x";

/// Lowercase `value`, collapse every run of characters outside
/// `[a-z0-9-]` into one hyphen, and trim hyphens at both ends.
///
/// Never fails: empty or fully invalid input becomes `"x"`.
pub fn sanitize_label(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for c in value.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        EMPTY_FALLBACK.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Compose `eval-job-<part>-<part>...<suffix>`, bounded to
/// [`MAX_NAME_LENGTH`]. The base is truncated and re-trimmed; the suffix is
/// kept whole.
pub fn build_name(parts: &[&str], suffix: &str) -> String {
    let sanitized: Vec<String> = parts.iter().map(|p| sanitize_label(p)).collect();
    let base = format!("{NAME_PREFIX}{}", sanitized.join("-"));

    let max_base = MAX_NAME_LENGTH.saturating_sub(suffix.len()).max(1);
    let base = truncate_trimmed(&base, max_base);

    let name = format!("{base}{suffix}");
    truncate_trimmed(&name, MAX_NAME_LENGTH).to_string()
}

/// Name of the run object (Job) for a benchmark.
pub fn job_name(job_id: &str, provider_id: &str, benchmark_id: &str) -> String {
    build_name(&[job_id, provider_id, benchmark_id], "")
}

/// Name of the data object (ConfigMap) for a benchmark.
pub fn config_map_name(job_id: &str, provider_id: &str, benchmark_id: &str) -> String {
    build_name(&[job_id, provider_id, benchmark_id], DATA_OBJECT_SUFFIX)
}

/// A sanitized label value, bounded to [`MAX_NAME_LENGTH`].
pub fn label_value(value: &str) -> String {
    truncate_trimmed(&sanitize_label(value), MAX_NAME_LENGTH).to_string()
}

/// Sanitized output is ASCII, so byte slicing lands on char boundaries.
fn truncate_trimmed(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    value[..max].trim_matches('-')
}
