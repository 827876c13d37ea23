//! Building the enumeration space a crawl walks over.

use sha2::{Digest, Sha256};

use crate::task::CrawlTask;

/// Cleans a filter option label: trims it and strips a trailing "only"
/// marker. Returns `None` for labels that end up empty.
pub fn normalize_filter_label(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_only = match trimmed.len().checked_sub(4) {
        Some(split)
            if trimmed.is_char_boundary(split)
                && trimmed[split..].eq_ignore_ascii_case("only")
                && trimmed[..split].chars().last().map_or(true, char::is_whitespace) =>
        {
            trimmed[..split].trim_end()
        }
        _ => trimmed,
    };
    let label = without_only.trim();
    (!label.is_empty()).then(|| label.to_string())
}

/// Case-insensitive, whitespace-insensitive label comparison.
pub fn labels_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// One filter task per distinct, non-empty label in `section`.
pub fn filter_tasks<I, S>(section: &str, labels: I) -> Vec<CrawlTask>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: Vec<String> = Vec::new();
    for label in labels {
        if let Some(label) = normalize_filter_label(label.as_ref()) {
            if !seen.iter().any(|existing| labels_match(existing, &label)) {
                seen.push(label);
            }
        }
    }
    seen.into_iter()
        .map(|value| CrawlTask::filter(section, value))
        .collect()
}

/// Highest page number among a pagination control's labels, if any.
pub fn highest_page_number<I, S>(labels: I) -> Option<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .filter_map(|label| label.as_ref().trim().parse::<usize>().ok())
        .filter(|page| *page > 0)
        .max()
}

/// Page tasks `1..=count`, limited by the operator cap.
pub fn page_tasks(count: usize, cap: Option<usize>) -> Vec<CrawlTask> {
    let count = count.max(1);
    let last = cap.map_or(count, |cap| count.min(cap));
    (1..=last).map(CrawlTask::page).collect()
}

/// Fingerprint of a page body, used to spot listings that repeat themselves.
pub fn content_fingerprint(body: &str) -> String {
    let normalized: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    hex::encode(Sha256::digest(normalized.as_bytes()))
}
