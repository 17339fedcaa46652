use crate::resolve::{LookupOutcome, Resolution, ResolvedReference};

pub const NEEDS_PREFIX_MESSAGE: &str =
    "No default wiki is configured here; write the reference as [[prefix:Title]].";

/// `<site>: <title> → <url>`, with `⇒ <target>` inserted for redirects.
pub fn format_reference(reference: &ResolvedReference) -> String {
    match &reference.redirects_to {
        Some(target) => format!(
            "{}: {} ⇒ {} → {}",
            reference.wiki, reference.title, target, reference.url
        ),
        None => format!("{}: {} → {}", reference.wiki, reference.title, reference.url),
    }
}

/// One line per resolved candidate, in candidate order.
pub fn format_resolution(candidates: &[String], resolution: &Resolution) -> Vec<String> {
    candidates
        .iter()
        .filter_map(|candidate| resolution.get(candidate))
        .map(format_reference)
        .collect()
}

pub fn format_lookup(title: &str, outcome: &LookupOutcome) -> String {
    match outcome {
        LookupOutcome::Found(reference) => reference.url.clone(),
        LookupOutcome::NotFound => format!("Page not found: {title}"),
        LookupOutcome::NeedsPrefix => NEEDS_PREFIX_MESSAGE.to_string(),
    }
}
