//! Finds `[[Title]]` and `[[Title|display]]` references in message text.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static WIKILINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\x00-\x1f<>\[\]|{}\x7f]+)(?:\|.*?)?\]\]").expect("valid wikilink pattern")
});

/// Unique candidate titles in `text`, in order of first occurrence.
#[cfg(test)]
fn extract_titles(text: &str) -> Vec<String> {
    extract_from_segments([text])
}

/// Unique candidate titles across the text segments of one message, in order
/// of first occurrence. A reference never spans two segments.
pub fn extract_from_segments<I, S>(segments: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut titles = Vec::new();
    for segment in segments {
        for captures in WIKILINK.captures_iter(segment.as_ref()) {
            let Some(title) = captures.get(1).map(|value| value.as_str().trim()) else {
                continue;
            };
            if title.is_empty() || !seen.insert(title.to_string()) {
                continue;
            }
            titles.push(title.to_string());
        }
    }
    titles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_and_piped_links() {
        assert_eq!(
            extract_titles("see [[Foo]] and [[Bar|baz]]"),
            vec!["Foo", "Bar"]
        );
    }

    #[test]
    fn only_first_pipe_segment_is_the_title() {
        assert_eq!(extract_titles("[[a|b|c]]"), vec!["a"]);
    }

    #[test]
    fn empty_and_unterminated_links_yield_nothing() {
        assert!(extract_titles("[[]]").is_empty());
        assert!(extract_titles("[[Foo").is_empty());
        assert!(extract_titles("[[   ]]").is_empty());
    }

    #[test]
    fn excluded_characters_break_a_reference() {
        assert!(extract_titles("[[Foo<b>]]").is_empty());
        assert!(extract_titles("[[Fo{o}]]").is_empty());
        assert!(extract_titles("[[Foo\nBar]]").is_empty());
        assert!(extract_titles("[[Foo\u{7f}]]").is_empty());
    }

    #[test]
    fn titles_are_trimmed_and_deduplicated() {
        assert_eq!(
            extract_titles("[[ Foo ]] [[Foo]] [[mgp:Foo:Bar]] [[Foo|again]]"),
            vec!["Foo", "mgp:Foo:Bar"]
        );
    }

    #[test]
    fn nested_brackets_pick_the_inner_reference() {
        assert_eq!(extract_titles("[[[Foo]]]"), vec!["Foo"]);
    }

    #[test]
    fn segments_are_scanned_independently() {
        let titles = extract_from_segments(["[[萌百:A]] text [[", "B]] [[C]]"]);
        assert_eq!(titles, vec!["萌百:A", "C"]);
    }
}
