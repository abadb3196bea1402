//! Parser for the `data-s:event-props` attribute.
//!
//! The format is a lenient list of `key:value` entries separated by `;`, for
//! example `plan:pro; seats:5`. Whitespace around keys and values is trimmed,
//! the value may itself contain `:` (only the first one splits), and entries
//! without a separator or with an empty key are skipped.

use stonks_core_types::Props;

const ENTRY_SEPARATOR: char = ';';
const KEY_SEPARATOR: char = ':';

pub fn parse_props(raw: &str) -> Props {
    let mut props = Props::new();
    for entry in raw.split(ENTRY_SEPARATOR) {
        let Some((key, value)) = entry.split_once(KEY_SEPARATOR) else {
            if !entry.trim().is_empty() {
                tracing::debug!(entry = entry.trim(), "skipping malformed props entry");
            }
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        props.insert(key.to_string(), value.trim().to_string());
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn props(pairs: &[(&str, &str)]) -> Props {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_flat_pairs() {
        assert_eq!(
            parse_props("plan:pro; seats : 5"),
            props(&[("plan", "pro"), ("seats", "5")])
        );
    }

    #[test]
    fn value_keeps_inner_colons() {
        assert_eq!(
            parse_props("target:https://example.com/x"),
            props(&[("target", "https://example.com/x")])
        );
    }

    #[test]
    fn malformed_entries_are_skipped() {
        assert_eq!(
            parse_props("broken;:novalue;;ok:1;"),
            props(&[("ok", "1")])
        );
        assert!(parse_props("").is_empty());
    }

    #[test]
    fn later_duplicates_win() {
        assert_eq!(parse_props("a:1;a:2"), props(&[("a", "2")]));
    }
}
