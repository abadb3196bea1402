//! Campaign parameter extraction.

use stonks_core_types::{UtmParams, UtmValue};
use url::form_urlencoded;

pub const UTM_KEYS: [&str; 5] = [
    "utm_campaign",
    "utm_source",
    "utm_medium",
    "utm_term",
    "utm_content",
];

/// Pulls the recognised `utm_*` keys out of a query string (with or without
/// the leading `?`). A key seen once maps to a string, repeated keys to the
/// ordered list of values.
pub fn parse_utm_params(search: &str) -> UtmParams {
    let query = search.strip_prefix('?').unwrap_or(search);
    let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    let mut utm = UtmParams::new();
    for key in UTM_KEYS {
        let mut values: Vec<String> = pairs
            .iter()
            .filter(|(name, _)| name == key)
            .map(|(_, value)| value.clone())
            .collect();
        match values.len() {
            0 => {}
            1 => {
                utm.insert(key.to_string(), UtmValue::One(values.remove(0)));
            }
            _ => {
                utm.insert(key.to_string(), UtmValue::Many(values));
            }
        }
    }
    utm
}
