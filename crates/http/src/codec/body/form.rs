//! Query string and `application/x-www-form-urlencoded` parsing.

use crate::protocol::Params;

/// Marker after which the rest of a query string is ignored.
const QUERY_CUT_TOKEN: &str = "__";

/// The query part of a request target: text after the first `?`, cut at the first `__`.
pub fn query_of(complete_path: &str) -> &str {
    let Some((_, query)) = complete_path.split_once('?') else {
        return "";
    };
    match query.find(QUERY_CUT_TOKEN) {
        Some(index) => &query[..index],
        None => query,
    }
}

/// Adds the `key=value` pairs of `input` to `params`.
///
/// Pairs without exactly one `=` are ignored, values are percent-decoded and the first
/// occurrence of a key wins.
pub fn parse_pairs(input: &str, params: &mut Params) {
    for pair in input.split('&') {
        if pair.split('=').count() != 2 {
            continue;
        }
        match serde_urlencoded::from_str::<Vec<(String, String)>>(pair) {
            Ok(decoded) => params.extend(decoded),
            Err(_) => {
                if let Some((key, value)) = pair.split_once('=') {
                    params.insert(key, value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_cut_at_token() {
        assert_eq!(query_of("/a?x=1&y=2"), "x=1&y=2");
        assert_eq!(query_of("/a?x=1__ignored=2"), "x=1");
        assert_eq!(query_of("/a"), "");
        assert_eq!(query_of("/a?"), "");
    }

    #[test]
    fn pairs() {
        let mut params = Params::new();
        parse_pairs("name=John%20Doe&flag&a=1=2&City=Paris&city=Rome&empty=", &mut params);

        assert_eq!(params.get("name"), Some("John Doe"));
        assert_eq!(params.get("CITY"), Some("Paris"));
        assert_eq!(params.get("empty"), Some(""));
        assert!(!params.contains_key("flag"));
        assert!(!params.contains_key("a"));
        assert_eq!(params.len(), 3);
    }
}
