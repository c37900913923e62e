/// Query, form and route parameters with case-insensitive keys.
///
/// Insertion order is kept and the first value written for a key wins, so a
/// later duplicate never overrides an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the pair unless the key is already present. Returns whether it was inserted.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains_key(&key) {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v.as_str())
    }

    /// Value for `key`, or the empty string when absent.
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Params {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive() {
        let mut params = Params::new();
        params.insert("Id", "42");

        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.get("ID"), Some("42"));
        assert_eq!(params.value("missing"), "");
    }

    #[test]
    fn first_value_wins() {
        let mut params = Params::new();
        params.extend([("a", "1"), ("b", "2"), ("A", "3")]);

        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a"), Some("1"));
    }
}
