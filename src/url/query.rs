/// Ordered query parameters of a [`ParsedUrl`](super::ParsedUrl)
///
/// Keys keep their case and order. Duplicate keys are all retained;
/// [`get`](Self::get) resolves them last-wins while
/// [`get_all`](Self::get_all) exposes every value for handlers that accept
/// repeated arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Last value for `key` (exact match)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, in URL order
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Last value for `key`, ignoring ASCII case
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Value of the first alias in `keys` that is present and non-empty.
    ///
    /// Alias lists are ordered by precedence, e.g. `["pass", "password"]`.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.get_ignore_case(key))
            .find(|value| !value.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Entries whose key starts with `prefix`, with the prefix stripped.
    ///
    /// Used for the `+header=`, `-param=` and `:field=` argument families.
    pub fn prefixed(&self, prefix: char) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().filter_map(move |(k, v)| {
            k.strip_prefix(prefix)
                .filter(|rest| !rest.is_empty())
                .map(|rest| (rest, v.as_str()))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryParams {
        [
            ("to", "alpha"),
            ("Format", "html"),
            ("to", "beta"),
            ("+X-Token", "abc"),
            (":message", "text"),
            ("pass", ""),
            ("password", "pw2"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_last_wins() {
        let query = sample();
        assert_eq!(query.get("to"), Some("beta"));
        assert_eq!(query.get_all("to"), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_case_handling() {
        let query = sample();
        assert_eq!(query.get("format"), None);
        assert_eq!(query.get_ignore_case("format"), Some("html"));
    }

    #[test]
    fn test_first_of_skips_empty_values() {
        let query = sample();
        assert_eq!(query.first_of(&["pass", "password"]), Some("pw2"));
        assert_eq!(query.first_of(&["missing"]), None);
    }

    #[test]
    fn test_prefixed_families() {
        let query = sample();
        let headers: Vec<_> = query.prefixed('+').collect();
        assert_eq!(headers, vec![("X-Token", "abc")]);

        let extras: Vec<_> = query.prefixed(':').collect();
        assert_eq!(extras, vec![("message", "text")]);

        assert_eq!(query.prefixed('-').count(), 0);
    }
}
