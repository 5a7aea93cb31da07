use super::FromParam;

/// String map built from alternating key/value entries, as produced by
/// `name[key]=value` parameters.
///
/// Insertion order is kept and a repeated key overwrites the earlier value in
/// place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMap {
    entries: Vec<(String, String)>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from `[k1, v1, k2, v2, ...]`. A trailing key without a
    /// value is ignored.
    pub fn from_alternating(values: &[String]) -> Self {
        let mut map = Self::new();
        for pair in values.chunks_exact(2) {
            map.insert(pair[0].clone(), pair[1].clone());
        }
        map
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_as<T: FromParam>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(T::from_param)
    }

    /// Returns `false` for absent keys, `"false"` and `"0"`, `true` otherwise.
    pub fn truthy(&self, key: &str) -> bool {
        self.get(key).is_some_and(is_truthy)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the keys from `required` that are absent, in the given order.
    pub fn missing_keys<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|key| !self.contains_key(key))
            .collect()
    }

    pub fn has_required_keys(&self, required: &[&str]) -> bool {
        required.iter().all(|key| self.contains_key(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn is_truthy(value: &str) -> bool {
    !value.eq_ignore_ascii_case("false") && value != "0"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_from_alternating_keeps_order_and_overwrites() {
        let map = ParamMap::from_alternating(&strings(&["b", "1", "a", "2", "b", "3", "dangling"]));
        let entries: Vec<_> = map.iter().collect();
        assert_eq!(entries, vec![("b", "3"), ("a", "2")]);
    }

    #[test]
    fn test_typed_access() {
        let map = ParamMap::from_alternating(&strings(&["n", "5", "on", "1", "off", "0"]));
        assert_eq!(map.get_as::<u32>("n"), Some(5));
        assert_eq!(map.get_as::<u32>("missing"), None);
        assert!(map.truthy("on"));
        assert!(!map.truthy("off"));
        assert!(!map.truthy("missing"));
    }

    #[test]
    fn test_required_keys() {
        let map = ParamMap::from_alternating(&strings(&["a", "1"]));
        assert!(map.has_required_keys(&["a"]));
        assert!(!map.has_required_keys(&["a", "b"]));
        assert_eq!(map.missing_keys(&["b", "a", "c"]), vec!["b", "c"]);
    }
}
