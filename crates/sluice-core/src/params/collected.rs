use std::borrow::Cow;
use std::collections::BTreeMap;

use super::{ParameterSet, ParameterSource};

/// Parameters merged from several [`ParameterSet`]s, indexed by key and then
/// by source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedParameters {
    mappings: BTreeMap<String, BTreeMap<ParameterSource, Vec<String>>>,
}

impl CollectedParameters {
    /// Merges the given sets. A later set for the same source replaces the
    /// earlier one key by key.
    pub fn collect<'a, I>(sets: I) -> Self
    where
        I: IntoIterator<Item = &'a ParameterSet>,
    {
        let mut mappings: BTreeMap<String, BTreeMap<ParameterSource, Vec<String>>> =
            BTreeMap::new();
        for set in sets {
            for (key, values) in set.as_map() {
                mappings
                    .entry(key.clone())
                    .or_default()
                    .insert(set.source(), values.clone());
            }
        }
        Self { mappings }
    }

    fn injected(&self, key: &str) -> Option<&[String]> {
        self.mappings
            .get(key)?
            .get(&ParameterSource::Injected)
            .map(Vec::as_slice)
    }

    /// Returns `true` if `key` is visible from `source`.
    ///
    /// Injected values make a key visible from every source.
    pub fn contains(&self, key: &str, source: ParameterSource) -> bool {
        match self.mappings.get(key) {
            None => false,
            Some(_) if source == ParameterSource::Any => true,
            Some(by_source) => {
                by_source.contains_key(&ParameterSource::Injected) || by_source.contains_key(&source)
            }
        }
    }

    /// Returns the values of `key` as seen from `source`.
    ///
    /// Injected values shadow every source. Otherwise `Any` concatenates
    /// path, query and body values in that order, without deduplication.
    pub fn values(&self, key: &str, source: ParameterSource) -> Option<Cow<'_, [String]>> {
        if let Some(injected) = self.injected(key) {
            return Some(Cow::Borrowed(injected));
        }

        let by_source = self.mappings.get(key)?;
        if source != ParameterSource::Any {
            return by_source.get(&source).map(|v| Cow::Borrowed(v.as_slice()));
        }

        let mut present = by_source.values();
        match (present.next(), present.next()) {
            (None, _) => None,
            (Some(only), None) => Some(Cow::Borrowed(only.as_slice())),
            (Some(first), Some(second)) => {
                let mut all = first.clone();
                all.extend(second.iter().cloned());
                present.for_each(|rest| all.extend(rest.iter().cloned()));
                Some(Cow::Owned(all))
            }
        }
    }

    /// Returns the first value of `key` as seen from `source`.
    pub fn first(&self, key: &str, source: ParameterSource) -> Option<&str> {
        if let Some(injected) = self.injected(key) {
            return injected.first().map(String::as_str);
        }

        let by_source = self.mappings.get(key)?;
        if source == ParameterSource::Any {
            by_source.values().flatten().next().map(String::as_str)
        } else {
            by_source.get(&source)?.first().map(String::as_str)
        }
    }

    /// Returns every key with the values of all its sources concatenated.
    pub fn merged(&self) -> BTreeMap<String, Vec<String>> {
        self.mappings
            .iter()
            .map(|(key, by_source)| (key.clone(), by_source.values().flatten().cloned().collect()))
            .collect()
    }

    /// Returns all known keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(source: ParameterSource, pairs: &[(&str, &str)]) -> ParameterSet {
        ParameterSet::from_pairs(source, pairs.iter().copied())
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_any_concatenates_in_source_order() {
        let body = set(ParameterSource::Body, &[("id", "3")]);
        let path = set(ParameterSource::Path, &[("id", "1")]);
        let query = set(ParameterSource::Query, &[("id", "2"), ("id", "2")]);
        let collected = CollectedParameters::collect([&body, &path, &query]);

        let values = collected.values("id", ParameterSource::Any).unwrap();
        assert_eq!(values.as_ref(), strings(&["1", "2", "2", "3"]).as_slice());
        assert_eq!(collected.first("id", ParameterSource::Any), Some("1"));
    }

    #[test]
    fn test_injected_shadows_any_and_scoped() {
        let path = set(ParameterSource::Path, &[("id", "1")]);
        let query = set(ParameterSource::Query, &[("id", "2")]);
        let injected = set(ParameterSource::Injected, &[("id", "3")]);
        let collected = CollectedParameters::collect([&path, &query, &injected]);

        for source in [ParameterSource::Any, ParameterSource::Path, ParameterSource::Query] {
            let values = collected.values("id", source).unwrap();
            assert_eq!(values.as_ref(), strings(&["3"]).as_slice());
            assert_eq!(collected.first("id", source), Some("3"));
        }
    }

    #[test]
    fn test_injected_makes_key_visible_from_every_source() {
        let path = set(ParameterSource::Path, &[("id", "1")]);
        let injected = set(ParameterSource::Injected, &[("token", "abc")]);
        let collected = CollectedParameters::collect([&path, &injected]);

        assert!(collected.contains("token", ParameterSource::Body));
        assert!(collected.contains("id", ParameterSource::Path));
        assert!(!collected.contains("id", ParameterSource::Query));
        assert!(collected.contains("id", ParameterSource::Any));
        assert!(!collected.contains("missing", ParameterSource::Any));
    }

    #[test]
    fn test_scoped_lookup_ignores_other_sources() {
        let path = set(ParameterSource::Path, &[("id", "1")]);
        let collected = CollectedParameters::collect([&path]);
        assert!(collected.values("id", ParameterSource::Query).is_none());
        assert!(collected.first("id", ParameterSource::Body).is_none());
    }

    #[test]
    fn test_merged_includes_every_source() {
        let path = set(ParameterSource::Path, &[("id", "1")]);
        let query = set(ParameterSource::Query, &[("id", "2"), ("q", "x")]);
        let merged = CollectedParameters::collect([&path, &query]).merged();
        assert_eq!(merged["id"], strings(&["1", "2"]));
        assert_eq!(merged["q"], strings(&["x"]));
    }
}
