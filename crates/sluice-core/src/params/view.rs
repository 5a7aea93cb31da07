use std::borrow::Cow;
use std::collections::BTreeMap;
use std::str::FromStr;

use serde::de::DeserializeOwned;

use super::map::is_truthy;
use super::{CollectedParameters, FromParam, ParamMap, ParameterSource};

/// Read-only lookups over [`CollectedParameters`] from one source.
///
/// Typed accessors read the first raw value. Failed conversions yield `None`
/// rather than an error.
#[derive(Debug, Clone, Copy)]
pub struct Parameters<'a> {
    collected: &'a CollectedParameters,
    source: ParameterSource,
}

impl<'a> Parameters<'a> {
    pub fn new(collected: &'a CollectedParameters, source: ParameterSource) -> Self {
        Self { collected, source }
    }

    pub fn source(&self) -> ParameterSource {
        self.source
    }

    /// Returns `true` if the key is present, even with no usable value.
    pub fn has(&self, key: &str) -> bool {
        self.collected.contains(key, self.source)
    }

    /// Returns `true` if the key has at least one non-empty value.
    pub fn has_value(&self, key: &str) -> bool {
        self.raw(key)
            .is_some_and(|values| values.iter().any(|v| !v.is_empty()))
    }

    /// Returns every raw value for the key.
    pub fn raw(&self, key: &str) -> Option<Cow<'a, [String]>> {
        self.collected.values(key, self.source)
    }

    /// Returns the first raw value.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.collected.first(key, self.source)
    }

    pub fn get_as<T: FromParam>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(T::from_param)
    }

    pub fn get_or<T: FromParam>(&self, key: &str, default: T) -> T {
        self.get_as(key).unwrap_or(default)
    }

    /// Converts the first value with `transform`.
    pub fn get_with<T, F>(&self, key: &str, transform: F) -> Option<T>
    where
        F: FnOnce(&str) -> Option<T>,
    {
        self.get(key).and_then(transform)
    }

    /// Parses the first value with [`FromStr`], for enums and other types
    /// that are not [`FromParam`].
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Converts every value, dropping those that fail.
    pub fn list<T: FromParam>(&self, key: &str) -> Vec<T> {
        self.raw(key)
            .map(|values| values.iter().filter_map(|v| T::from_param(v)).collect())
            .unwrap_or_default()
    }

    /// Converts every value, keeping failures as `None` in their position.
    pub fn list_keep<T: FromParam>(&self, key: &str) -> Vec<Option<T>> {
        self.raw(key)
            .map(|values| values.iter().map(|v| T::from_param(v)).collect())
            .unwrap_or_default()
    }

    /// Reads `key[k]=v` style parameters as a map.
    pub fn map(&self, key: &str) -> ParamMap {
        self.raw(key)
            .map(|values| ParamMap::from_alternating(&values))
            .unwrap_or_default()
    }

    /// `false` when absent, `"false"` or `"0"`; `true` for anything else.
    pub fn truthy(&self, key: &str) -> bool {
        self.get(key).is_some_and(is_truthy)
    }

    /// Parses the first value as a JSON document.
    pub fn json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        serde_json::from_str(self.get(key)?).ok()
    }

    /// Parses the first value as a JSON array, or returns an empty list.
    pub fn json_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.get(key)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    /// Returns every key visible from this source with its values.
    pub fn raw_values(&self) -> BTreeMap<String, Vec<String>> {
        self.collected
            .keys()
            .filter_map(|key| {
                self.raw(key)
                    .map(|values| (key.to_string(), values.into_owned()))
            })
            .collect()
    }
}
