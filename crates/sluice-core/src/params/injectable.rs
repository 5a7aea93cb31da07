use std::collections::BTreeMap;

use super::{ParameterSet, ParameterSource};

/// Values a chained handler injects into the request it forwards.
///
/// Injected values shadow every other source for the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectableParams {
    values: BTreeMap<String, Vec<String>>,
}

impl InjectableParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to a single value, replacing previous values.
    pub fn put(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.values.insert(key.into(), vec![value.to_string()]);
        self
    }

    /// Sets `key` to several values, replacing previous values.
    pub fn put_all<I>(&mut self, key: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        self.values
            .insert(key.into(), values.into_iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Converts the values into a set tagged [`ParameterSource::Injected`].
    pub fn into_set(self) -> ParameterSet {
        ParameterSet::new(ParameterSource::Injected, self.values)
    }
}
