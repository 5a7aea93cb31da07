use std::collections::BTreeMap;

use super::{CollectedParameters, InjectableParams, ParameterSet, ParameterSource, Parameters};

/// The request's parameter sources, merged into one queryable surface.
#[derive(Debug, Clone)]
pub struct ParameterResolver {
    sources: Vec<ParameterSet>,
    injected: Option<ParameterSet>,
    collected: CollectedParameters,
}

impl ParameterResolver {
    /// Merges path captures, query pairs and an optional form body.
    pub fn new(path: ParameterSet, query: ParameterSet, body: Option<ParameterSet>) -> Self {
        let mut sources = vec![path, query];
        sources.extend(body);
        Self::from_sets(sources)
    }

    /// Merges arbitrary sets. Injected sets are kept apart so later
    /// injections can merge into them.
    pub fn from_sets<I>(sets: I) -> Self
    where
        I: IntoIterator<Item = ParameterSet>,
    {
        let mut sources = Vec::new();
        let mut injected: Option<ParameterSet> = None;
        for set in sets {
            if set.source() == ParameterSource::Injected {
                match injected.as_mut() {
                    Some(existing) => existing.extend(set),
                    None => injected = Some(set),
                }
            } else {
                sources.push(set);
            }
        }

        let mut resolver = Self {
            sources,
            injected,
            collected: CollectedParameters::default(),
        };
        resolver.rebuild();
        resolver
    }

    /// Adds injected values and rebuilds the merged view.
    ///
    /// Values for a key injected earlier are replaced, other injected keys
    /// are kept.
    pub fn inject(&mut self, params: InjectableParams) {
        if params.is_empty() {
            return;
        }
        let set = params.into_set();
        match self.injected.as_mut() {
            Some(existing) => existing.extend(set),
            None => self.injected = Some(set),
        }
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.collected = CollectedParameters::collect(self.sources.iter().chain(&self.injected));
    }

    /// Returns a lookup view scoped to `source`.
    pub fn view(&self, source: ParameterSource) -> Parameters<'_> {
        Parameters::new(&self.collected, source)
    }

    /// Returns the raw map of one source, or the merged map for `Any`.
    ///
    /// The `Injected` map is empty unless something was injected.
    pub fn raw_values(&self, source: ParameterSource) -> BTreeMap<String, Vec<String>> {
        if source == ParameterSource::Any {
            return self.collected.merged();
        }
        self.sources
            .iter()
            .chain(&self.injected)
            .filter(|set| set.source() == source)
            .flat_map(|set| set.as_map().iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    pub fn collected(&self) -> &CollectedParameters {
        &self.collected
    }
}

impl Default for ParameterResolver {
    fn default() -> Self {
        Self::from_sets(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ParameterResolver {
        ParameterResolver::new(
            ParameterSet::from_pairs(ParameterSource::Path, [("id", "1")]),
            ParameterSet::from_pairs(ParameterSource::Query, [("id", "2"), ("q", "term")]),
            Some(ParameterSet::from_pairs(ParameterSource::Body, [("name", "x")])),
        )
    }

    #[test]
    fn test_injection_shadows_every_view() {
        let mut resolver = resolver();
        assert_eq!(resolver.view(ParameterSource::Any).get("id"), Some("1"));

        let mut injected = InjectableParams::new();
        injected.put("id", 3);
        resolver.inject(injected);

        for source in [ParameterSource::Any, ParameterSource::Path, ParameterSource::Query] {
            let view = resolver.view(source);
            assert_eq!(view.get("id"), Some("3"));
            assert_eq!(view.raw("id").unwrap().as_ref(), &["3".to_string()][..]);
        }
    }

    #[test]
    fn test_injections_merge() {
        let mut resolver = resolver();
        let mut first = InjectableParams::new();
        first.put("user", "alice").put("role", "admin");
        resolver.inject(first);

        let mut second = InjectableParams::new();
        second.put("user", "bob");
        resolver.inject(second);

        let view = resolver.view(ParameterSource::Any);
        assert_eq!(view.get("user"), Some("bob"));
        assert_eq!(view.get("role"), Some("admin"));
    }

    #[test]
    fn test_raw_values_per_source() {
        let resolver = resolver();
        let query = resolver.raw_values(ParameterSource::Query);
        assert_eq!(query.len(), 2);
        assert!(resolver.raw_values(ParameterSource::Injected).is_empty());

        let merged = resolver.raw_values(ParameterSource::Any);
        assert_eq!(merged["id"], vec!["1".to_string(), "2".to_string()]);
        assert_eq!(merged["name"], vec!["x".to_string()]);
    }

    #[test]
    fn test_missing_body_set_means_no_body_values() {
        let resolver = ParameterResolver::new(
            ParameterSet::empty(ParameterSource::Path),
            ParameterSet::empty(ParameterSource::Query),
            None,
        );
        assert!(!resolver.view(ParameterSource::Body).has("bar"));
        assert!(resolver.raw_values(ParameterSource::Body).is_empty());
    }
}
