use serde::Serialize;

/// Structured cache key: dataset name plus request parameters.
///
/// Parameters are kept sorted by name so two keys built in a different
/// order compare equal and share one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct QueryKey {
    pub dataset: String,
    pub params: Vec<(String, String)>,
}

impl QueryKey {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            params: Vec::new(),
        }
    }

    /// Adds or replaces a parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        match self.params.binary_search_by(|(k, _)| k.as_str().cmp(&name)) {
            Ok(i) => self.params[i].1 = value,
            Err(i) => self.params.insert(i, (name, value)),
        }
        self
    }

    /// Adds the parameter only when present. Absent parameters are not part
    /// of the key, so `None` and "never set" are the same entry.
    pub fn with_opt(self, name: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.with(name, v),
            None => self,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dataset)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::QueryKey;

    #[test]
    fn parameter_order_does_not_matter() {
        let a = QueryKey::new("gee-tiles")
            .with("pollutant", "NO2")
            .with("date", "2024-05-01");
        let b = QueryKey::new("gee-tiles")
            .with("date", "2024-05-01")
            .with("pollutant", "NO2");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "gee-tiles?date=2024-05-01&pollutant=NO2");
    }

    #[test]
    fn with_replaces_and_with_opt_skips_none() {
        let k = QueryKey::new("districts")
            .with("province", "North")
            .with("province", "South")
            .with_opt("extra", None::<&str>);
        assert_eq!(k.param("province"), Some("South"));
        assert_eq!(k.params.len(), 1);
        assert_eq!(k, QueryKey::new("districts").with("province", "South"));
    }
}
