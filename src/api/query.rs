use serde_json::Value;

/// Ordered query-string multimap. Array values serialize as repeated keys,
/// which is how the master reads `status=READY&status=RUNNING`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every value of `key` with a single one.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        let key = key.into();
        self.pairs.retain(|(k, _)| *k != key);
        self.pairs.push((key, value.to_string()));
        self
    }

    /// Replace every value of `key` with the given list.
    pub fn set_all<I, V>(&mut self, key: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let key = key.into();
        self.pairs.retain(|(k, _)| *k != key);
        for value in values {
            self.pairs.push((key.clone(), value.to_string()));
        }
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Merge a free-form JSON value under `key`: scalars as text, arrays as
    /// repeated keys, nested objects as their JSON text. `null` removes the key.
    pub fn set_json(&mut self, key: impl Into<String>, value: &Value) -> &mut Self {
        let key = key.into();
        match value {
            Value::Null => {
                self.pairs.retain(|(k, _)| *k != key);
            }
            Value::String(s) => {
                self.set(key, s);
            }
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(scalar_text).collect();
                self.set_all(key, rendered);
            }
            other => {
                self.set(key, scalar_text(other));
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = QueryParams::new();
        for (k, v) in iter {
            params.pairs.push((k.into(), v.to_string()));
        }
        params
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
