//! Ordered multi-value maps for query strings, form bodies and cookies.

/// An ordered list of key/value pairs where a key may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiDict {
    items: Vec<(String, String)>,
}

impl MultiDict {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping existing values for the same key.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.push((key.into(), value.into()));
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value stored under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.items
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<(String, String)> for MultiDict {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
