use std::fmt;

use serde::Deserialize;

use crate::util::html::escape;

/// Attributes of a single tag, kept in the order they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Adds an attribute unless one with the same name exists already.
    /// Returns whether the value was stored.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.0.push((name, value.into()));
        true
    }

    /// Replaces the value in place, or appends when the attribute is missing.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (name, value) in iter {
            attributes.insert(name, value);
        }
        attributes
    }
}

impl IntoIterator for Attributes {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Renders `name="value"` pairs separated by single spaces, values escaped.
impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (name, value)) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}=\"{}\"", name, escape(value))?;
        }
        Ok(())
    }
}

/// One open element of the source markup.
#[derive(Debug, Clone)]
pub struct ElementFrame {
    pub name: String,
    /// Whether the open tag reached the output.
    pub emitted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Substitution {
    pub search: String,
    #[serde(default)]
    pub replace: String,
}

/// Substitutions that apply when `url_pattern` matches the site's base path.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteRule {
    #[serde(rename = "pattern")]
    pub url_pattern: String,
    #[serde(default)]
    pub substitutions: Vec<Substitution>,
}

impl SiteRule {
    pub fn new(url_pattern: impl Into<String>) -> Self {
        Self {
            url_pattern: url_pattern.into(),
            substitutions: Vec::new(),
        }
    }

    pub fn substitute(mut self, search: impl Into<String>, replace: impl Into<String>) -> Self {
        self.substitutions.push(Substitution {
            search: search.into(),
            replace: replace.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_duplicate_and_insertion_order() {
        let mut attributes = Attributes::new();
        assert!(attributes.insert("src", "a.png"));
        assert!(attributes.insert("alt", "x"));
        assert!(!attributes.insert("src", "b.png"));

        assert_eq!(attributes.get("src"), Some("a.png"));
        assert_eq!(attributes.to_string(), r#"src="a.png" alt="x""#);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut attributes: Attributes = [("width", "10"), ("frameborder", "1")].into_iter().collect();
        attributes.set("width", "20");
        attributes.set("rel", "noreferrer");

        assert_eq!(
            attributes.to_string(),
            r#"width="20" frameborder="1" rel="noreferrer""#
        );
    }

    #[test]
    fn escapes_values_when_rendered() {
        let attributes: Attributes = [("title", r#"a "quoted" <b> & 'x'"#)].into_iter().collect();
        assert_eq!(
            attributes.to_string(),
            r#"title="a &quot;quoted&quot; &lt;b&gt; &amp; &#039;x&#039;""#
        );
    }
}
