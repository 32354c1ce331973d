use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One value handed to a widget's entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InputValue {
    /// A form field, passed through unchanged.
    Text(String),
    /// An upload that was written to disk; the widget receives its path.
    File(PathBuf),
}

impl InputValue {
    /// The string a widget observes for this value.
    pub fn as_text(&self) -> String {
        match self {
            InputValue::Text(text) => text.clone(),
            InputValue::File(path) => path.to_string_lossy().into_owned(),
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            InputValue::File(path) => Some(path),
            InputValue::Text(_) => None,
        }
    }
}

/// Name → value mapping for a single invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetInputs(BTreeMap<String, InputValue>);

impl WidgetInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: InputValue) -> Option<InputValue> {
        self.0.insert(name.into(), value)
    }

    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, InputValue::Text(value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Flatten to the `dict[str, str]` shape widget code receives.
    pub fn to_text_map(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), value.as_text()))
            .collect()
    }
}

impl FromIterator<(String, InputValue)> for WidgetInputs {
    fn from_iter<T: IntoIterator<Item = (String, InputValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_map_substitutes_paths_for_files() {
        let mut inputs = WidgetInputs::new().with_text("caption", "hello");
        inputs.insert("user_image", InputValue::File(PathBuf::from("uploads/cat.png")));

        let flat = inputs.to_text_map();
        assert_eq!(flat["caption"], "hello");
        assert_eq!(flat["user_image"], "uploads/cat.png");
    }

    #[test]
    fn later_insert_replaces_earlier_value() {
        let mut inputs = WidgetInputs::new().with_text("a", "1");
        let previous = inputs.insert("a", InputValue::Text("2".into()));
        assert_eq!(previous, Some(InputValue::Text("1".into())));
        assert_eq!(inputs.len(), 1);
    }
}
