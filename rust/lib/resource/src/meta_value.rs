//! Decoded inbound values awaiting application to a record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An uploaded file from a multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub filename: String,
    pub content_type: Option<String>,
    pub size: usize,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl FileHeader {
    pub fn new(filename: impl Into<String>, content_type: Option<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            size: data.len(),
            data,
        }
    }
}

/// Raw leaf value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RawValue {
    #[default]
    None,
    Strings(Vec<String>),
    Files(Vec<FileHeader>),
}

impl RawValue {
    pub fn string(s: impl Into<String>) -> Self {
        RawValue::Strings(vec![s.into()])
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RawValue::None)
    }

    pub fn strings(&self) -> &[String] {
        match self {
            RawValue::Strings(s) => s,
            _ => &[],
        }
    }

    pub fn files(&self) -> &[FileHeader] {
        match self {
            RawValue::Files(f) => f,
            _ => &[],
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            RawValue::None => true,
            RawValue::Strings(s) => s.iter().all(|v| v.trim().is_empty()),
            RawValue::Files(f) => f.is_empty(),
        }
    }
}

/// One inbound field. `index` is the slice position for slice elements
/// and `-1` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaValue {
    pub name: String,
    pub index: i64,
    pub value: RawValue,
    pub children: Option<MetaValues>,
}

impl MetaValue {
    pub fn new(name: impl Into<String>, value: RawValue) -> Self {
        Self {
            name: name.into(),
            index: -1,
            value,
            children: None,
        }
    }

    /// Leaf holding one string.
    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, RawValue::string(value))
    }

    pub fn with_children(name: impl Into<String>, children: MetaValues) -> Self {
        Self {
            name: name.into(),
            index: -1,
            value: RawValue::None,
            children: Some(children),
        }
    }

    pub fn with_index(mut self, index: i64) -> Self {
        self.index = index;
        self
    }

    /// First posted string, or `""`.
    pub fn first_string(&self) -> &str {
        self.value.strings().first().map(String::as_str).unwrap_or("")
    }

    /// Last posted string, or `""`.
    pub fn string_value(&self) -> &str {
        self.value.strings().last().map(String::as_str).unwrap_or("")
    }

    /// Posted strings; for a slice of leaves, the first string of each
    /// element in order.
    pub fn strings(&self) -> Vec<String> {
        if let RawValue::Strings(s) = &self.value {
            return s.clone();
        }
        match &self.children {
            Some(children) => children
                .iter()
                .filter(|c| c.children.is_none())
                .map(|c| c.first_string().to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.children.as_ref().is_some_and(|c| c.disabled)
    }

    pub fn is_blank(&self) -> bool {
        match &self.children {
            Some(children) => self.value.is_blank() && children.is_blank(),
            None => self.value.is_blank(),
        }
    }
}

/// Ordered sequence of values plus a by-name index (last one wins).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaValues {
    /// Set by the `@enabled=false` sentinel; the subtree must not be applied.
    pub disabled: bool,
    values: Vec<MetaValue>,
    by_name: HashMap<String, usize>,
}

impl MetaValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    pub fn add(&mut self, value: MetaValue) {
        self.by_name.insert(value.name.clone(), self.values.len());
        self.values.push(value);
    }

    pub fn get(&self, name: &str) -> Option<&MetaValue> {
        self.by_name.get(name).map(|&i| &self.values[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MetaValue> {
        match self.by_name.get(name) {
            Some(&i) => self.values.get_mut(i),
            None => None,
        }
    }

    /// First string of the named value, or `""`.
    pub fn get_string(&self, name: &str) -> &str {
        self.get(name).map(MetaValue::first_string).unwrap_or("")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetaValue> {
        self.values.iter()
    }

    pub fn values(&self) -> &[MetaValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when nothing non-blank was posted anywhere below.
    pub fn is_blank(&self) -> bool {
        self.values.iter().all(MetaValue::is_blank)
    }
}

impl<'a> IntoIterator for &'a MetaValues {
    type Item = &'a MetaValue;
    type IntoIter = std::slice::Iter<'a, MetaValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl FromIterator<MetaValue> for MetaValues {
    fn from_iter<I: IntoIterator<Item = MetaValue>>(iter: I) -> Self {
        let mut out = MetaValues::new();
        for v in iter {
            out.add(v);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_name_keeps_last() {
        let mut mvs = MetaValues::new();
        mvs.add(MetaValue::leaf("Name", "a"));
        mvs.add(MetaValue::leaf("Name", "b"));
        assert_eq!(mvs.len(), 2);
        assert_eq!(mvs.get_string("Name"), "b");
        assert_eq!(mvs.get_string("Missing"), "");
    }

    #[test]
    fn blankness_is_recursive() {
        let inner: MetaValues = [MetaValue::leaf("Age", " ")].into_iter().collect();
        let mut mvs = MetaValues::new();
        mvs.add(MetaValue::with_children("Profile", inner));
        assert!(mvs.is_blank());

        mvs.add(MetaValue::leaf("Name", "x"));
        assert!(!mvs.is_blank());
    }

    #[test]
    fn strings_of_leaf_slice() {
        let elems: MetaValues = [
            MetaValue::leaf("0", "a").with_index(0),
            MetaValue::leaf("1", "b").with_index(1),
        ]
        .into_iter()
        .collect();
        let mv = MetaValue::with_children("Tags", elems);
        assert_eq!(mv.strings(), vec!["a", "b"]);
        assert!(!mv.is_disabled());
    }
}
