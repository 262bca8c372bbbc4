//! Tree of posted form fields keyed by parsed form keys.

use indexmap::IndexMap;

use crate::error::ResourceError;
use crate::formkey::{FormKeyPart, parse_form_key};
use crate::meta_value::{FileHeader, RawValue};

/// Prefix stripped from posted field names.
pub const DEFAULT_PREFIX: &str = "QorResource";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TreeKey {
    Name(String),
    Index(usize),
}

impl TreeKey {
    /// Name used for the matching meta value.
    pub fn as_name(&self) -> String {
        match self {
            TreeKey::Name(n) => n.clone(),
            TreeKey::Index(i) => i.to_string(),
        }
    }
}

/// A node of the tree. Children keep insertion order; indexed children
/// double as the slice elements of their parent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormTree {
    value: RawValue,
    /// Posted key that wrote `value`; another spelling of the same slot
    /// replaces the value instead of extending it.
    written_by: Option<String>,
    children: IndexMap<TreeKey, FormTree>,
}

impl FormTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from `(key, value)` pairs, stripping `prefix.` from
    /// each key. Repeated keys accumulate their values; `Items[00]` after
    /// `Items[0]` overwrites the slot.
    pub fn from_pairs<I, K, V>(pairs: I, prefix: &str) -> Result<Self, ResourceError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut tree = FormTree::new();
        for (k, v) in pairs {
            let key = strip_prefix(k.as_ref(), prefix);
            tree.add_strings(key, vec![v.into()])?;
        }
        Ok(tree)
    }

    /// Tree of an `application/x-www-form-urlencoded` body.
    pub fn from_urlencoded(body: &[u8], prefix: &str) -> Result<Self, ResourceError> {
        FormTree::from_pairs(url::form_urlencoded::parse(body), prefix)
    }

    pub fn add_strings(&mut self, key: &str, values: Vec<String>) -> Result<(), ResourceError> {
        let Some(node) = self.node_for(key)? else {
            return Ok(());
        };
        let repeated = node.written_by.as_deref() == Some(key);
        match &mut node.value {
            RawValue::Strings(existing) if repeated => existing.extend(values),
            other => *other = RawValue::Strings(values),
        }
        node.written_by = Some(key.to_string());
        Ok(())
    }

    pub fn add_files(&mut self, key: &str, files: Vec<FileHeader>) -> Result<(), ResourceError> {
        let Some(node) = self.node_for(key)? else {
            return Ok(());
        };
        let repeated = node.written_by.as_deref() == Some(key);
        match &mut node.value {
            RawValue::Files(existing) if repeated => existing.extend(files),
            other => *other = RawValue::Files(files),
        }
        node.written_by = Some(key.to_string());
        Ok(())
    }

    fn node_for(&mut self, key: &str) -> Result<Option<&mut FormTree>, ResourceError> {
        let parts = parse_form_key(key)?;
        if parts.is_empty() {
            return Ok(None);
        }
        let mut cur = self;
        for part in &parts {
            let tk = match part {
                FormKeyPart::Name(n) => TreeKey::Name(n.clone()),
                FormKeyPart::Index(i) if *i < 0 => TreeKey::Index(cur.indexed_len()),
                FormKeyPart::Index(i) => TreeKey::Index(*i as usize),
            };
            cur = cur.children.entry(tk).or_default();
        }
        Ok(Some(cur))
    }

    /// Node at `key`, if posted.
    pub fn get(&self, key: &str) -> Option<&FormTree> {
        let parts = parse_form_key(key).ok()?;
        let mut cur = self;
        for part in &parts {
            let tk = match part {
                FormKeyPart::Name(n) => TreeKey::Name(n.clone()),
                FormKeyPart::Index(i) => TreeKey::Index(usize::try_from(*i).ok()?),
            };
            cur = cur.children.get(&tk)?;
        }
        Some(cur)
    }

    /// First string posted at `key`, or `""`.
    pub fn get_string(&self, key: &str) -> &str {
        self.get(key)
            .and_then(|n| n.value.strings().first())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn value(&self) -> &RawValue {
        &self.value
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> impl Iterator<Item = (&TreeKey, &FormTree)> {
        self.children.iter()
    }

    /// Indexed children in index order.
    pub fn slice(&self) -> impl Iterator<Item = (usize, &FormTree)> {
        let mut elems: Vec<_> = self
            .children
            .iter()
            .filter_map(|(k, v)| match k {
                TreeKey::Index(i) => Some((*i, v)),
                TreeKey::Name(_) => None,
            })
            .collect();
        elems.sort_by_key(|(i, _)| *i);
        elems.into_iter()
    }

    pub fn has_slice(&self) -> bool {
        self.children.keys().any(|k| matches!(k, TreeKey::Index(_)))
    }

    fn indexed_len(&self) -> usize {
        self.children.keys().filter(|k| matches!(k, TreeKey::Index(_))).count()
    }
}

pub(crate) fn strip_prefix<'a>(key: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return key;
    }
    key.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_tree_with_prefix() {
        let tree = FormTree::from_pairs(
            [
                ("QorResource.Name", "Alice"),
                ("QorResource.Profile.Age", "30"),
                ("QorResource.Tags[]", "a"),
                ("QorResource.Tags[]", "b"),
            ],
            DEFAULT_PREFIX,
        )
        .unwrap();

        assert_eq!(tree.get_string("Name"), "Alice");
        assert_eq!(tree.get_string("Profile.Age"), "30");
        let tags: Vec<_> = tree
            .get("Tags")
            .unwrap()
            .slice()
            .map(|(i, n)| (i, n.value().strings()[0].clone()))
            .collect();
        assert_eq!(tags, vec![(0, "a".to_string()), (1, "b".to_string())]);
    }

    #[test]
    fn zero_padded_and_append_indexes() {
        let tree = FormTree::from_pairs(
            [("Items[0]", "first"), ("Items[00]", "second"), ("Items[]", "third")],
            "",
        )
        .unwrap();
        let items = tree.get("Items").unwrap();
        let slots: Vec<_> = items.slice().map(|(i, n)| (i, n.value().strings().to_vec())).collect();
        assert_eq!(
            slots,
            vec![(0, vec!["second".to_string()]), (1, vec!["third".to_string()])]
        );
    }

    #[test]
    fn slice_walks_in_index_order() {
        let tree = FormTree::from_pairs([("Lines[1].Sku", "second"), ("Lines[0].Sku", "first")], "")
            .unwrap();
        let skus: Vec<_> = tree
            .get("Lines")
            .unwrap()
            .slice()
            .map(|(i, n)| (i, n.get_string("Sku").to_string()))
            .collect();
        assert_eq!(skus, vec![(0, "first".to_string()), (1, "second".to_string())]);
    }

    #[test]
    fn repeated_keys_accumulate_and_bad_keys_fail() {
        let tree = FormTree::from_pairs([("Roles", "a"), ("Roles", "b")], "").unwrap();
        assert_eq!(tree.get("Roles").unwrap().value().strings(), ["a", "b"]);

        assert!(matches!(
            FormTree::from_pairs([("a[b", "x")], ""),
            Err(ResourceError::MalformedKey(_))
        ));
    }

    #[test]
    fn files_land_on_leaves() {
        let mut tree = FormTree::new();
        tree.add_files("Avatar", vec![FileHeader::new("a.png", None, vec![1, 2])])
            .unwrap();
        assert_eq!(tree.get("Avatar").unwrap().value().files()[0].size, 2);
    }
}
