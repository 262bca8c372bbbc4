//! Shaping inbound bodies into [`MetaValues`].
//!
//! Both form trees and JSON documents end up in the same shape: named
//! values, nested documents as children, and slices as children named
//! after their index. Every document level is checked for required metas
//! that were not posted.

use std::sync::Arc;

use openerp_site::{Errors, FieldError};
use serde_json::{Map, Value};

use crate::error::ResourceError;
use crate::form_tree::{FormTree, TreeKey};
use crate::meta_value::{MetaValue, MetaValues, RawValue};
use crate::schema::MetaSchema;

/// Key disabling the subtree it is posted in when set to `false`.
pub const ENABLED_KEY: &str = "@enabled";

fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn nested_of(schema: Option<&dyn MetaSchema>, name: &str) -> Option<Arc<dyn MetaSchema>> {
    schema.and_then(|s| s.meta_info(name)).and_then(|m| m.nested)
}

/// Report every required meta of `schema` missing from `values`.
pub fn check_requirement(values: &MetaValues, schema: &dyn MetaSchema, path: &str, errors: &mut Errors) {
    if values.disabled {
        return;
    }
    if let [only] = values.values() {
        if schema.meta_info(&only.name).is_some_and(|m| m.alone) {
            return;
        }
    }

    let infos = schema.meta_infos();
    for info in &infos {
        if let (Some(toggle), Some(v)) = (info.siblings_check, values.get(&info.name)) {
            if !toggle.enabled_by(v.first_string()) {
                return;
            }
        }
    }
    for info in infos {
        if info.required && !info.proxier && !values.contains(&info.name) {
            errors.push_field(FieldError::cant_be_blank(join_path(path, &info.name), info.label));
        }
    }
}

// ── Form trees ──────────────────────────────────────────────────────

/// Convert a posted form tree. `schema` resolves which metas exist and
/// which of them are required.
pub fn form_to_meta_values(
    tree: &FormTree,
    schema: Option<&dyn MetaSchema>,
) -> Result<MetaValues, ResourceError> {
    let mut errors = Errors::new();
    let values = collect_form(tree, schema, "", &mut errors);
    if let Some(s) = schema {
        check_requirement(&values, s, "", &mut errors);
    }
    errors.into_result()?;
    Ok(values)
}

fn collect_form(node: &FormTree, schema: Option<&dyn MetaSchema>, path: &str, errors: &mut Errors) -> MetaValues {
    let mut out = MetaValues::new();
    for (key, child) in node.children() {
        let name = key.as_name();
        if name.starts_with('@') {
            continue;
        }
        let index = match key {
            TreeKey::Index(i) => *i as i64,
            TreeKey::Name(_) => -1,
        };
        let nested = nested_of(schema, &name);
        out.add(form_value(&name, index, child, nested, path, errors));
    }
    out
}

fn form_value(
    name: &str,
    index: i64,
    node: &FormTree,
    nested: Option<Arc<dyn MetaSchema>>,
    path: &str,
    errors: &mut Errors,
) -> MetaValue {
    if node.is_leaf() {
        return MetaValue::new(name, node.value().clone()).with_index(index);
    }
    if node.get_string(ENABLED_KEY) == "false" {
        return MetaValue::with_children(name, MetaValues::disabled()).with_index(index);
    }

    let child_path = join_path(path, name);
    let children = if node.has_slice() {
        let mut elems = MetaValues::new();
        for (i, elem) in node.slice() {
            elems.add(form_value(&i.to_string(), i as i64, elem, nested.clone(), &child_path, errors));
        }
        elems
    } else {
        let values = collect_form(node, nested.as_deref(), &child_path, errors);
        if let Some(s) = &nested {
            check_requirement(&values, s.as_ref(), &child_path, errors);
        }
        values
    };

    let mut mv = MetaValue::with_children(name, children).with_index(index);
    mv.value = node.value().clone();
    mv
}

// ── JSON ────────────────────────────────────────────────────────────

/// Convert a JSON document. The top level must be an object.
pub fn json_to_meta_values(
    doc: &Value,
    schema: Option<&dyn MetaSchema>,
) -> Result<MetaValues, ResourceError> {
    let Value::Object(map) = doc else {
        return Err(ResourceError::Json("expected a JSON object".into()));
    };
    let mut errors = Errors::new();
    let values = collect_json(map, schema, "", &mut errors);
    if let Some(s) = schema {
        check_requirement(&values, s, "", &mut errors);
    }
    errors.into_result()?;
    Ok(values)
}

fn scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn collect_json(
    map: &Map<String, Value>,
    schema: Option<&dyn MetaSchema>,
    path: &str,
    errors: &mut Errors,
) -> MetaValues {
    let mut out = MetaValues::new();
    for (name, v) in map {
        if name.starts_with('@') {
            continue;
        }
        let nested = nested_of(schema, name);
        out.add(json_value(name, -1, v, nested, path, errors));
    }
    out
}

fn json_value(
    name: &str,
    index: i64,
    v: &Value,
    nested: Option<Arc<dyn MetaSchema>>,
    path: &str,
    errors: &mut Errors,
) -> MetaValue {
    match v {
        Value::Object(map) => {
            let enabled = map.get(ENABLED_KEY);
            if enabled == Some(&Value::Bool(false)) || enabled.and_then(Value::as_str) == Some("false") {
                return MetaValue::with_children(name, MetaValues::disabled()).with_index(index);
            }
            let child_path = join_path(path, name);
            let values = collect_json(map, nested.as_deref(), &child_path, errors);
            if let Some(s) = &nested {
                check_requirement(&values, s.as_ref(), &child_path, errors);
            }
            MetaValue::with_children(name, values).with_index(index)
        }
        Value::Array(items) if items.iter().any(Value::is_object) => {
            let child_path = join_path(path, name);
            let mut elems = MetaValues::new();
            for (i, item) in items.iter().enumerate() {
                elems.add(json_value(&i.to_string(), i as i64, item, nested.clone(), &child_path, errors));
            }
            MetaValue::with_children(name, elems).with_index(index)
        }
        Value::Array(items) => {
            MetaValue::new(name, RawValue::Strings(items.iter().map(scalar_string).collect())).with_index(index)
        }
        Value::Null => MetaValue::new(name, RawValue::Strings(Vec::new())).with_index(index),
        other => MetaValue::leaf(name, scalar_string(other)).with_index(index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form_tree::DEFAULT_PREFIX;
    use crate::schema::{MetaInfo, SiblingsCheck};
    use serde_json::json;

    struct Schema {
        name: &'static str,
        metas: Vec<MetaInfo>,
    }

    impl MetaSchema for Schema {
        fn schema_name(&self) -> &str {
            self.name
        }

        fn meta_infos(&self) -> Vec<MetaInfo> {
            self.metas.clone()
        }
    }

    fn info(name: &str, required: bool) -> MetaInfo {
        MetaInfo {
            name: name.into(),
            label: name.into(),
            required,
            alone: false,
            proxier: false,
            siblings_check: None,
            nested: None,
        }
    }

    fn item_schema() -> Arc<dyn MetaSchema> {
        Arc::new(Schema {
            name: "Item",
            metas: vec![info("id", false), info("Name", true)],
        })
    }

    fn order_schema() -> Schema {
        let mut items = info("Items", false);
        items.nested = Some(item_schema());
        Schema {
            name: "Order",
            metas: vec![info("Code", true), info("Note", false), items],
        }
    }

    fn form(pairs: &[(&str, &str)]) -> FormTree {
        FormTree::from_pairs(pairs.iter().copied(), DEFAULT_PREFIX).unwrap()
    }

    #[test]
    fn slice_elements_keep_their_indexes() {
        let tree = form(&[
            ("QorResource.Code", "A1"),
            ("QorResource.Items[0].id", "7"),
            ("QorResource.Items[0].Name", "X"),
            ("QorResource.Items[1].id", "8"),
            ("QorResource.Items[1].@enabled", "false"),
        ]);
        let values = form_to_meta_values(&tree, Some(&order_schema())).unwrap();
        let items = values.get("Items").unwrap().children.as_ref().unwrap();
        assert_eq!(items.len(), 2);
        let first = &items.values()[0];
        assert_eq!((first.name.as_str(), first.index), ("0", 0));
        assert_eq!(first.children.as_ref().unwrap().get_string("Name"), "X");
        assert!(items.values()[1].is_disabled());
    }

    #[test]
    fn empty_form_reports_each_required_meta_once() {
        let err = form_to_meta_values(&FormTree::new(), Some(&order_schema())).unwrap_err();
        let errors = err.errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.to_string(), "Code cant be blank");
    }

    #[test]
    fn nested_requirement_uses_element_path() {
        let tree = form(&[("QorResource.Code", "A1"), ("QorResource.Items[0].id", "7")]);
        let err = form_to_meta_values(&tree, Some(&order_schema())).unwrap_err();
        let fields: Vec<_> = err.errors().unwrap().fields().map(|f| f.field.clone()).collect();
        assert_eq!(fields, vec!["Items.0.Name"]);
    }

    #[test]
    fn alone_and_toggle_skip_the_check() {
        let mut note = info("Note", false);
        note.alone = true;
        let schema = Schema {
            name: "Order",
            metas: vec![info("Code", true), note],
        };
        assert!(form_to_meta_values(&form(&[("Note", "x")]), Some(&schema)).is_ok());

        let mut draft = info("Draft", false);
        draft.siblings_check = Some(SiblingsCheck::OnFalse);
        let schema = Schema {
            name: "Order",
            metas: vec![info("Code", true), draft, info("Note", false)],
        };
        assert!(form_to_meta_values(&form(&[("Draft", "true"), ("Note", "x")]), Some(&schema)).is_ok());
        assert!(form_to_meta_values(&form(&[("Draft", "false"), ("Note", "x")]), Some(&schema)).is_err());
    }

    #[test]
    fn json_documents_share_the_shape() {
        let doc = json!({
            "Code": "A1",
            "Tags": ["a", "b"],
            "Items": [{"id": 7, "Name": "X"}, {"id": 8, "@enabled": false}],
            "Note": null,
        });
        let values = json_to_meta_values(&doc, Some(&order_schema())).unwrap();
        assert_eq!(values.get("Tags").unwrap().strings(), vec!["a", "b"]);
        let items = values.get("Items").unwrap().children.as_ref().unwrap();
        assert_eq!(items.values()[0].children.as_ref().unwrap().get_string("id"), "7");
        assert!(items.values()[1].is_disabled());
        assert!(values.get("Note").unwrap().is_blank());

        assert!(matches!(json_to_meta_values(&json!([1]), None), Err(ResourceError::Json(_))));
    }
}
