//! Built-in `pages` admin resource: per-site content pages kept in the
//! site's system DB.

use std::ops::ControlFlow;
use std::sync::Arc;

use openerp_core::{Permission, PermissionMode};
use openerp_resource::{AdminModule, Layout, Meta, Resource, lens};
use serde::{Deserialize, Serialize};

/// Role allowed to change pages.
pub const EDITOR_ROLE: &str = "admin";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub published: bool,
}

pub fn resource() -> Resource<Page> {
    let editors = Permission::new()
        .allow(PermissionMode::Create, &[EDITOR_ROLE])
        .allow(PermissionMode::Update, &[EDITOR_ROLE])
        .allow(PermissionMode::Delete, &[EDITOR_ROLE]);

    Resource::new()
        .meta(Meta::field("id", lens!(Page, id)))
        .meta(Meta::field("Title", lens!(Page, title)).required())
        .meta(Meta::field("Slug", lens!(Page, slug)))
        .meta(Meta::field("Body", lens!(Page, body)))
        .meta(Meta::field("Published", lens!(Page, published)))
        .permission(Arc::new(editors))
        .label_with(|p: &Page| p.title.clone())
        .layout("summary", Layout::Metas(vec!["id".into(), "Title".into(), "Published".into()]))
        .processor(|page, _values, _ctx| {
            if page.slug.is_empty() {
                page.slug = slugify(&page.title);
            }
            Ok(ControlFlow::Continue(()))
        })
}

/// Admin module serving `/admin/pages`.
pub fn module() -> AdminModule {
    AdminModule::new("admin").resource(Arc::new(resource()))
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  About us "), "about-us");
        assert_eq!(slugify(""), "");
    }
}
