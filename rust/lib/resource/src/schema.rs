//! Type-erased view of a resource's metas, used while shaping inbound
//! values before the concrete record type is involved.

use std::sync::Arc;

/// Gate on the requirement check of a meta's siblings.
///
/// When a meta carrying a toggle is posted, sibling requirement checks
/// run only if its value matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingsCheck {
    /// Check when the posted value is `true` or `on`.
    OnTrue,
    /// Check when the posted value is `false`, `off` or empty.
    OnFalse,
}

impl SiblingsCheck {
    pub fn enabled_by(self, value: &str) -> bool {
        match self {
            SiblingsCheck::OnTrue => matches!(value, "true" | "on"),
            SiblingsCheck::OnFalse => matches!(value, "false" | "off" | ""),
        }
    }
}

#[derive(Clone)]
pub struct MetaInfo {
    pub name: String,
    pub label: String,
    pub required: bool,
    pub alone: bool,
    pub proxier: bool,
    pub siblings_check: Option<SiblingsCheck>,
    /// Metas of the nested document, for inline metas.
    pub nested: Option<Arc<dyn MetaSchema>>,
}

impl std::fmt::Debug for MetaInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaInfo")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("nested", &self.nested.is_some())
            .finish()
    }
}

pub trait MetaSchema: Send + Sync {
    fn schema_name(&self) -> &str;

    /// Metas in declaration order.
    fn meta_infos(&self) -> Vec<MetaInfo>;

    fn meta_info(&self, name: &str) -> Option<MetaInfo> {
        self.meta_infos().into_iter().find(|m| m.name == name)
    }
}
