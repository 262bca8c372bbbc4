//! Role engine.
//!
//! A [`Permission`] maps CRUD modes to the roles allowed or denied for each.
//! Anything that can answer "may these roles do X?" implements
//! [`Permissioner`]; chains of permissioners are combined with
//! [`Permissioners`] (first decision wins) or [`AllPermissioners`]
//! (everyone must allow).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Role name matching every role, including anonymous callers.
pub const ANYONE: &str = "*";

/// CRUD permission modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionMode {
    Create,
    Read,
    Update,
    Delete,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Create => "create",
            PermissionMode::Read => "read",
            PermissionMode::Update => "update",
            PermissionMode::Delete => "delete",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state answer from a permissioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Perm {
    /// No rule applies.
    #[default]
    Undef,
    Allow,
    Deny,
}

impl Perm {
    pub fn is_allow(self) -> bool {
        self == Perm::Allow
    }

    pub fn is_deny(self) -> bool {
        self == Perm::Deny
    }

    pub fn is_undef(self) -> bool {
        self == Perm::Undef
    }

    /// `self` unless undefined, then `other`.
    pub fn or(self, other: Perm) -> Perm {
        if self.is_undef() { other } else { self }
    }

    /// Collapse to a boolean, treating `Undef` as allowed.
    pub fn allowed_or_undef(self) -> bool {
        !self.is_deny()
    }
}

/// Answers permission questions for a set of roles.
pub trait Permissioner: Send + Sync {
    fn has_permission(&self, mode: PermissionMode, roles: &[String]) -> Perm;
}

impl<F> Permissioner for F
where
    F: Fn(PermissionMode, &[String]) -> Perm + Send + Sync,
{
    fn has_permission(&self, mode: PermissionMode, roles: &[String]) -> Perm {
        (self)(mode, roles)
    }
}

/// Role-based allow/deny table.
///
/// Deny rules win over allow rules. A mode with allow rules but no
/// matching role is denied; a mode with no rules at all is undefined.
#[derive(Debug, Clone, Default)]
pub struct Permission {
    allowed: BTreeMap<PermissionMode, Vec<String>>,
    denied: BTreeMap<PermissionMode, Vec<String>>,
}

impl Permission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permission allowing `roles` for every mode.
    pub fn allow_all(roles: &[&str]) -> Self {
        let mut p = Self::new();
        for mode in [
            PermissionMode::Create,
            PermissionMode::Read,
            PermissionMode::Update,
            PermissionMode::Delete,
        ] {
            p = p.allow(mode, roles);
        }
        p
    }

    pub fn allow(mut self, mode: PermissionMode, roles: &[&str]) -> Self {
        self.allowed
            .entry(mode)
            .or_default()
            .extend(roles.iter().map(|r| r.to_string()));
        self
    }

    pub fn deny(mut self, mode: PermissionMode, roles: &[&str]) -> Self {
        self.denied
            .entry(mode)
            .or_default()
            .extend(roles.iter().map(|r| r.to_string()));
        self
    }

    /// Concatenate the rules of two permissions.
    pub fn concat(mut self, other: &Permission) -> Self {
        for (mode, roles) in &other.allowed {
            self.allowed.entry(*mode).or_default().extend(roles.iter().cloned());
        }
        for (mode, roles) in &other.denied {
            self.denied.entry(*mode).or_default().extend(roles.iter().cloned());
        }
        self
    }
}

fn matches(rule_roles: &[String], roles: &[String]) -> bool {
    rule_roles
        .iter()
        .any(|r| r == ANYONE || roles.iter().any(|have| have == r))
}

impl Permissioner for Permission {
    fn has_permission(&self, mode: PermissionMode, roles: &[String]) -> Perm {
        if let Some(denied) = self.denied.get(&mode) {
            if matches(denied, roles) {
                return Perm::Deny;
            }
        }
        match self.allowed.get(&mode) {
            Some(allowed) if matches(allowed, roles) => Perm::Allow,
            Some(_) => Perm::Deny,
            None => Perm::Undef,
        }
    }
}

/// Chain answering with the first non-undefined decision.
#[derive(Clone, Default)]
pub struct Permissioners(pub Vec<Arc<dyn Permissioner>>);

impl Permissioner for Permissioners {
    fn has_permission(&self, mode: PermissionMode, roles: &[String]) -> Perm {
        for p in &self.0 {
            let perm = p.has_permission(mode, roles);
            if !perm.is_undef() {
                return perm;
            }
        }
        Perm::Undef
    }
}

/// Chain that allows only when every member allows.
#[derive(Clone, Default)]
pub struct AllPermissioners(pub Vec<Arc<dyn Permissioner>>);

impl Permissioner for AllPermissioners {
    fn has_permission(&self, mode: PermissionMode, roles: &[String]) -> Perm {
        if self.0.is_empty() {
            return Perm::Undef;
        }
        let mut undef = false;
        for p in &self.0 {
            match p.has_permission(mode, roles) {
                Perm::Deny => return Perm::Deny,
                Perm::Undef => undef = true,
                Perm::Allow => {}
            }
        }
        if undef { Perm::Undef } else { Perm::Allow }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(r: &[&str]) -> Vec<String> {
        r.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn allow_and_deny() {
        let p = Permission::new()
            .allow(PermissionMode::Update, &["admin"])
            .deny(PermissionMode::Delete, &[ANYONE]);

        assert_eq!(p.has_permission(PermissionMode::Update, &roles(&["admin"])), Perm::Allow);
        assert_eq!(p.has_permission(PermissionMode::Update, &roles(&["viewer"])), Perm::Deny);
        assert_eq!(p.has_permission(PermissionMode::Delete, &roles(&["admin"])), Perm::Deny);
        assert_eq!(p.has_permission(PermissionMode::Read, &roles(&["viewer"])), Perm::Undef);
    }

    #[test]
    fn deny_wins_over_allow() {
        let p = Permission::new()
            .allow(PermissionMode::Read, &[ANYONE])
            .deny(PermissionMode::Read, &["banned"]);
        assert_eq!(p.has_permission(PermissionMode::Read, &roles(&["banned"])), Perm::Deny);
        assert_eq!(p.has_permission(PermissionMode::Read, &[]), Perm::Allow);
    }

    #[test]
    fn chain_first_decision_wins() {
        let undef: Arc<dyn Permissioner> = Arc::new(|_: PermissionMode, _: &[String]| Perm::Undef);
        let allow: Arc<dyn Permissioner> = Arc::new(Permission::allow_all(&[ANYONE]));
        let chain = Permissioners(vec![undef, allow]);
        assert_eq!(chain.has_permission(PermissionMode::Create, &[]), Perm::Allow);
        assert_eq!(Permissioners::default().has_permission(PermissionMode::Create, &[]), Perm::Undef);
    }

    #[test]
    fn all_requires_every_allow() {
        let allow: Arc<dyn Permissioner> = Arc::new(Permission::allow_all(&[ANYONE]));
        let admin_only: Arc<dyn Permissioner> =
            Arc::new(Permission::new().allow(PermissionMode::Create, &["admin"]));
        let all = AllPermissioners(vec![allow, admin_only]);
        assert_eq!(all.has_permission(PermissionMode::Create, &roles(&["admin"])), Perm::Allow);
        assert_eq!(all.has_permission(PermissionMode::Create, &roles(&["guest"])), Perm::Deny);
        assert_eq!(all.has_permission(PermissionMode::Read, &roles(&["guest"])), Perm::Undef);
    }
}
