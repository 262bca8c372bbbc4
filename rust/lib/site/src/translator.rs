//! Translator and session collaborators carried by a request context.
//!
//! Both are pluggable: the embedding application installs whatever
//! backend it uses. [`StaticTranslator`] covers tests and small
//! deployments that ship their strings in config.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::SiteError;

// ── Translator ──

/// Resolves a translation key for a locale.
pub trait Translator: Send + Sync + 'static {
    /// Translated text, or `None` when the key is unknown for the locale.
    fn translate(&self, locale: &str, key: &str) -> Option<String>;
}

/// Closures implement Translator.
impl<F> Translator for F
where
    F: Fn(&str, &str) -> Option<String> + Send + Sync + 'static,
{
    fn translate(&self, locale: &str, key: &str) -> Option<String> {
        (self)(locale, key)
    }
}

/// In-memory table: key → locale → text.
///
/// Lookups fall back from a regional locale to its language
/// (`fr-FR` → `fr`).
#[derive(Default)]
pub struct StaticTranslator {
    table: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl StaticTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, locale: &str, key: &str, text: &str) {
        if let Ok(mut table) = self.table.write() {
            table
                .entry(key.to_string())
                .or_default()
                .insert(locale.to_string(), text.to_string());
        }
    }
}

impl Translator for StaticTranslator {
    fn translate(&self, locale: &str, key: &str) -> Option<String> {
        let table = self.table.read().ok()?;
        let texts = table.get(key)?;
        texts.get(locale).cloned().or_else(|| {
            let lang = locale.split(['-', '_']).next()?;
            texts.get(lang).cloned()
        })
    }
}

// ── Session ──

/// Per-request session storage.
pub trait SessionManager: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), SiteError>;
    fn delete(&self, key: &str) -> Result<(), SiteError>;
}

/// Session kept in process memory; shared by every clone.
#[derive(Clone, Default)]
pub struct MemorySession {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionManager for MemorySession {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SiteError> {
        self.values
            .write()
            .map_err(|e| SiteError::Config(e.to_string()))?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SiteError> {
        self.values
            .write()
            .map_err(|e| SiteError::Config(e.to_string()))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_translator_falls_back_to_language() {
        let t = StaticTranslator::new();
        t.insert("fr", "button.save", "Enregistrer");
        t.insert("pt-BR", "button.save", "Salvar");

        assert_eq!(t.translate("fr-FR", "button.save").as_deref(), Some("Enregistrer"));
        assert_eq!(t.translate("pt-BR", "button.save").as_deref(), Some("Salvar"));
        assert_eq!(t.translate("de", "button.save"), None);
        assert_eq!(t.translate("fr", "missing"), None);
    }

    #[test]
    fn closure_translator() {
        let t = |locale: &str, key: &str| Some(format!("{locale}:{key}"));
        assert_eq!(t.translate("en", "x").as_deref(), Some("en:x"));
    }

    #[test]
    fn memory_session() {
        let s = MemorySession::new();
        s.set("user", Value::from("alice")).unwrap();
        assert_eq!(s.clone().get("user"), Some(Value::from("alice")));
        s.delete("user").unwrap();
        assert_eq!(s.get("user"), None);
    }
}
