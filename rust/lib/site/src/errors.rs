//! Accumulated user-facing errors of one pipeline stage.

use std::fmt;

use indexmap::IndexMap;
use openerp_core::ServiceError;

/// Message of a required field left empty.
pub const CANT_BE_BLANK: &str = "cant be blank";

/// An error bound to a record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    /// Human label of the field, e.g. `Profile Age`.
    pub label: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            label: label.into(),
            message: message.into(),
        }
    }

    pub fn cant_be_blank(field: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(field, label, CANT_BE_BLANK)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.label, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorEntry {
    Message(String),
    Field(FieldError),
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorEntry::Message(m) => f.write_str(m),
            ErrorEntry::Field(e) => e.fmt(f),
        }
    }
}

/// Ordered error collection. Adding another collection flattens it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errors {
    entries: Vec<ErrorEntry>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.entries.push(ErrorEntry::Message(message.into()));
    }

    pub fn push_field(&mut self, error: FieldError) {
        self.entries.push(ErrorEntry::Field(error));
    }

    pub fn extend(&mut self, other: Errors) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldError> {
        self.entries.iter().filter_map(|e| match e {
            ErrorEntry::Field(f) => Some(f),
            ErrorEntry::Message(_) => None,
        })
    }

    /// Field errors grouped by label; plain messages are skipped.
    pub fn by_label(&self) -> IndexMap<String, Vec<&FieldError>> {
        let mut out: IndexMap<String, Vec<&FieldError>> = IndexMap::new();
        for e in self.fields() {
            out.entry(e.label.clone()).or_default().push(e);
        }
        out
    }

    /// `Ok(())` when empty, otherwise the collection as an error.
    pub fn into_result(self) -> Result<(), Errors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.entries.iter().map(|e| e.to_string()).collect();
        f.write_str(&lines.join("\n - "))
    }
}

impl std::error::Error for Errors {}

impl From<Errors> for ServiceError {
    fn from(errors: Errors) -> Self {
        ServiceError::Validation {
            message: errors.to_string(),
            fields: errors
                .fields()
                .map(|e| (e.field.clone(), e.message.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_flattens_and_display_joins() {
        let mut inner = Errors::new();
        inner.push_field(FieldError::cant_be_blank("Name", "Name"));
        inner.push("quota exceeded");

        let mut outer = Errors::new();
        outer.push("first");
        outer.extend(inner);

        assert_eq!(outer.len(), 3);
        assert_eq!(outer.to_string(), "first\n - Name cant be blank\n - quota exceeded");
    }

    #[test]
    fn group_by_label() {
        let mut errs = Errors::new();
        errs.push_field(FieldError::new("Items.0.Name", "Name", "too long"));
        errs.push_field(FieldError::cant_be_blank("Items.1.Name", "Name"));
        errs.push_field(FieldError::cant_be_blank("Code", "Code"));

        let grouped = errs.by_label();
        assert_eq!(grouped["Name"].len(), 2);
        assert_eq!(grouped["Code"].len(), 1);
        assert!(Errors::new().into_result().is_ok());
    }

    #[test]
    fn into_service_error_keeps_fields() {
        let mut errs = Errors::new();
        errs.push_field(FieldError::cant_be_blank("Name", "Name"));
        match ServiceError::from(errs) {
            ServiceError::Validation { fields, .. } => {
                assert_eq!(fields, vec![("Name".to_string(), CANT_BE_BLANK.to_string())]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
