//! Events fired around every record action.
//!
//! Each action fires `beforeX`, then `X` once the store call succeeded,
//! then `afterX`. Once `beforeX` is due, a failure fires `XError` instead
//! of the rest.
//! A handler returning an error aborts the action.

use std::fmt;
use std::sync::Arc;

use openerp_site::Context;

use crate::error::ResourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudAction {
    Count,
    Create,
    Save,
    Delete,
    FindOne,
    FindMany,
}

impl CrudAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrudAction::Count => "count",
            CrudAction::Create => "create",
            CrudAction::Save => "save",
            CrudAction::Delete => "delete",
            CrudAction::FindOne => "findOne",
            CrudAction::FindMany => "findMany",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStage {
    Before,
    On,
    After,
    Error,
}

fn capitalize(s: &str) -> String {
    let mut cs = s.chars();
    match cs.next() {
        Some(first) => first.to_uppercase().chain(cs).collect(),
        None => String::new(),
    }
}

/// Event name such as `beforeCreate`, `create`, `afterCreate` or
/// `createError`.
pub fn event_name(action: CrudAction, stage: EventStage) -> String {
    let a = action.as_str();
    match stage {
        EventStage::Before => format!("before{}", capitalize(a)),
        EventStage::On => a.to_string(),
        EventStage::After => format!("after{}", capitalize(a)),
        EventStage::Error => format!("{a}Error"),
    }
}

pub struct CrudEvent<'a> {
    pub action: CrudAction,
    pub stage: EventStage,
    pub resource: &'a str,
    pub ctx: &'a Context,
    /// Rendered ID of the record, when there is one.
    pub id: Option<&'a str>,
    /// Failure that triggered an error event.
    pub error: Option<&'a ResourceError>,
}

impl CrudEvent<'_> {
    pub fn name(&self) -> String {
        event_name(self.action, self.stage)
    }
}

impl fmt::Debug for CrudEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudEvent")
            .field("name", &self.name())
            .field("resource", &self.resource)
            .field("id", &self.id)
            .finish()
    }
}

/// Handler receiving the event and, for single-record actions, the record.
pub type EventHandler<T> =
    Arc<dyn Fn(&CrudEvent<'_>, Option<&mut T>) -> Result<(), ResourceError> + Send + Sync>;

/// Ordered handler list, optionally filtered by event name.
pub struct EventDispatcher<T> {
    handlers: Vec<(Option<String>, EventHandler<T>)>,
}

impl<T> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self { handlers: Vec::new() }
    }
}

impl<T> Clone for EventDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<T> EventDispatcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle events named `name`.
    pub fn on<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&CrudEvent<'_>, Option<&mut T>) -> Result<(), ResourceError> + Send + Sync + 'static,
    {
        self.handlers.push((Some(name.to_string()), Arc::new(f)));
    }

    /// Handle every event.
    pub fn on_any<F>(&mut self, f: F)
    where
        F: Fn(&CrudEvent<'_>, Option<&mut T>) -> Result<(), ResourceError> + Send + Sync + 'static,
    {
        self.handlers.push((None, Arc::new(f)));
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run matching handlers in order; the first error stops the run and
    /// is returned as an abort of the event.
    pub fn dispatch(&self, event: &CrudEvent<'_>, mut record: Option<&mut T>) -> Result<(), ResourceError> {
        if self.handlers.is_empty() {
            return Ok(());
        }
        let name = event.name();
        for (filter, handler) in &self.handlers {
            if filter.as_deref().is_some_and(|f| f != name) {
                continue;
            }
            handler(event, record.as_deref_mut()).map_err(|e| match e {
                ResourceError::Aborted { .. } => e,
                other => ResourceError::Aborted {
                    event: name.clone(),
                    message: other.to_string(),
                },
            })?;
        }
        Ok(())
    }
}
