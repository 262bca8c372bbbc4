//! Record actions of a resource, bound to one request context.

use std::sync::Arc;

use openerp_core::{ListParams, ListResult, PermissionMode, new_id};
use openerp_site::Context;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ResourceError;
use crate::event::{CrudAction, CrudEvent, EventDispatcher, EventStage};
use crate::meta_value::MetaValues;
use crate::processor::{Outcome, Processor, ProcessorFlags};
use crate::resource::{Record, Resource, SINGLETON_ID};
use crate::store::{ListQuery, RecordStore, SqlRecordStore};

pub struct Crud<'a, T: Record> {
    resource: &'a Resource<T>,
    ctx: Context,
    store: Arc<dyn RecordStore<T>>,
    events: EventDispatcher<T>,
}

impl<T: Record> Resource<T> {
    /// Actions on this resource within `ctx`.
    pub fn crud(&self, ctx: &Context) -> Result<Crud<'_, T>, ResourceError> {
        Crud::new(self, ctx)
    }
}

impl<'a, T: Record> Crud<'a, T> {
    /// Uses the resource's own store, else an SQL store on the context's DB.
    pub fn new(resource: &'a Resource<T>, ctx: &Context) -> Result<Self, ResourceError> {
        let store: Arc<dyn RecordStore<T>> = match resource.store() {
            Some(s) => s.clone(),
            None => {
                let db = ctx.db().ok_or_else(|| {
                    ResourceError::NoStore(format!("{}: no store configured and no DB in context", resource.name()))
                })?;
                Arc::new(SqlRecordStore::new(db.store()?, resource.table()))
            }
        };
        Ok(Self {
            resource,
            ctx: ctx.clone(),
            store,
            events: EventDispatcher::new(),
        })
    }

    /// Handler for this call only, run after the resource's handlers.
    pub fn on<F>(mut self, event: &str, f: F) -> Self
    where
        F: Fn(&CrudEvent<'_>, Option<&mut T>) -> Result<(), ResourceError> + Send + Sync + 'static,
    {
        self.events.on(event, f);
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    // ── Events ──────────────────────────────────────────────────────

    fn fire(
        &self,
        action: CrudAction,
        stage: EventStage,
        id: Option<&str>,
        mut record: Option<&mut T>,
    ) -> Result<(), ResourceError> {
        let event = CrudEvent {
            action,
            stage,
            resource: self.resource.name(),
            ctx: &self.ctx,
            id,
            error: None,
        };
        self.resource.events().dispatch(&event, record.as_deref_mut())?;
        self.events.dispatch(&event, record)
    }

    /// Run `f`; a failure fires the action's error event.
    fn guarded<R>(
        &self,
        action: CrudAction,
        id: Option<&str>,
        f: impl FnOnce(&Self) -> Result<R, ResourceError>,
    ) -> Result<R, ResourceError> {
        f(self).inspect_err(|err| {
            let event = CrudEvent {
                action,
                stage: EventStage::Error,
                resource: self.resource.name(),
                ctx: &self.ctx,
                id,
                error: Some(err),
            };
            let handled = self
                .resource
                .events()
                .dispatch(&event, None)
                .and_then(|_| self.events.dispatch(&event, None));
            if let Err(e) = handled {
                warn!(resource = %self.resource.name(), event = %event.name(), error = %e, "error handler failed");
            }
        })
    }

    fn require(&self, mode: PermissionMode) -> Result<(), ResourceError> {
        if self.resource.has_permission(mode, &self.ctx) {
            Ok(())
        } else {
            Err(ResourceError::PermissionDenied(format!(
                "{} {}",
                mode.as_str(),
                self.resource.name()
            )))
        }
    }

    /// Canonical key for `id`.
    fn key(&self, id: &str) -> Result<String, ResourceError> {
        if self.resource.is_singleton() {
            return Ok(SINGLETON_ID.to_string());
        }
        self.resource.canonical_id(id)
    }

    fn parent_filter(&self) -> Option<String> {
        let rel = self.resource.parent_relation()?;
        self.ctx.parent_resource_id(rel.path_level).map(str::to_string)
    }

    fn parent_of(&self, record: &T) -> Option<String> {
        let rel = self.resource.parent_relation()?;
        let meta = self.resource.meta_by_name(&rel.fk_meta)?;
        match meta.field_value(record) {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
            _ => self.parent_filter(),
        }
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn count(&self) -> Result<u64, ResourceError> {
        self.require(PermissionMode::Read)?;
        self.guarded(CrudAction::Count, None, |c| {
            c.fire(CrudAction::Count, EventStage::Before, None, None)?;
            let n = c.store.count(c.parent_filter().as_deref())?;
            c.fire(CrudAction::Count, EventStage::On, None, None)?;
            c.fire(CrudAction::Count, EventStage::After, None, None)?;
            Ok(n)
        })
    }

    /// Record with `id`. A singleton that was never saved reads as its
    /// default value.
    pub fn find_one(&self, id: &str) -> Result<T, ResourceError> {
        self.require(PermissionMode::Read)?;
        let key = self.key(id)?;
        self.guarded(CrudAction::FindOne, Some(&key), |c| {
            c.fire(CrudAction::FindOne, EventStage::Before, Some(&key), None)?;
            let mut record = match c.store.get(&key)? {
                Some(r) => r,
                None if c.resource.is_singleton() => T::default(),
                None => return Err(ResourceError::NotFound(format!("{} {key}", c.resource.name()))),
            };
            c.fire(CrudAction::FindOne, EventStage::On, Some(&key), Some(&mut record))?;
            c.fire(CrudAction::FindOne, EventStage::After, Some(&key), Some(&mut record))?;
            Ok(record)
        })
    }

    /// A page of records in the resource's key order, restricted to the
    /// context's parent record for child resources.
    pub fn find_many(&self, params: &ListParams) -> Result<ListResult<T>, ResourceError> {
        self.require(PermissionMode::Read)?;
        self.guarded(CrudAction::FindMany, None, |c| {
            c.fire(CrudAction::FindMany, EventStage::Before, None, None)?;
            let parent = c.parent_filter();
            let query = ListQuery {
                limit: params.limit,
                offset: params.offset,
                order: c.resource.order_by(),
                parent: parent.clone(),
            };
            let items = c.store.list(&query)?;
            let total = c.store.count(parent.as_deref())? as usize;
            c.fire(CrudAction::FindMany, EventStage::On, None, None)?;
            c.fire(CrudAction::FindMany, EventStage::After, None, None)?;
            Ok(ListResult { items, total })
        })
    }

    // ── Writes ──────────────────────────────────────────────────────

    /// Decode `values` into a fresh record and insert it.
    pub fn create(&self, values: &MetaValues) -> Result<T, ResourceError> {
        self.require(PermissionMode::Create)?;
        let mut record = T::default();
        let outcome = Processor::new(self.resource, &self.ctx, values)
            .with_flags(ProcessorFlags::SKIP_LOAD)
            .start(&mut record)?;
        match outcome {
            Outcome::Done => self.insert(record),
            Outcome::Stopped => Ok(record),
            Outcome::Deleted => Err(ResourceError::Body(format!(
                "cannot destroy a {} that is being created",
                self.resource.name()
            ))),
        }
    }

    /// Decode `values` onto the stored record with `id` and save it. A
    /// `_destroy` mark deletes the record instead.
    pub fn update(&self, id: &str, values: &MetaValues) -> Result<T, ResourceError> {
        self.require(PermissionMode::Update)?;
        let key = self.key(id)?;
        let mut record = self.find_one(&key)?;
        let mut ctx = self.ctx.clone();
        ctx.set_resource_id(key.clone());
        let outcome = Processor::new(self.resource, &ctx, values)
            .with_flags(ProcessorFlags::SKIP_LOAD)
            .start(&mut record)?;
        match outcome {
            Outcome::Done => self.save(record),
            Outcome::Stopped => Ok(record),
            Outcome::Deleted => {
                self.delete(&key)?;
                Ok(record)
            }
        }
    }

    /// Persist `record`: insert when its key is blank, update otherwise.
    pub fn save(&self, record: T) -> Result<T, ResourceError> {
        if self.resource.is_new(&record) {
            self.require(PermissionMode::Create)?;
            return self.insert(record);
        }
        self.require(PermissionMode::Update)?;
        let id = self.resource.render_id(&record);
        self.guarded(CrudAction::Save, Some(&id), |c| {
            let mut record = record;
            c.fire(CrudAction::Save, EventStage::Before, Some(&id), Some(&mut record))?;
            match c.store.update(&id, &record) {
                Err(e) if e.is_not_found() && c.resource.is_singleton() => c.store.insert(&id, None, &record)?,
                other => other?,
            }
            debug!(resource = %c.resource.name(), id = %id, "record saved");
            c.fire(CrudAction::Save, EventStage::On, Some(&id), Some(&mut record))?;
            c.fire(CrudAction::Save, EventStage::After, Some(&id), Some(&mut record))?;
            Ok(record)
        })
    }

    fn insert(&self, record: T) -> Result<T, ResourceError> {
        self.guarded(CrudAction::Create, None, |c| {
            let mut record = record;
            c.fire(CrudAction::Create, EventStage::Before, None, Some(&mut record))?;
            c.assign_key(&mut record)?;
            let id = c.resource.render_id(&record);
            c.store.insert(&id, c.parent_of(&record).as_deref(), &record)?;
            debug!(resource = %c.resource.name(), id = %id, "record created");
            c.fire(CrudAction::Create, EventStage::On, Some(&id), Some(&mut record))?;
            c.fire(CrudAction::Create, EventStage::After, Some(&id), Some(&mut record))?;
            Ok(record)
        })
    }

    /// Give a keyless record a fresh key.
    fn assign_key(&self, record: &mut T) -> Result<(), ResourceError> {
        if !self.resource.is_new(record) {
            return Ok(());
        }
        let fresh = if self.resource.has_numeric_key() {
            self.store.next_int_id()?.to_string()
        } else if self.resource.primary_metas().len() == 1 {
            new_id()
        } else {
            return Err(ResourceError::InvalidId(format!(
                "compound key of {} must be posted",
                self.resource.name()
            )));
        };
        self.resource.set_id(record, &fresh, &self.ctx)
    }

    /// Delete the record with `id`.
    pub fn delete(&self, id: &str) -> Result<(), ResourceError> {
        self.require(PermissionMode::Delete)?;
        let key = self.key(id)?;
        if !self.resource.is_singleton() {
            debug!(
                resource = %self.resource.name(),
                params = ?self.resource.to_primary_query_params(&key)?,
                "locating record to delete"
            );
        }
        let Some(record) = self.store.get(&key)? else {
            return Err(ResourceError::NotFound(format!("{} {key}", self.resource.name())));
        };
        self.guarded(CrudAction::Delete, Some(&key), |c| {
            let mut record = record;
            c.fire(CrudAction::Delete, EventStage::Before, Some(&key), Some(&mut record))?;
            if !c.store.delete(&key)? {
                return Err(ResourceError::NotFound(format!("{} {key}", c.resource.name())));
            }
            c.fire(CrudAction::Delete, EventStage::On, Some(&key), Some(&mut record))?;
            c.fire(CrudAction::Delete, EventStage::After, Some(&key), Some(&mut record))?;
            Ok(())
        })
    }
}
