//! Applies decoded meta values to a record.
//!
//! A run goes through four stages: initialize (key, `_destroy`, load),
//! validate, decode, then the resource's processors. Validators and
//! processors return [`ControlFlow::Break`] to stop the remaining stages
//! without failing.

use std::ops::ControlFlow;
use std::sync::Arc;

use bitflags::bitflags;
use openerp_core::{Perm, PermissionMode, Permissioner};
use openerp_site::{Context, Errors, FieldError};
use tracing::debug;

use crate::error::ResourceError;
use crate::meta::Meta;
use crate::meta_value::{MetaValue, MetaValues};
use crate::resource::{Record, Resource};
use crate::store::RecordStore;

/// Posted key marking a record for deletion.
pub const DESTROY_KEY: &str = "_destroy";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProcessorFlags: u16 {
        /// Do nothing at all.
        const SKIP_LEFT = 1 << 0;
        const SKIP_REQUIRE_CHECK = 1 << 1;
        const SKIP_PROCESSORS = 1 << 2;
        const SKIP_VALIDATIONS = 1 << 3;
        const SKIP_PERMISSIONS = 1 << 4;
        /// Never load the record from the store by its posted ID.
        const SKIP_LOAD = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every stage ran.
    Done,
    /// A stage asked to skip the rest.
    Stopped,
    /// The values marked the record for deletion.
    Deleted,
}

/// State handed to nested accessors while decoding a parent record.
pub struct DecodeScope<'a> {
    pub ctx: &'a Context,
    pub flags: ProcessorFlags,
    /// Dotted path of the nested meta, used in field errors.
    pub path: String,
    /// Whether the parent record is new.
    pub new_record: bool,
    /// Permission of the nested meta, consulted when a child meta has none.
    pub permission: Option<Arc<dyn Permissioner>>,
}

enum Init {
    Continue { new_record: bool },
    Stop,
    Deleted,
}

pub struct Processor<'a, T: Record> {
    resource: &'a Resource<T>,
    ctx: &'a Context,
    values: &'a MetaValues,
    flags: ProcessorFlags,
    path: String,
    parent_permission: Option<Arc<dyn Permissioner>>,
    /// Newness of the enclosing record, used for keyless documents.
    parent_new: Option<bool>,
    store: Option<Arc<dyn RecordStore<T>>>,
}

fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

impl<'a, T: Record> Processor<'a, T> {
    pub fn new(resource: &'a Resource<T>, ctx: &'a Context, values: &'a MetaValues) -> Self {
        Self {
            resource,
            ctx,
            values,
            flags: ProcessorFlags::empty(),
            path: String::new(),
            parent_permission: None,
            parent_new: None,
            store: None,
        }
    }

    /// Processor for a nested document of a parent record.
    pub(crate) fn nested(
        resource: &'a Resource<T>,
        scope: &'a DecodeScope<'a>,
        values: &'a MetaValues,
        path: String,
    ) -> Self {
        Self {
            resource,
            ctx: scope.ctx,
            values,
            flags: (scope.flags | ProcessorFlags::SKIP_LOAD) - ProcessorFlags::SKIP_LEFT,
            path,
            parent_permission: scope.permission.clone(),
            parent_new: Some(scope.new_record),
            store: None,
        }
    }

    pub fn with_flags(mut self, flags: ProcessorFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Store used to load a record by its posted ID.
    pub fn with_store(mut self, store: Arc<dyn RecordStore<T>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn start(&self, record: &mut T) -> Result<Outcome, ResourceError> {
        if self.flags.contains(ProcessorFlags::SKIP_LEFT) {
            return Ok(Outcome::Stopped);
        }
        let new_record = match self.initialize(record)? {
            Init::Continue { new_record } => new_record,
            Init::Stop => return Ok(Outcome::Stopped),
            Init::Deleted => return Ok(Outcome::Deleted),
        };
        if self.validate(record)?.is_break() {
            return Ok(Outcome::Stopped);
        }
        self.commit(record, new_record)
    }

    fn label(&self) -> &str {
        if self.path.is_empty() {
            self.resource.name()
        } else {
            &self.path
        }
    }

    // ── Initialize ──────────────────────────────────────────────────

    fn initialize(&self, record: &mut T) -> Result<Init, ResourceError> {
        let mut new_record = if self.resource.has_key() {
            self.resource.is_new(record)
        } else {
            self.parent_new.unwrap_or(false)
        };
        if self.resource.has_key() {
            let destroy = self.values.get_string(DESTROY_KEY).trim().to_string();
            let deleted = !destroy.is_empty() && destroy != "0" && destroy != "false";

            if new_record {
                if let Some(id) = self.values.get("id") {
                    let id = id.first_string().trim();
                    if id.is_empty() {
                        if deleted {
                            return Ok(Init::Stop);
                        }
                    } else {
                        self.resource.set_id(record, id, self.ctx)?;
                        if !deleted && self.load(record)? {
                            new_record = false;
                        }
                    }
                }
                if deleted && self.resource.is_new(record) {
                    return Err(ResourceError::InvalidId(format!("ID value of {} is blank", self.label())));
                }
            }

            if deleted {
                if !self.flags.contains(ProcessorFlags::SKIP_PERMISSIONS)
                    && !self.resource.has_permission(PermissionMode::Delete, self.ctx)
                {
                    return Err(ResourceError::PermissionDenied(format!("delete {}", self.label())));
                }
                return Ok(Init::Deleted);
            }
        }
        if new_record {
            self.copy_parent_key(record)?;
        }
        Ok(Init::Continue { new_record })
    }

    fn load(&self, record: &mut T) -> Result<bool, ResourceError> {
        if self.flags.contains(ProcessorFlags::SKIP_LOAD) {
            return Ok(false);
        }
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let id = self.resource.render_id(record);
        match store.get(&id)? {
            Some(found) => {
                debug!(resource = %self.resource.name(), id = %id, "loaded record by posted ID");
                *record = found;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn copy_parent_key(&self, record: &mut T) -> Result<(), ResourceError> {
        let Some(rel) = self.resource.parent_relation() else {
            return Ok(());
        };
        let Some(meta) = self.resource.meta_by_name(&rel.fk_meta) else {
            return Ok(());
        };
        if !meta.is_zero(record, self.ctx) {
            return Ok(());
        }
        if let Some(parent_id) = self.ctx.parent_resource_id(rel.path_level) {
            let mv = MetaValue::leaf(meta.name(), parent_id);
            meta.set(record, &mv, self.ctx).map_err(ResourceError::InvalidId)?;
        }
        Ok(())
    }

    // ── Validate ────────────────────────────────────────────────────

    fn validate(&self, record: &T) -> Result<ControlFlow<()>, ResourceError> {
        if self.flags.contains(ProcessorFlags::SKIP_VALIDATIONS) {
            return Ok(ControlFlow::Continue(()));
        }
        let mut errors = Errors::new();
        let mut flow = ControlFlow::Continue(());
        for validator in self.resource.validators() {
            match validator(record, self.values, self.ctx) {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => {
                    flow = ControlFlow::Break(());
                    break;
                }
                Err(ResourceError::Validation(e)) => errors.extend(e),
                Err(e) => return Err(e),
            }
        }
        errors.into_result()?;
        Ok(flow)
    }

    // ── Commit ──────────────────────────────────────────────────────

    fn commit(&self, record: &mut T, new_record: bool) -> Result<Outcome, ResourceError> {
        let mut errors = Errors::new();
        self.decode(record, new_record, &mut errors)?;
        errors.into_result()?;

        if self.flags.contains(ProcessorFlags::SKIP_PROCESSORS) {
            return Ok(Outcome::Done);
        }
        let mut errors = Errors::new();
        for processor in self.resource.processors() {
            match processor(record, self.values, self.ctx) {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => break,
                Err(ResourceError::Validation(e)) => errors.extend(e),
                Err(e) => return Err(e),
            }
        }
        errors.into_result()?;
        Ok(Outcome::Done)
    }

    /// Whether the meta may be written in `mode`. A meta without its own
    /// policy falls back to the update permission of the enclosing meta.
    fn writable(&self, meta: &Meta<T>, mode: PermissionMode) -> bool {
        if self.flags.contains(ProcessorFlags::SKIP_PERMISSIONS) {
            return true;
        }
        let roles = self.ctx.roles();
        let mut perm = meta.has_permission(mode, roles);
        if perm == Perm::Undef {
            if let Some(p) = &self.parent_permission {
                perm = p.has_permission(PermissionMode::Update, roles);
            }
        }
        !perm.is_deny()
    }

    fn decode(&self, record: &mut T, new_record: bool, errors: &mut Errors) -> Result<(), ResourceError> {
        let mode = if new_record {
            PermissionMode::Create
        } else {
            PermissionMode::Update
        };

        let mut documents = Vec::new();
        for mv in self.values {
            if mv.name == "id" || mv.name == DESTROY_KEY || mv.name.starts_with('@') {
                continue;
            }
            let Some(meta) = self.resource.meta_by_name(&mv.name) else {
                continue;
            };
            if !self.writable(meta, mode) {
                debug!(resource = %self.resource.name(), meta = %meta.name(), "meta not writable, skipped");
                continue;
            }
            if mv.children.is_some() {
                documents.push((meta, mv));
            } else {
                self.set_leaf(record, meta, mv, errors);
            }
        }

        for (meta, mv) in documents {
            let Some(children) = &mv.children else {
                continue;
            };
            if children.disabled {
                if meta.is_relation() {
                    meta.clear(record);
                }
                continue;
            }
            if !children.is_empty() {
                if !meta.is_required() && children.is_blank() {
                    continue;
                }
                if let Some(nested) = meta.nested() {
                    self.decode_nested(record, meta, nested.as_ref(), mv, new_record, errors)?;
                    continue;
                }
            }
            self.set_leaf(record, meta, mv, errors);
        }
        Ok(())
    }

    fn decode_nested(
        &self,
        record: &mut T,
        meta: &Meta<T>,
        nested: &dyn crate::meta::NestedAccessor<T>,
        mv: &MetaValue,
        new_record: bool,
        errors: &mut Errors,
    ) -> Result<(), ResourceError> {
        let path = join_path(&self.path, meta.name());
        if !new_record && nested.is_zero(record) {
            if let Some(loader) = meta.related_loader() {
                if let Err(msg) = loader(record, self.ctx) {
                    errors.push_field(FieldError::new(path, meta.label_text(), msg));
                    return Ok(());
                }
            }
        }
        let scope = DecodeScope {
            ctx: self.ctx,
            flags: self.flags,
            path,
            new_record,
            permission: meta.permissioner().cloned(),
        };
        match nested.decode(record, mv, &scope) {
            Ok(()) => Ok(()),
            Err(ResourceError::Validation(e)) => {
                errors.extend(e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn set_leaf(&self, record: &mut T, meta: &Meta<T>, mv: &MetaValue, errors: &mut Errors) {
        let path = join_path(&self.path, meta.name());
        if let Err(msg) = meta.set(record, mv, self.ctx) {
            errors.push_field(FieldError::new(path, meta.label_text(), msg));
            return;
        }
        if !self.flags.contains(ProcessorFlags::SKIP_REQUIRE_CHECK)
            && meta.is_required()
            && meta.is_zero(record, self.ctx)
        {
            errors.push_field(FieldError::cant_be_blank(path, meta.label_text()));
        }
    }
}
