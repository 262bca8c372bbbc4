//! Resource engine: declarative record descriptions, decoding of form and
//! JSON bodies into meta values, and the CRUD pipeline applying them.

pub mod admin;
pub mod convert;
pub mod crud;
pub mod error;
pub mod event;
pub mod field;
pub mod form_tree;
pub mod formkey;
pub mod meta;
pub mod meta_value;
pub mod nested;
pub mod processor;
pub mod resource;
pub mod schema;
pub mod store;

pub use admin::{AdminModule, admin_router};
pub use convert::{ENABLED_KEY, check_requirement, form_to_meta_values, json_to_meta_values};
pub use crud::Crud;
pub use error::ResourceError;
pub use event::{CrudAction, CrudEvent, EventDispatcher, EventHandler, EventStage, event_name};
pub use field::{
    BelongsTo, ContextScanner, FieldAccessor, FieldKind, FieldValue, Lens, ManyToMany, MetaValueScanner,
    StringsScanner, TimeParser, parse_bool, parse_time,
};
pub use form_tree::{DEFAULT_PREFIX, FormTree, TreeKey};
pub use formkey::{APPEND_INDEX, FormKeyPart, parse_form_key, render_form_key};
pub use meta::{Binding, Meta, NestedAccessor};
pub use meta_value::{FileHeader, MetaValue, MetaValues, RawValue};
pub use processor::{DESTROY_KEY, DecodeScope, Outcome, Processor, ProcessorFlags};
pub use resource::{
    BASIC_LAYOUT, DEFAULT_LAYOUT, Layout, Order, ParentRelation, Record, Resource, SINGLETON_ID,
};
pub use schema::{MetaInfo, MetaSchema, SiblingsCheck};
pub use store::{ListQuery, RecordStore, SqlRecordStore};
