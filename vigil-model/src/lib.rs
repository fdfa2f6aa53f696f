//! Entity model for Vigil.
//!
//! Defines the per-object attribute store every replication layer builds on:
//! - [`TypeDescriptor`] / [`FieldDescriptor`] — per-kind field table (kind, access class, default)
//! - [`Entity`] — a live object with its attribute overlay, version counter and lifecycle flags
//! - [`ObjectRegistry`] — lookup and enumeration of objects by type and name
//! - [`ChangeBus`] / [`EntityChange`] — typed notifications for applied mutations
//! - [`Mutation`] — the replicated runtime changes (check results, toggles, comments, ...)
//! - [`LifecycleHooks`] — optional per-kind callbacks for activation, authority and state load
//!
//! Snapshot persistence lives in `vigil-storage`; wire translation in `vigil-sync`.

mod bus;
pub mod checkable;
mod entity;
mod error;
mod hooks;
mod mutation;
mod registry;
pub mod schema;

pub use bus::{ChangeBus, EntityChange};
pub use checkable::{
    Acknowledgement, AcknowledgementType, CheckResult, Comment, CommentType, Downtime, PerfdataEntry,
    PerfdataValue, ServiceState, ACKNOWLEDGEMENT_COMMENT_ID,
};
pub use entity::{AttributeEditor, Authority, Entity, ObjectLookup, VERSION_KEY};
pub use error::{ModelError, ModelResult};
pub use hooks::{LifecycleHooks, NoHooks};
pub use mutation::{Feature, Mutation};
pub use registry::{service_name, ObjectRegistry};
pub use schema::{types, FieldDescriptor, FieldKind, TypeDescriptor};
