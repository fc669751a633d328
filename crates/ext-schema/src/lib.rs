//! Schema-fragment model for platform extensions.
//!
//! This crate provides the strongly-typed data model extensions use to
//! declare entities, enumerations, and relationships, the document formats
//! they submit them in, the namespace grammar, and the host (core) schema
//! they build on.

pub mod document;
pub mod error;
pub mod field;
pub mod fragment;
pub mod host;
pub mod naming;
pub mod validation;

pub use document::FragmentDocument;
pub use error::{Error, FragmentViolation, Result};
pub use field::{FieldDef, FieldType};
pub use fragment::{
    CascadePolicy, EntityDef, EnumDef, FieldRef, IndexDef, PRIMARY_KEY, RelationshipDef,
    SchemaFragment, TargetRef,
};
pub use host::{HostEntity, HostSchema};
pub use naming::{HOST_NAMESPACE, Namespace, RESERVED_NAMESPACES};
pub use validation::validate_fragment;
