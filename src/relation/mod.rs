//! Relation descriptors and loading strategies.
//!
//! - **Def**: relation descriptors (`RelationDef`, `RelationKind`, foreign keys)
//! - **Identity**: primary key shapes and key values
//! - **Spec**: which relations a finder loads (`RelationSpec`, `RelationOptions`)
//! - **Eager**: full eager finds, deferring to-many relations when needed
//! - **Lazy**: loading one relation of an existing record on demand

pub mod identity;
#[doc(inline)]
pub use identity::{KeyValue, PrimaryKey};

pub mod def;
#[doc(inline)]
pub use def::{ForeignKey, JoinType, Junction, RelationDef, RelationKind, Selection};

pub mod spec;
#[doc(inline)]
pub use spec::{RelationOptions, RelationSpec};

pub mod eager;
#[doc(inline)]
pub use eager::{find_all, find_with_base};

pub mod lazy;
#[doc(inline)]
pub use lazy::LazyLoader;
