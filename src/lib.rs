//! # Active Finder
//!
//! Relational eager/lazy loading over PostgreSQL.
//!
//! Given a base entity type and a nested specification of relations
//! (belongs-to, has-one, has-many, many-many, through and stat relations),
//! an [`ActiveFinder`] plans one join tree, compiles it into as few SQL
//! statements as the row limits allow and decodes the flat result rows
//! into a graph of deduplicated [`Record`]s. Relations that were not joined
//! can be fetched later with a [`LazyLoader`].
//!
//! The schema catalog and relation registry are read-only collaborators
//! passed in explicitly ([`SchemaCatalog`], [`RelationRegistry`]); SQL runs
//! through a [`FinderExecutor`].

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod finder;
pub mod metrics;
pub mod query;
pub mod record;
pub mod registry;
pub mod relation;
pub mod schema;
pub mod value;

pub use config::{DatabaseConfig, FinderConfig};
pub use connection::ConnectionError;
pub use error::FinderError;
pub use executor::{ExecutorError, FinderExecutor, MayPostgresExecutor};
pub use finder::{ActiveFinder, JoinNode, JoinTree, NodeId, ROOT};
pub use query::{Criteria, JoinQuery, Statement};
pub use record::{Record, RecordRef, Related};
pub use registry::{Registry, RelationRegistry, SchemaCatalog};
pub use relation::{
    ForeignKey, JoinType, Junction, KeyValue, LazyLoader, PrimaryKey, RelationDef, RelationKind,
    RelationOptions, RelationSpec, Selection,
};
pub use schema::{EntityType, ForeignKeyRef, TableSchema};
pub use value::Row;
