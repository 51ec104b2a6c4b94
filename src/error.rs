//! Finder error types
//!
//! Every error is fail-fast: a misconfigured relation aborts the whole
//! invocation rather than silently dropping a join branch.

use crate::executor::ExecutorError;
use std::fmt;

/// Errors raised while building, executing or decoding a join tree
#[derive(Debug)]
pub enum FinderError {
    /// The relation is not defined for the entity type
    UnknownRelation { entity: String, relation: String },
    /// The named scope is not defined for the entity type
    UnknownScope { entity: String, scope: String },
    /// The entity type is not registered in the schema catalog
    UnknownEntity(String),
    /// A junction table named by a many-to-many relation is not in the catalog
    UnknownTable {
        entity: String,
        relation: String,
        table: String,
    },
    /// A Stat relation was given nested relations
    InvalidNesting { relation: String },
    /// An explicit select entry is neither a column nor an aliased expression
    InvalidColumn { entity: String, column: String },
    /// A declared foreign key column does not exist in the table that must hold it
    InvalidForeignKey {
        entity: String,
        relation: String,
        key: String,
        table: String,
    },
    /// The foreign key does not reference both sides of the join
    IncompleteForeignKey { entity: String, relation: String },
    /// A record lacks an attribute needed to pin a lazy-load condition
    MissingAttribute { entity: String, attribute: String },
    /// `populate_record` was called before a statement was built
    QueryNotBuilt,
    /// The executing collaborator failed
    Execution(ExecutorError),
}

impl fmt::Display for FinderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinderError::UnknownRelation { entity, relation } => write!(
                f,
                "Relation \"{relation}\" is not defined in entity \"{entity}\""
            ),
            FinderError::UnknownScope { entity, scope } => {
                write!(f, "Scope \"{scope}\" is not defined in entity \"{entity}\"")
            }
            FinderError::UnknownEntity(name) => {
                write!(f, "Entity \"{name}\" is not registered in the schema catalog")
            }
            FinderError::UnknownTable {
                entity,
                relation,
                table,
            } => write!(
                f,
                "The relation \"{relation}\" in entity \"{entity}\" is not specified correctly: \
                 the join table \"{table}\" cannot be found in the database"
            ),
            FinderError::InvalidNesting { relation } => write!(
                f,
                "The STAT relation \"{relation}\" cannot have child relations"
            ),
            FinderError::InvalidColumn { entity, column } => write!(
                f,
                "Entity \"{entity}\" is trying to select an invalid column \"{column}\". \
                 The column must exist in the table or be an expression with alias"
            ),
            FinderError::InvalidForeignKey {
                entity,
                relation,
                key,
                table,
            } => write!(
                f,
                "The relation \"{relation}\" in entity \"{entity}\" is specified with an invalid \
                 foreign key \"{key}\": there is no such column in the table \"{table}\""
            ),
            FinderError::IncompleteForeignKey { entity, relation } => write!(
                f,
                "The relation \"{relation}\" in entity \"{entity}\" is specified with an incomplete \
                 foreign key. The foreign key must consist of columns referencing both joining tables"
            ),
            FinderError::MissingAttribute { entity, attribute } => write!(
                f,
                "Record of entity \"{entity}\" has no attribute \"{attribute}\""
            ),
            FinderError::QueryNotBuilt => {
                write!(f, "No statement has been built for this finder yet")
            }
            FinderError::Execution(e) => write!(f, "Execution error: {e}"),
        }
    }
}

impl std::error::Error for FinderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FinderError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ExecutorError> for FinderError {
    fn from(err: ExecutorError) -> Self {
        FinderError::Execution(err)
    }
}
