//! Query criteria and statement assembly.
//!
//! - **Criteria**: root query criteria, also the shape of named scopes
//! - **JoinQuery**: the query assembler fed by join nodes
//! - **Statement**: rendered SQL with named parameters

pub mod criteria;
#[doc(inline)]
pub use criteria::Criteria;

pub mod join_query;
#[doc(inline)]
pub use join_query::JoinQuery;

pub mod statement;
#[doc(inline)]
pub use statement::Statement;
