//! The finder: one join tree serving one logical query invocation.
//!
//! An [`ActiveFinder`] is built for a base entity and a list of relation
//! specifications. It compiles the tree into SQL, decodes rows into a
//! deduplicated record graph, resolves deferred and lazy relations with
//! follow-up statements and counts base records.
//!
//! # Example
//!
//! ```no_run
//! use active_finder::{ActiveFinder, Criteria, FinderExecutor, Registry};
//!
//! # fn run(registry: &Registry, executor: &dyn FinderExecutor) -> Result<(), active_finder::FinderError> {
//! let mut finder = ActiveFinder::new(registry, "Order", &["items.product".into()])?;
//! let orders = finder.find_all(executor, &Criteria::new().limit(20))?;
//! for order in &orders {
//!     println!("{} items", order.borrow().many("items").len());
//! }
//! finder.destroy();
//! # Ok(())
//! # }
//! ```

pub mod node;
#[doc(inline)]
pub use node::{JoinNode, NodeId, RecordCache, ROOT};

pub mod tree;
#[doc(inline)]
pub use tree::JoinTree;

pub(crate) mod join;
pub(crate) mod populate;
pub(crate) mod stat;

use crate::config::FinderConfig;
use crate::error::FinderError;
use crate::executor::FinderExecutor;
use crate::query::criteria::Criteria;
use crate::query::join_query::JoinQuery;
use crate::query::statement::Statement;
use crate::record::RecordRef;
use crate::registry::RelationRegistry;
use crate::relation::def::{RelationKind, Selection};
use crate::relation::spec::RelationSpec;
use crate::schema::quote_column_name;
use crate::value::{display_value, Row};
use join::{JoinPolicy, ParamNames};

/// Eager/lazy loading finder for one base entity type
pub struct ActiveFinder<'a> {
    registry: &'a dyn RelationRegistry,
    pub(crate) config: FinderConfig,
    pub(crate) tree: JoinTree<'a>,
    query: Option<JoinQuery>,
    pub(crate) policy: JoinPolicy,
    pub(crate) names: ParamNames,
}

impl std::fmt::Debug for ActiveFinder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveFinder")
            .field("entity", &self.tree.root().entity().name)
            .field("nodes", &self.tree.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> ActiveFinder<'a> {
    /// Finder with the default configuration
    ///
    /// # Errors
    ///
    /// Returns the first error raised while building the join tree.
    pub fn new(
        registry: &'a dyn RelationRegistry,
        entity: &str,
        with: &[RelationSpec],
    ) -> Result<Self, FinderError> {
        Self::with_config(registry, entity, with, FinderConfig::default())
    }

    /// Finder with explicit alias and join settings
    ///
    /// # Errors
    ///
    /// Returns the first error raised while building the join tree.
    pub fn with_config(
        registry: &'a dyn RelationRegistry,
        entity: &str,
        with: &[RelationSpec],
        config: FinderConfig,
    ) -> Result<Self, FinderError> {
        let tree = JoinTree::build(
            registry,
            entity,
            with,
            &config.root_alias,
            &config.column_alias_prefix,
        )?;
        Ok(Self {
            registry,
            policy: JoinPolicy {
                join_all: config.join_all,
                base_limited: false,
            },
            config,
            tree,
            query: None,
            names: ParamNames::default(),
        })
    }

    pub fn tree(&self) -> &JoinTree<'a> {
        &self.tree
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Root criteria with the named scopes of the base entity merged in
    fn resolve_criteria(&self, criteria: &Criteria) -> Result<Criteria, FinderError> {
        let mut resolved = criteria.clone();
        let entity = &self.tree.root().entity().name;
        for name in &criteria.scopes {
            let scope = self
                .registry
                .scope(entity, name)
                .ok_or_else(|| FinderError::UnknownScope {
                    entity: entity.clone(),
                    scope: name.clone(),
                })?;
            resolved.merge(scope);
        }
        Ok(resolved)
    }

    fn prepare(&mut self, criteria: &Criteria, policy: JoinPolicy) -> Result<JoinQuery, FinderError> {
        let alias = criteria
            .alias
            .clone()
            .unwrap_or_else(|| self.config.root_alias.clone());
        self.tree.set_root_alias(&alias);
        self.tree.reset_joined();
        self.policy = policy;

        let mut query = join::root_query(&mut self.tree, criteria)?;
        join::build_children(&mut self.tree, &mut query, ROOT, policy)?;
        Ok(query)
    }

    /// Compile the base statement for `criteria`.
    ///
    /// Singular relations are always joined. Plural relations are joined
    /// unless the criteria bound the base rows with LIMIT/OFFSET, in which
    /// case they are left for follow-up statements. The compiled query is
    /// kept for [`populate_record`](Self::populate_record).
    ///
    /// # Errors
    ///
    /// `UnknownScope`, `InvalidColumn`, `InvalidForeignKey` or
    /// `IncompleteForeignKey` when the tree cannot be compiled.
    pub fn build_query(&mut self, criteria: &Criteria) -> Result<Statement, FinderError> {
        let criteria = self.resolve_criteria(criteria)?;
        let policy = JoinPolicy {
            join_all: self.config.join_all || criteria.together == Some(true),
            base_limited: criteria.is_limited(),
        };
        self.compile(&criteria, policy)
    }

    /// Build and keep the base statement for resolved criteria
    fn compile(&mut self, criteria: &Criteria, policy: JoinPolicy) -> Result<Statement, FinderError> {
        let query = self.prepare(criteria, policy)?;
        let statement = query.build();
        log::debug!(
            "prepared {} statement ({} params): {}",
            self.tree.root().entity().name,
            statement.params.len(),
            statement.sql
        );
        self.query = Some(query);
        Ok(statement)
    }

    /// Decode one row of the statement returned by [`build_query`](Self::build_query)
    ///
    /// # Errors
    ///
    /// Returns `FinderError::QueryNotBuilt` if no statement was built.
    pub fn populate_record(&mut self, row: &Row) -> Result<Option<RecordRef>, FinderError> {
        let query = self.query.as_ref().ok_or(FinderError::QueryNotBuilt)?;
        Ok(populate::populate_node(&mut self.tree, query, ROOT, row))
    }

    /// Run the base statement and every deferred and stat relation
    ///
    /// # Errors
    ///
    /// Compilation errors as for [`build_query`](Self::build_query), or
    /// `FinderError::Execution` when a statement fails.
    pub fn find_all<Ex>(&mut self, executor: &Ex, criteria: &Criteria) -> Result<Vec<RecordRef>, FinderError>
    where
        Ex: FinderExecutor + ?Sized,
    {
        crate::relation::eager::find_all(self, executor, criteria)
    }

    /// Load the tree's relations for records that were fetched elsewhere
    ///
    /// # Errors
    ///
    /// `MissingAttribute` if a record lacks its primary key, compilation and
    /// execution errors otherwise.
    pub fn find_with_base<Ex>(&mut self, executor: &Ex, records: &[RecordRef]) -> Result<(), FinderError>
    where
        Ex: FinderExecutor + ?Sized,
    {
        crate::relation::eager::find_with_base(self, executor, records)
    }

    /// Stream the base statement, one root record per row.
    ///
    /// Every relation is joined into the streamed statement, whatever the
    /// LIMIT/OFFSET or `together` settings, since no follow-up statement can
    /// see the records of earlier rows. Stat relations are queried for the
    /// records of each row before it is handed to `f`.
    ///
    /// Every record cache is released after each row so memory stays
    /// bounded; a parent repeated over several rows is therefore handed to
    /// `f` once per row. Returning `false` from `f` stops the iteration.
    /// Returns the number of records handed to `f`.
    ///
    /// # Errors
    ///
    /// Compilation errors, or `FinderError::Execution` when reading the
    /// rows or a stat query fails.
    pub fn for_each_row<Ex, F>(&mut self, executor: &Ex, criteria: &Criteria, mut f: F) -> Result<usize, FinderError>
    where
        Ex: FinderExecutor + ?Sized,
        F: FnMut(RecordRef) -> bool,
    {
        let criteria = self.resolve_criteria(criteria)?;
        let policy = JoinPolicy {
            join_all: true,
            base_limited: false,
        };
        let statement = self.compile(&criteria, policy)?;
        let (sql, values) = statement.to_positional();
        let query = self.take_query()?;

        let with_stats: Vec<NodeId> = (0..self.tree.len())
            .filter(|id| query.elements.contains(id) && !self.tree.node(*id).stats().is_empty())
            .collect();
        let tree = &mut self.tree;
        let names = &mut self.names;
        let mut delivered = 0;
        let mut failure = None;
        let result = executor.for_each_row(&sql, &values, &mut |row| {
            let Some(record) = populate::populate_node(tree, &query, ROOT, &row) else {
                tree.clear_records();
                return Ok(true);
            };
            for &id in &with_stats {
                if let Err(err) = stat::run_stats(tree, executor, id, names) {
                    failure = Some(err);
                    break;
                }
            }
            tree.clear_records();
            if failure.is_some() {
                return Ok(false);
            }
            delivered += 1;
            Ok(f(record))
        });
        self.restore_query(query);
        result?;
        match failure {
            Some(err) => Err(err),
            None => Ok(delivered),
        }
    }

    /// Resolve this finder's relations for one existing record
    ///
    /// # Errors
    ///
    /// `MissingAttribute` if the record lacks a key needed by the lazy
    /// condition, compilation and execution errors otherwise.
    pub fn lazy_find<Ex>(&mut self, executor: &Ex, record: &RecordRef) -> Result<(), FinderError>
    where
        Ex: FinderExecutor + ?Sized,
    {
        crate::relation::lazy::lazy_find(self, executor, record)
    }

    /// Count statement for `criteria`.
    ///
    /// Every relation is joined and LIMIT/OFFSET are dropped. Grouped
    /// criteria are counted as a subquery. Otherwise an explicit `COUNT...`
    /// select is used verbatim, and `COUNT(DISTINCT pk)` replaces `COUNT(*)`
    /// when a joined plural relation multiplies the base rows.
    ///
    /// # Errors
    ///
    /// Compilation errors as for [`build_query`](Self::build_query).
    pub fn build_count(&mut self, criteria: &Criteria) -> Result<Statement, FinderError> {
        let mut criteria = self.resolve_criteria(criteria)?;
        let explicit = match &criteria.select {
            Selection::Columns(items) => {
                let select = items.join(", ");
                select
                    .trim_start()
                    .to_ascii_lowercase()
                    .starts_with("count")
                    .then_some(select)
            }
            _ => None,
        };
        if explicit.is_some() {
            criteria.select = Selection::All;
        }

        let mut query = self.prepare(
            &criteria,
            JoinPolicy {
                join_all: true,
                base_limited: false,
            },
        )?;
        query.limit = None;
        query.offset = None;

        let statement = if !criteria.group.trim().is_empty() || !criteria.having.trim().is_empty() {
            query.orders.clear();
            let inner = query.build();
            Statement::new(format!("SELECT COUNT(*) FROM ({}) sq", inner.sql), inner.params)
        } else {
            let select = match explicit {
                Some(select) => select,
                None if self.fans_out(&query) => self.distinct_key_count(),
                None => "COUNT(*)".to_string(),
            };
            query.selects = vec![select];
            query.distinct = false;
            query.orders.clear();
            query.groups.clear();
            query.havings.clear();
            query.build()
        };
        log::debug!("prepared count ({} params): {}", statement.params.len(), statement.sql);
        Ok(statement)
    }

    /// Number of base records matching `criteria`, as text to keep precision
    ///
    /// # Errors
    ///
    /// Compilation errors, or `FinderError::Execution` when the count fails.
    pub fn count<Ex>(&mut self, executor: &Ex, criteria: &Criteria) -> Result<String, FinderError>
    where
        Ex: FinderExecutor + ?Sized,
    {
        let statement = self.build_count(criteria)?;
        let (sql, values) = statement.to_positional();
        let value = executor.query_scalar(&sql, &values)?;
        Ok(display_value(&value))
    }

    /// Whether a joined plural relation multiplies the base rows
    fn fans_out(&self, query: &JoinQuery) -> bool {
        query.elements.iter().any(|&id| {
            self.tree
                .node(id)
                .kind()
                .is_some_and(|k| matches!(k, RelationKind::HasMany | RelationKind::ManyToMany))
        })
    }

    fn distinct_key_count(&self) -> String {
        let root = self.tree.root();
        let columns: Vec<String> = root
            .table()
            .primary_key
            .columns()
            .into_iter()
            .map(|c| format!("{}{}", root.column_prefix(), quote_column_name(c)))
            .collect();
        match columns.as_slice() {
            [column] => format!("COUNT(DISTINCT {column})"),
            _ => format!("COUNT(DISTINCT ({}))", columns.join(", ")),
        }
    }

    /// Move the compiled base query out so it can be run against `self`
    pub(crate) fn take_query(&mut self) -> Result<JoinQuery, FinderError> {
        self.query.take().ok_or(FinderError::QueryNotBuilt)
    }

    pub(crate) fn restore_query(&mut self, query: JoinQuery) {
        self.query = Some(query);
    }

    /// Execute `query` and decode its rows starting at node `from`
    pub(crate) fn run_query<Ex>(&mut self, executor: &Ex, query: &JoinQuery, from: NodeId) -> Result<usize, FinderError>
    where
        Ex: FinderExecutor + ?Sized,
    {
        let statement = query.build();
        let (sql, values) = statement.to_positional();
        log::debug!("executing ({} params): {sql}", values.len());
        let rows = executor.query_all(&sql, &values)?;
        for row in &rows {
            populate::populate_node(&mut self.tree, query, from, row);
        }
        log::trace!("decoded {} rows from node {from}", rows.len());
        Ok(rows.len())
    }

    /// Run the stat relations of node `id`
    pub(crate) fn run_stats<Ex>(&mut self, executor: &Ex, id: NodeId) -> Result<(), FinderError>
    where
        Ex: FinderExecutor + ?Sized,
    {
        stat::run_stats(&self.tree, executor, id, &mut self.names)
    }

    /// Release every record cache, keeping the compiled tree
    pub fn clear_records(&mut self) {
        self.tree.clear_records();
    }

    /// Tear the tree down, severing every node link
    pub fn destroy(mut self) {
        log::trace!("destroying finder for {}", self.tree.root().entity().name);
        self.query = None;
        self.tree.destroy();
    }
}
