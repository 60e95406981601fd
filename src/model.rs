//! The structural state of one criteria: clause managers, join graph and
//! array keys.

use std::collections::BTreeSet;

use tracing::debug;

use crate::arrays::ArrayTransformer;
use crate::clauses::*;
use crate::error::CriteriaResult;
use crate::joins::{JoinManager, NodeId};
use crate::resolver::{JoinResolver, SelectAliasInliner};

#[derive(Debug, Clone, PartialEq)]
pub struct QueryModel {
    pub select: SelectManager,
    pub where_: FilterManager,
    pub group_by: GroupByManager,
    pub having: FilterManager,
    pub order_by: OrderByManager,
    pub joins: JoinManager,
    pub arrays: ArrayTransformer,
    /// Join nodes to render; `None` renders all of them.
    pub retained: Option<BTreeSet<NodeId>>,
    pub fetch_allowed: bool,
}

impl QueryModel {
    pub fn new(entity: impl Into<String>, root_alias: impl Into<String>) -> Self {
        Self {
            select: SelectManager::new(),
            where_: FilterManager::new(FilterClause::Where),
            group_by: GroupByManager::new(),
            having: FilterManager::new(FilterClause::Having),
            order_by: OrderByManager::new(),
            joins: JoinManager::new(entity, root_alias),
            arrays: ArrayTransformer::new(),
            retained: None,
            fetch_allowed: true,
        }
    }

    pub fn filter_mut(&mut self, clause: FilterClause) -> &mut FilterManager {
        match clause {
            FilterClause::Where => &mut self.where_,
            FilterClause::Having => &mut self.having,
        }
    }

    /// Resolve every path against the join graph.
    ///
    /// Select runs first so its aliases are known to the other clauses;
    /// order-by runs last and may not end on a whole entity. Key predicates
    /// of array accesses go to the root WHERE clause.
    pub fn apply_implicit_joins(&mut self) -> CriteriaResult<()> {
        let select_aliases = self.select.aliases();
        let mut resolver =
            JoinResolver::new(&mut self.joins, &mut self.arrays).with_select_aliases(select_aliases);

        resolver.set_from_select(true);
        self.select.accept_visitor(&mut resolver)?;
        resolver.set_from_select(false);
        self.where_.accept_visitor(&mut resolver)?;
        self.group_by.accept_visitor(&mut resolver)?;
        self.having.accept_visitor(&mut resolver)?;
        resolver.set_join_with_object_leaf_allowed(false);
        self.order_by.accept_visitor(&mut resolver)?;

        for key in self.arrays.key_predicates() {
            self.where_.inject(key);
        }
        debug!(
            joins = self.joins.len() - 1,
            keys = self.arrays.keys().len(),
            "implicit joins applied"
        );
        Ok(())
    }

    /// Replace select-alias references outside the select clause with the
    /// aliased expressions, ahead of dropping the projection.
    pub fn inline_select_aliases(&mut self) -> CriteriaResult<()> {
        let mut inliner = SelectAliasInliner::new(&self.select, &self.joins);
        if inliner.is_empty() {
            return Ok(());
        }
        self.where_.accept_visitor(&mut inliner)?;
        self.group_by.accept_visitor(&mut inliner)?;
        self.having.accept_visitor(&mut inliner)?;
        self.order_by.accept_visitor(&mut inliner)
    }

    /// Join aliases read by any clause.
    pub fn referenced_aliases(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.select.collect_aliases(&mut out);
        self.where_.collect_aliases(&mut out);
        self.group_by.collect_aliases(&mut out);
        self.having.collect_aliases(&mut out);
        self.order_by.collect_aliases(&mut out);
        out
    }

    /// Drop LEFT joins that no clause reads.
    pub fn prune_joins(&mut self) {
        let keep = self.joins.retained_for(&self.referenced_aliases());
        self.retained = Some(keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::parser::parse;
    use crate::transpiler::{ParameterRegistry, QueryGenerator, RenderOptions};
    use pretty_assertions::assert_eq;

    fn render(model: &QueryModel) -> String {
        let mut registry = ParameterRegistry::new();
        let options = RenderOptions::default();
        QueryGenerator::new(&mut registry, &options).render(model).unwrap().text
    }

    #[test]
    fn test_array_access_in_select_and_where_shares_one_key() {
        let mut model = QueryModel::new("Document", "d");
        model.select.add(parse("contacts[1]").unwrap(), None).unwrap();
        model.where_.add(Predicate::compare(
            CompareOp::Ge,
            parse("contacts[1]").unwrap(),
            Expression::value(0),
        ));
        model.apply_implicit_joins().unwrap();
        assert_eq!(
            render(&model),
            "SELECT VALUE(contacts) FROM Document d LEFT JOIN d.contacts contacts \
             WHERE VALUE(contacts) >= :param_0 AND KEY(contacts) = 1"
        );
    }

    #[test]
    fn test_resolution_twice_is_stable() {
        let mut model = QueryModel::new("Document", "d");
        model.select.add(parse("d.contacts[d.age]").unwrap(), None).unwrap();
        model.apply_implicit_joins().unwrap();
        let once = model.clone();
        model.apply_implicit_joins().unwrap();
        assert_eq!(model, once);
        assert_eq!(
            render(&model),
            "SELECT VALUE(contacts) FROM Document d LEFT JOIN d.contacts contacts \
             WHERE KEY(contacts) = d.age"
        );
    }

    #[test]
    fn test_prune_keeps_filter_joins_only() {
        let mut model = QueryModel::new("Document", "d");
        model.where_.add(Predicate::IsNull(parse("d.owner.name").unwrap()));
        model.apply_implicit_joins().unwrap();
        model.joins.implicit_join(model.joins.root(), "versions");
        model.prune_joins();
        assert_eq!(
            render(&model),
            "FROM Document d LEFT JOIN d.owner owner WHERE owner.name IS NULL"
        );
    }
}
