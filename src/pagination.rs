//! Offset pagination.
//!
//! One logical criteria is split into three queries:
//!
//! - the **count** query counts distinct root identifiers, keeping only the
//!   joins the filters need and no ordering;
//! - the **id** query selects the distinct root identifiers of one page, in
//!   the requested order;
//! - the **object** query loads the full projection for exactly those
//!   identifiers, in the same order.
//!
//! Each derived query starts from a snapshot of the criteria and its
//! parameter registry taken when the page was requested, so parameter names
//! match the base criteria while later additions stay independent.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::ast::*;
use crate::clauses::{FilterClause, FilterManager};
use crate::engine::{Query, QueryExecutor};
use crate::error::{CriteriaError, CriteriaResult};
use crate::model::QueryModel;
use crate::transpiler::{ParameterRegistry, QueryGenerator, RenderOptions};

/// Name of the identifier-list parameter of the object query.
pub const IDS_PARAMETER: &str = "ids";

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of matches over all pages.
    pub total_count: u64,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PaginatedCriteria {
    model: QueryModel,
    registry: ParameterRegistry,
    parameters: BTreeMap<String, ParamValue>,
    options: RenderOptions,
    page: usize,
    page_size: usize,
    count_query: Option<Query>,
    id_query: Option<Query>,
    object_query: Option<Query>,
}

impl PaginatedCriteria {
    pub(crate) fn new(
        model: QueryModel,
        registry: ParameterRegistry,
        parameters: BTreeMap<String, ParamValue>,
        options: RenderOptions,
        page: usize,
        page_size: usize,
    ) -> Self {
        Self {
            model,
            registry,
            parameters,
            options,
            page,
            page_size,
            count_query: None,
            id_query: None,
            object_query: None,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Offset of the first row of this page.
    pub fn first_result(&self) -> usize {
        (self.page - 1) * self.page_size
    }

    /// Bind a value for a `:name` reference; cached queries are rebuilt.
    pub fn set_parameter(&mut self, name: &str, value: impl Into<ParamValue>) -> &mut Self {
        self.parameters
            .insert(name.trim_start_matches(':').to_string(), value.into());
        self.count_query = None;
        self.id_query = None;
        self.object_query = None;
        self
    }

    fn id_expression(&self) -> Expression {
        Expression::property(
            self.model.joins.root_alias(),
            Some(self.options.id_attribute.as_str()),
        )
    }

    /// Render a derived model with a private copy of the registry.
    fn finish(&self, model: &QueryModel, deferred: &[&str]) -> CriteriaResult<Query> {
        let mut registry = self.registry.clone();
        let rendered = QueryGenerator::new(&mut registry, &self.options).render(model)?;
        rendered.bind(&self.parameters, deferred)
    }

    fn build_count_query(&self) -> CriteriaResult<Query> {
        let mut model = self.model.clone();
        let count = Expression::function(
            "COUNT",
            vec![Expression::Composite(vec![
                Expression::literal("DISTINCT "),
                self.id_expression(),
            ])],
        );
        model.inline_select_aliases()?;
        model.select.replace(count, false);
        model.order_by.clear();
        model.apply_implicit_joins()?;
        model.prune_joins();
        model.fetch_allowed = false;
        self.finish(&model, &[])
    }

    fn build_id_query(&self) -> CriteriaResult<Query> {
        let mut model = self.model.clone();
        model.inline_select_aliases()?;
        model.select.replace(self.id_expression(), true);
        model.apply_implicit_joins()?;
        model.prune_joins();
        model.fetch_allowed = false;
        Ok(self
            .finish(&model, &[])?
            .with_range(self.first_result(), self.page_size))
    }

    fn build_object_query(&self) -> CriteriaResult<Query> {
        let mut model = self.model.clone();
        model.where_.clear_restrictions();
        model.group_by.clear();
        model.having = FilterManager::new(FilterClause::Having);
        model.apply_implicit_joins()?;
        model.where_.inject(Predicate::In {
            expr: self.id_expression(),
            values: Expression::named_parameter(IDS_PARAMETER),
        });
        self.finish(&model, &[IDS_PARAMETER])
    }

    pub fn count_query(&mut self) -> CriteriaResult<&Query> {
        if self.count_query.is_none() {
            self.count_query = Some(self.build_count_query()?);
        }
        self.count_query
            .as_ref()
            .ok_or_else(|| CriteriaError::illegal_state("count query missing"))
    }

    pub fn id_query(&mut self) -> CriteriaResult<&Query> {
        if self.id_query.is_none() {
            self.id_query = Some(self.build_id_query()?);
        }
        self.id_query
            .as_ref()
            .ok_or_else(|| CriteriaError::illegal_state("id query missing"))
    }

    /// The object query; its `ids` parameter is bound at execution.
    pub fn object_query(&mut self) -> CriteriaResult<&Query> {
        if self.object_query.is_none() {
            self.object_query = Some(self.build_object_query()?);
        }
        self.object_query
            .as_ref()
            .ok_or_else(|| CriteriaError::illegal_state("object query missing"))
    }

    pub fn count_query_string(&mut self) -> CriteriaResult<String> {
        Ok(self.count_query()?.text.clone())
    }

    pub fn id_query_string(&mut self) -> CriteriaResult<String> {
        Ok(self.id_query()?.text.clone())
    }

    pub fn object_query_string(&mut self) -> CriteriaResult<String> {
        Ok(self.object_query()?.text.clone())
    }

    /// Run the page: ids first, then the objects for those ids, then the count.
    pub fn execute<E: QueryExecutor>(&mut self, executor: &mut E) -> CriteriaResult<Page<E::Row>> {
        let id_query = self.id_query()?.clone();
        let ids = executor.fetch_scalars(&id_query)?;

        let items = if ids.is_empty() {
            debug!(page = self.page, "no ids on page, object query skipped");
            Vec::new()
        } else {
            let object_query = self
                .object_query()?
                .clone()
                .with_parameter(IDS_PARAMETER, ParamValue::List(ids));
            executor.fetch_rows(&object_query)?
        };

        let count_query = self.count_query()?.clone();
        let count = executor
            .fetch_scalars(&count_query)?
            .first()
            .and_then(ParamValue::as_i64)
            .ok_or_else(|| CriteriaError::Execution("count query returned no number".into()))?;
        let total_count = u64::try_from(count)
            .map_err(|_| CriteriaError::Execution(format!("negative count {}", count)))?;

        debug!(
            page = self.page,
            items = items.len(),
            total = total_count,
            "page loaded"
        );
        Ok(Page { items, total_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Criteria;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_result() {
        let mut criteria = Criteria::from("Document", "d").unwrap();
        let page = criteria.page(3, 20).unwrap();
        assert_eq!(page.first_result(), 40);
    }

    #[test]
    fn test_select_only_joins_pruned_from_count() {
        let mut criteria = Criteria::from("Document", "d").unwrap();
        criteria
            .select("d.owner.name")
            .unwrap()
            .where_("d.versions.date")
            .unwrap()
            .is_not_null()
            .order_by_asc("d.name")
            .unwrap();
        let mut page = criteria.page(1, 10).unwrap();
        assert_eq!(
            page.count_query_string().unwrap(),
            "SELECT COUNT(DISTINCT d.id) FROM Document d LEFT JOIN d.versions versions \
             WHERE versions.date IS NOT NULL"
        );
        assert_eq!(
            page.id_query_string().unwrap(),
            "SELECT DISTINCT d.id FROM Document d LEFT JOIN d.versions versions \
             WHERE versions.date IS NOT NULL ORDER BY d.name ASC"
        );
        assert_eq!(
            page.object_query_string().unwrap(),
            "SELECT owner.name FROM Document d LEFT JOIN d.owner owner \
             WHERE d.id IN (:ids) ORDER BY d.name ASC"
        );
    }

    #[test]
    fn test_select_alias_in_having_inlined() {
        let mut criteria = Criteria::from("Document", "d").unwrap();
        criteria
            .select("d.name")
            .unwrap()
            .select_as("COUNT(d.versions.id)", "total")
            .unwrap()
            .group_by("d.name")
            .unwrap()
            .having("total")
            .unwrap()
            .gt(1)
            .order_by_desc("total")
            .unwrap();
        let mut page = criteria.page(1, 10).unwrap();
        assert_eq!(
            page.count_query_string().unwrap(),
            "SELECT COUNT(DISTINCT d.id) FROM Document d LEFT JOIN d.versions versions \
             GROUP BY d.name HAVING COUNT(versions.id) > :param_0"
        );
        assert_eq!(
            page.id_query_string().unwrap(),
            "SELECT DISTINCT d.id FROM Document d LEFT JOIN d.versions versions \
             GROUP BY d.name HAVING COUNT(versions.id) > :param_0 \
             ORDER BY COUNT(versions.id) DESC"
        );
    }

    #[test]
    fn test_fetch_only_in_object_query() {
        let mut criteria = Criteria::from("Document", "d").unwrap();
        criteria
            .inner_join_fetch("d.owner", "o")
            .unwrap()
            .where_("o.name")
            .unwrap()
            .eq("x");
        let mut page = criteria.page(2, 5).unwrap();
        assert_eq!(
            page.id_query_string().unwrap(),
            "SELECT DISTINCT d.id FROM Document d INNER JOIN d.owner o WHERE o.name = :param_0"
        );
        assert_eq!(page.id_query().unwrap().first_result, Some(5));
        assert_eq!(
            page.object_query_string().unwrap(),
            "FROM Document d INNER JOIN FETCH d.owner o WHERE d.id IN (:ids)"
        );
        assert!(page.object_query().unwrap().parameters.is_empty());
    }
}
