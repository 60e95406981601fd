//! The criteria builder.
//!
//! A [`Criteria`] collects clauses through its builder API and renders them
//! on demand. Rendering (or paginating) locks the structure: from then on
//! only parameter values may change.
//!
//! ```
//! use criteria::Criteria;
//!
//! let mut criteria = Criteria::from("Document", "d")?;
//! criteria
//!     .select("d.contacts[d.age]")?
//!     .where_("d.owner.name")?.like("A%")
//!     .order_by_asc("d.name")?;
//! assert_eq!(
//!     criteria.query_string()?,
//!     "SELECT VALUE(contacts) FROM Document d LEFT JOIN d.contacts contacts \
//!      LEFT JOIN d.owner owner WHERE owner.name LIKE :param_0 \
//!      AND KEY(contacts) = d.age ORDER BY d.name ASC"
//! );
//! # Ok::<(), criteria::CriteriaError>(())
//! ```

use std::collections::BTreeMap;

use crate::ast::*;
use crate::builders::{
    CaseParent, CaseWhenBuilder, OrBuilder, PredicateParent, RestrictionBuilder,
    SimpleCaseWhenBuilder,
};
use crate::clauses::FilterClause;
use crate::engine::Query;
use crate::error::{CriteriaError, CriteriaResult};
use crate::model::QueryModel;
use crate::pagination::PaginatedCriteria;
use crate::parser;
use crate::transpiler::{ParameterRegistry, QueryGenerator, RenderOptions, RenderedQuery};

/// A builder handed out by a [`Criteria`] and not yet terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBuilder {
    Filter(FilterClause),
    SelectCase,
}

impl std::fmt::Display for OpenBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenBuilder::Filter(clause) => write!(f, "a {} predicate", clause),
            OpenBuilder::SelectCase => write!(f, "a select CASE"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Criteria {
    model: QueryModel,
    options: RenderOptions,
    registry: ParameterRegistry,
    /// Values for `:name` references.
    parameters: BTreeMap<String, ParamValue>,
    open_builder: Option<OpenBuilder>,
    rendered: Option<RenderedQuery>,
    locked: bool,
}

impl Criteria {
    /// Start a criteria over `entity`, addressed as `alias`.
    pub fn from(entity: &str, alias: &str) -> CriteriaResult<Self> {
        if entity.trim().is_empty() {
            return Err(CriteriaError::illegal_argument("entity must not be empty"));
        }
        if alias.trim().is_empty() {
            return Err(CriteriaError::illegal_argument("root alias must not be empty"));
        }
        Ok(Self {
            model: QueryModel::new(entity.trim(), alias.trim()),
            options: RenderOptions::default(),
            registry: ParameterRegistry::new(),
            parameters: BTreeMap::new(),
            open_builder: None,
            rendered: None,
            locked: false,
        })
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// The unresolved structure built so far.
    pub fn model(&self) -> &QueryModel {
        &self.model
    }

    pub fn root_alias(&self) -> &str {
        self.model.joins.root_alias()
    }

    fn ensure_mutable(&self) -> CriteriaResult<()> {
        if self.locked {
            return Err(CriteriaError::illegal_state(
                "criteria has already been rendered; only parameters may change",
            ));
        }
        self.ensure_no_open_builder()
    }

    fn ensure_no_open_builder(&self) -> CriteriaResult<()> {
        match self.open_builder {
            Some(open) => Err(CriteriaError::illegal_state(format!(
                "{} builder is still open",
                open
            ))),
            None => Ok(()),
        }
    }

    fn parse(expression: &str) -> CriteriaResult<Expression> {
        if expression.trim().is_empty() {
            return Err(CriteriaError::illegal_argument("expression must not be empty"));
        }
        parser::parse(expression)
    }

    pub fn distinct(&mut self) -> CriteriaResult<&mut Self> {
        self.ensure_mutable()?;
        self.model.select.set_distinct(true);
        Ok(self)
    }

    pub fn select(&mut self, expression: &str) -> CriteriaResult<&mut Self> {
        self.ensure_mutable()?;
        let expr = Self::parse(expression)?;
        self.model.select.add(expr, None)?;
        Ok(self)
    }

    /// Select `expression` under `alias`; later clauses may use the alias as a bare name.
    pub fn select_as(&mut self, expression: &str, alias: &str) -> CriteriaResult<&mut Self> {
        self.ensure_mutable()?;
        let expr = Self::parse(expression)?;
        self.model.select.add(expr, Some(alias.trim().to_string()))?;
        Ok(self)
    }

    pub fn select_all(&mut self, expressions: &[&str]) -> CriteriaResult<&mut Self> {
        for expression in expressions {
            self.select(expression)?;
        }
        Ok(self)
    }

    /// Select a searched `CASE WHEN .. THEN .. ELSE .. END`.
    pub fn select_case(&mut self) -> CriteriaResult<CaseWhenBuilder<SelectParent<'_>>> {
        self.ensure_mutable()?;
        self.open_builder = Some(OpenBuilder::SelectCase);
        Ok(CaseWhenBuilder::new(SelectParent {
            criteria: self,
            alias: None,
        }))
    }

    /// [`select_case`](Self::select_case) under `alias`.
    pub fn select_case_as(&mut self, alias: &str) -> CriteriaResult<CaseWhenBuilder<SelectParent<'_>>> {
        self.ensure_mutable()?;
        let alias = alias.trim().to_string();
        self.model.select.check_alias(&alias)?;
        self.open_builder = Some(OpenBuilder::SelectCase);
        Ok(CaseWhenBuilder::new(SelectParent {
            criteria: self,
            alias: Some(alias),
        }))
    }

    /// Select a simple `CASE expression WHEN .. THEN .. ELSE .. END`.
    pub fn select_case_on(
        &mut self,
        expression: &str,
    ) -> CriteriaResult<SimpleCaseWhenBuilder<SelectParent<'_>>> {
        self.ensure_mutable()?;
        let operand = Self::parse(expression)?;
        self.open_builder = Some(OpenBuilder::SelectCase);
        Ok(SimpleCaseWhenBuilder::new(
            SelectParent {
                criteria: self,
                alias: None,
            },
            operand,
        ))
    }

    /// Start a top-level WHERE restriction.
    pub fn where_(&mut self, expression: &str) -> CriteriaResult<RestrictionBuilder<ClauseParent<'_>>> {
        self.restriction(FilterClause::Where, expression)
    }

    /// Start a disjunctive WHERE group.
    pub fn where_or(&mut self) -> CriteriaResult<OrBuilder<ClauseParent<'_>>> {
        self.group(FilterClause::Where)
    }

    pub fn group_by(&mut self, expression: &str) -> CriteriaResult<&mut Self> {
        self.ensure_mutable()?;
        let expr = Self::parse(expression)?;
        self.model.group_by.add(expr);
        Ok(self)
    }

    pub fn group_by_all(&mut self, expressions: &[&str]) -> CriteriaResult<&mut Self> {
        for expression in expressions {
            self.group_by(expression)?;
        }
        Ok(self)
    }

    /// Start a top-level HAVING restriction. Requires a prior `group_by`.
    pub fn having(&mut self, expression: &str) -> CriteriaResult<RestrictionBuilder<ClauseParent<'_>>> {
        self.restriction(FilterClause::Having, expression)
    }

    pub fn having_or(&mut self) -> CriteriaResult<OrBuilder<ClauseParent<'_>>> {
        self.group(FilterClause::Having)
    }

    fn check_filter(&self, clause: FilterClause) -> CriteriaResult<()> {
        self.ensure_mutable()?;
        if clause == FilterClause::Having && self.model.group_by.is_empty() {
            return Err(CriteriaError::illegal_state("having() requires a prior group_by()"));
        }
        Ok(())
    }

    fn restriction(
        &mut self,
        clause: FilterClause,
        expression: &str,
    ) -> CriteriaResult<RestrictionBuilder<ClauseParent<'_>>> {
        self.check_filter(clause)?;
        let left = Self::parse(expression)?;
        self.open_builder = Some(OpenBuilder::Filter(clause));
        Ok(RestrictionBuilder::new(
            ClauseParent {
                criteria: self,
                clause,
            },
            left,
        ))
    }

    fn group(&mut self, clause: FilterClause) -> CriteriaResult<OrBuilder<ClauseParent<'_>>> {
        self.check_filter(clause)?;
        self.open_builder = Some(OpenBuilder::Filter(clause));
        Ok(OrBuilder::new(ClauseParent {
            criteria: self,
            clause,
        }))
    }

    pub fn order_by(
        &mut self,
        expression: &str,
        ascending: bool,
        nulls_first: bool,
    ) -> CriteriaResult<&mut Self> {
        self.ensure_mutable()?;
        let expr = Self::parse(expression)?;
        self.model.order_by.add(expr, ascending, nulls_first);
        Ok(self)
    }

    /// Ascending, with the target language's default null ordering.
    pub fn order_by_asc(&mut self, expression: &str) -> CriteriaResult<&mut Self> {
        let nulls_first = self.options.nulls.nulls_first_by_default(true);
        self.order_by(expression, true, nulls_first)
    }

    /// Descending, with the target language's default null ordering.
    pub fn order_by_desc(&mut self, expression: &str) -> CriteriaResult<&mut Self> {
        let nulls_first = self.options.nulls.nulls_first_by_default(false);
        self.order_by(expression, false, nulls_first)
    }

    pub fn order_by_asc_nulls(&mut self, expression: &str, nulls_first: bool) -> CriteriaResult<&mut Self> {
        self.order_by(expression, true, nulls_first)
    }

    pub fn order_by_desc_nulls(&mut self, expression: &str, nulls_first: bool) -> CriteriaResult<&mut Self> {
        self.order_by(expression, false, nulls_first)
    }

    /// Join the relationship `path` under `alias`.
    pub fn join(&mut self, path: &str, alias: &str, kind: JoinKind, fetch: bool) -> CriteriaResult<&mut Self> {
        self.ensure_mutable()?;
        if path.trim().is_empty() {
            return Err(CriteriaError::illegal_argument("join path must not be empty"));
        }
        if alias.trim().is_empty() {
            return Err(CriteriaError::illegal_argument("join alias must not be empty"));
        }
        let segments = parser::parse_join_path(path)?;
        self.model.joins.join(&segments, alias.trim(), kind, fetch)?;
        Ok(self)
    }

    pub fn inner_join(&mut self, path: &str, alias: &str) -> CriteriaResult<&mut Self> {
        self.join(path, alias, JoinKind::Inner, false)
    }

    pub fn inner_join_fetch(&mut self, path: &str, alias: &str) -> CriteriaResult<&mut Self> {
        self.join(path, alias, JoinKind::Inner, true)
    }

    pub fn left_join(&mut self, path: &str, alias: &str) -> CriteriaResult<&mut Self> {
        self.join(path, alias, JoinKind::Left, false)
    }

    pub fn left_join_fetch(&mut self, path: &str, alias: &str) -> CriteriaResult<&mut Self> {
        self.join(path, alias, JoinKind::Left, true)
    }

    pub fn right_join(&mut self, path: &str, alias: &str) -> CriteriaResult<&mut Self> {
        self.join(path, alias, JoinKind::Right, false)
    }

    pub fn right_join_fetch(&mut self, path: &str, alias: &str) -> CriteriaResult<&mut Self> {
        self.join(path, alias, JoinKind::Right, true)
    }

    pub fn outer_join(&mut self, path: &str, alias: &str) -> CriteriaResult<&mut Self> {
        self.join(path, alias, JoinKind::Outer, false)
    }

    pub fn outer_join_fetch(&mut self, path: &str, alias: &str) -> CriteriaResult<&mut Self> {
        self.join(path, alias, JoinKind::Outer, true)
    }

    /// Bind a value for a `:name` reference. Allowed after rendering.
    pub fn set_parameter(&mut self, name: &str, value: impl Into<ParamValue>) -> &mut Self {
        self.parameters
            .insert(name.trim_start_matches(':').to_string(), value.into());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    fn render(&mut self) -> CriteriaResult<&RenderedQuery> {
        self.ensure_no_open_builder()?;
        if self.rendered.is_none() {
            let mut resolved = self.model.clone();
            resolved.apply_implicit_joins()?;
            let rendered = QueryGenerator::new(&mut self.registry, &self.options).render(&resolved)?;
            self.locked = true;
            self.rendered = Some(rendered);
        }
        self.rendered
            .as_ref()
            .ok_or_else(|| CriteriaError::illegal_state("criteria was not rendered"))
    }

    /// Generated query text.
    pub fn query_string(&mut self) -> CriteriaResult<String> {
        Ok(self.render()?.text.clone())
    }

    /// Query text plus every parameter it references.
    pub fn query(&mut self) -> CriteriaResult<Query> {
        self.render()?;
        let rendered = self
            .rendered
            .as_ref()
            .ok_or_else(|| CriteriaError::illegal_state("criteria was not rendered"))?;
        rendered.bind(&self.parameters, &[])
    }

    /// Derive the count, id and object queries for one page (1-based).
    pub fn page(&mut self, page: usize, page_size: usize) -> CriteriaResult<PaginatedCriteria> {
        self.ensure_no_open_builder()?;
        if page == 0 {
            return Err(CriteriaError::illegal_argument("page numbers start at 1"));
        }
        if page_size == 0 {
            return Err(CriteriaError::illegal_argument("page size must be positive"));
        }
        self.locked = true;
        Ok(PaginatedCriteria::new(
            self.model.clone(),
            self.registry.clone(),
            self.parameters.clone(),
            self.options.clone(),
            page,
            page_size,
        ))
    }
}

/// Attaches finished predicates to a WHERE or HAVING clause of a criteria.
pub struct ClauseParent<'a> {
    criteria: &'a mut Criteria,
    clause: FilterClause,
}

impl<'a> PredicateParent for ClauseParent<'a> {
    type Output = &'a mut Criteria;

    fn end_predicate(self, predicate: Predicate) -> &'a mut Criteria {
        self.criteria.open_builder = None;
        self.criteria.model.filter_mut(self.clause).add(predicate);
        self.criteria
    }

    fn abandon(self) {
        self.criteria.open_builder = None;
    }
}

/// Adds a finished `CASE` expression to the projection of a criteria.
pub struct SelectParent<'a> {
    criteria: &'a mut Criteria,
    alias: Option<String>,
}

impl<'a> CaseParent for SelectParent<'a> {
    type Output = &'a mut Criteria;

    fn end_case(self, case: CaseExpression) -> &'a mut Criteria {
        self.criteria.open_builder = None;
        self.criteria
            .model
            .select
            .push(Expression::Case(Box::new(case)), self.alias);
        self.criteria
    }

    fn abandon(self) {
        self.criteria.open_builder = None;
    }
}
