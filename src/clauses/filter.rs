use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ast::Predicate;
use crate::error::CriteriaResult;
use crate::resolver::ExpressionVisitor;
use crate::transpiler::QueryGenerator;

/// Which filter clause a manager (or an open builder) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterClause {
    Where,
    Having,
}

impl FilterClause {
    pub fn keyword(&self) -> &'static str {
        match self {
            FilterClause::Where => "WHERE",
            FilterClause::Having => "HAVING",
        }
    }
}

impl std::fmt::Display for FilterClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// WHERE / HAVING state.
///
/// Top-level restrictions are children of an implicit `And` root. Key
/// predicates injected by array accesses follow the user restrictions.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterManager {
    clause: FilterClause,
    restrictions: Vec<Predicate>,
    injected: Vec<Predicate>,
}

impl FilterManager {
    pub fn new(clause: FilterClause) -> Self {
        Self {
            clause,
            restrictions: Vec::new(),
            injected: Vec::new(),
        }
    }

    pub fn clause(&self) -> FilterClause {
        self.clause
    }

    pub fn add(&mut self, predicate: Predicate) {
        if !predicate.is_empty_group() {
            self.restrictions.push(predicate);
        }
    }

    /// Add a generated predicate; the same predicate is kept once.
    pub fn inject(&mut self, predicate: Predicate) {
        if !self.injected.contains(&predicate) {
            self.injected.push(predicate);
        }
    }

    /// Drop the user restrictions, keeping injected predicates.
    pub fn clear_restrictions(&mut self) {
        self.restrictions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.restrictions.is_empty() && self.injected.is_empty()
    }

    pub fn restrictions(&self) -> &[Predicate] {
        &self.restrictions
    }

    /// The whole clause as one predicate.
    pub fn predicate(&self) -> Option<Predicate> {
        if self.is_empty() {
            return None;
        }
        let children = self
            .restrictions
            .iter()
            .chain(self.injected.iter())
            .cloned()
            .collect();
        Some(Predicate::and(children))
    }

    pub fn accept_visitor(&mut self, visitor: &mut dyn ExpressionVisitor) -> CriteriaResult<()> {
        for predicate in self.restrictions.iter_mut().chain(self.injected.iter_mut()) {
            *predicate = visitor.visit_predicate(predicate)?;
        }
        Ok(())
    }

    pub fn collect_aliases(&self, out: &mut BTreeSet<String>) {
        for predicate in self.restrictions.iter().chain(self.injected.iter()) {
            predicate.collect_aliases(out);
        }
    }

    pub fn render(&self, generator: &mut QueryGenerator<'_>) -> CriteriaResult<String> {
        match self.predicate() {
            Some(predicate) => Ok(format!(
                "{} {}",
                self.clause.keyword(),
                generator.predicate(&predicate)?
            )),
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, Expression};
    use crate::transpiler::{ParameterRegistry, RenderOptions};
    use pretty_assertions::assert_eq;

    fn render(filter: &FilterManager) -> String {
        let mut registry = ParameterRegistry::new();
        let options = RenderOptions::default();
        filter.render(&mut QueryGenerator::new(&mut registry, &options)).unwrap()
    }

    fn is_null(field: &str) -> Predicate {
        Predicate::IsNull(Expression::property("d", Some(field)))
    }

    #[test]
    fn test_restrictions_compose_conjunctively() {
        let mut filter = FilterManager::new(FilterClause::Where);
        assert_eq!(render(&filter), "");
        filter.add(is_null("a"));
        filter.add(Predicate::or(vec![is_null("b"), is_null("c")]));
        assert_eq!(
            render(&filter),
            "WHERE d.a IS NULL AND (d.b IS NULL OR d.c IS NULL)"
        );
    }

    #[test]
    fn test_single_or_group_renders_bare() {
        let mut filter = FilterManager::new(FilterClause::Having);
        filter.add(Predicate::or(vec![is_null("b"), is_null("c")]));
        assert_eq!(render(&filter), "HAVING d.b IS NULL OR d.c IS NULL");
    }

    #[test]
    fn test_injected_after_restrictions_and_deduplicated() {
        let mut filter = FilterManager::new(FilterClause::Where);
        let key = Predicate::compare(
            CompareOp::Eq,
            Expression::function("KEY", vec![Expression::property("contacts", None)]),
            Expression::literal("1"),
        );
        filter.inject(key.clone());
        filter.inject(key);
        filter.add(is_null("a"));
        filter.add(Predicate::or(vec![]));
        assert_eq!(render(&filter), "WHERE d.a IS NULL AND KEY(contacts) = 1");

        filter.clear_restrictions();
        assert_eq!(render(&filter), "WHERE KEY(contacts) = 1");
    }
}
