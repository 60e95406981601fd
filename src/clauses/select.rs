use std::collections::BTreeSet;

use crate::ast::Expression;
use crate::error::{CriteriaError, CriteriaResult};
use crate::resolver::ExpressionVisitor;
use crate::transpiler::QueryGenerator;

/// One projected expression.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectInfo {
    pub expression: Expression,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectManager {
    distinct: bool,
    items: Vec<SelectInfo>,
}

impl SelectManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn add(&mut self, expression: Expression, alias: Option<String>) -> CriteriaResult<()> {
        if let Some(alias) = &alias {
            self.check_alias(alias)?;
        }
        self.push(expression, alias);
        Ok(())
    }

    pub fn check_alias(&self, alias: &str) -> CriteriaResult<()> {
        if alias.trim().is_empty() {
            return Err(CriteriaError::illegal_argument("select alias must not be empty"));
        }
        if self.items.iter().any(|i| i.alias.as_deref() == Some(alias)) {
            return Err(CriteriaError::illegal_argument(format!(
                "select alias '{}' is already used",
                alias
            )));
        }
        Ok(())
    }

    /// Append without alias checks; the caller has run [`check_alias`](Self::check_alias).
    pub(crate) fn push(&mut self, expression: Expression, alias: Option<String>) {
        self.items.push(SelectInfo { expression, alias });
    }

    /// Replace the projection, e.g. with a count or an identifier.
    pub fn replace(&mut self, expression: Expression, distinct: bool) {
        self.items = vec![SelectInfo {
            expression,
            alias: None,
        }];
        self.distinct = distinct;
    }

    pub fn items(&self) -> &[SelectInfo] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn aliases(&self) -> BTreeSet<String> {
        self.items.iter().filter_map(|i| i.alias.clone()).collect()
    }

    pub fn accept_visitor(&mut self, visitor: &mut dyn ExpressionVisitor) -> CriteriaResult<()> {
        for item in &mut self.items {
            item.expression = visitor.visit(&item.expression)?;
        }
        Ok(())
    }

    pub fn collect_aliases(&self, out: &mut BTreeSet<String>) {
        for item in &self.items {
            item.expression.collect_aliases(out);
        }
    }

    pub fn render(&self, generator: &mut QueryGenerator<'_>) -> CriteriaResult<String> {
        if self.items.is_empty() {
            return Ok(String::new());
        }
        let mut columns = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let text = generator.expression(&item.expression)?;
            columns.push(match &item.alias {
                Some(alias) => format!("{} AS {}", text, alias),
                None => text,
            });
        }
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        Ok(format!("SELECT {}{}", distinct, columns.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpiler::{ParameterRegistry, RenderOptions};

    fn render(select: &SelectManager) -> String {
        let mut registry = ParameterRegistry::new();
        let options = RenderOptions::default();
        select.render(&mut QueryGenerator::new(&mut registry, &options)).unwrap()
    }

    #[test]
    fn test_render_with_alias_and_distinct() {
        let mut select = SelectManager::new();
        assert_eq!(render(&select), "");
        select.add(Expression::property("d", Some("name")), None).unwrap();
        select
            .add(Expression::property("owner", Some("age")), Some("ownerAge".into()))
            .unwrap();
        select.set_distinct(true);
        assert_eq!(render(&select), "SELECT DISTINCT d.name, owner.age AS ownerAge");
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let mut select = SelectManager::new();
        select.add(Expression::literal("1"), Some("x".into())).unwrap();
        assert!(matches!(
            select.add(Expression::literal("2"), Some("x".into())),
            Err(CriteriaError::IllegalArgument(_))
        ));
        assert_eq!(select.aliases().len(), 1);
    }
}
