use std::collections::BTreeSet;

use crate::ast::Expression;
use crate::error::CriteriaResult;
use crate::resolver::ExpressionVisitor;
use crate::transpiler::QueryGenerator;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupByManager {
    items: Vec<Expression>,
}

impl GroupByManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, expression: Expression) {
        self.items.push(expression);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn accept_visitor(&mut self, visitor: &mut dyn ExpressionVisitor) -> CriteriaResult<()> {
        for item in &mut self.items {
            *item = visitor.visit(item)?;
        }
        Ok(())
    }

    pub fn collect_aliases(&self, out: &mut BTreeSet<String>) {
        for item in &self.items {
            item.collect_aliases(out);
        }
    }

    pub fn render(&self, generator: &mut QueryGenerator<'_>) -> CriteriaResult<String> {
        if self.items.is_empty() {
            return Ok(String::new());
        }
        let items = self
            .items
            .iter()
            .map(|i| generator.expression(i))
            .collect::<CriteriaResult<Vec<_>>>()?;
        Ok(format!("GROUP BY {}", items.join(", ")))
    }
}
