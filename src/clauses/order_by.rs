use std::collections::BTreeSet;

use crate::ast::Expression;
use crate::error::CriteriaResult;
use crate::resolver::ExpressionVisitor;
use crate::transpiler::QueryGenerator;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByInfo {
    pub expression: Expression,
    pub ascending: bool,
    pub nulls_first: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderByManager {
    entries: Vec<OrderByInfo>,
}

impl OrderByManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, expression: Expression, ascending: bool, nulls_first: bool) {
        self.entries.push(OrderByInfo {
            expression,
            ascending,
            nulls_first,
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[OrderByInfo] {
        &self.entries
    }

    pub fn accept_visitor(&mut self, visitor: &mut dyn ExpressionVisitor) -> CriteriaResult<()> {
        for entry in &mut self.entries {
            entry.expression = visitor.visit(&entry.expression)?;
        }
        Ok(())
    }

    pub fn collect_aliases(&self, out: &mut BTreeSet<String>) {
        for entry in &self.entries {
            entry.expression.collect_aliases(out);
        }
    }

    /// `NULLS FIRST|LAST` is only written when it differs from the default
    /// of the target language.
    pub fn render(&self, generator: &mut QueryGenerator<'_>) -> CriteriaResult<String> {
        if self.entries.is_empty() {
            return Ok(String::new());
        }
        let nulls = generator.options().nulls;
        let mut items = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let mut item = format!(
                "{} {}",
                generator.expression(&entry.expression)?,
                if entry.ascending { "ASC" } else { "DESC" }
            );
            if entry.nulls_first != nulls.nulls_first_by_default(entry.ascending) {
                item.push_str(if entry.nulls_first {
                    " NULLS FIRST"
                } else {
                    " NULLS LAST"
                });
            }
            items.push(item);
        }
        Ok(format!("ORDER BY {}", items.join(", ")))
    }
}
