use crate::ast::{Expression, Predicate};
use crate::error::CriteriaResult;

/// What a `WHEN` branch tests.
#[derive(Debug, Clone, PartialEq)]
pub enum WhenCondition {
    /// Searched form: `WHEN <predicate>`.
    Predicate(Predicate),
    /// Simple form: `WHEN <value>`, compared against the case operand.
    Value(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseWhen {
    pub condition: WhenCondition,
    pub result: Expression,
}

/// `CASE [operand] (WHEN .. THEN ..)+ ELSE .. END`.
///
/// With an operand every branch holds a [`WhenCondition::Value`]; without
/// one every branch holds a [`WhenCondition::Predicate`].
#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpression {
    pub operand: Option<Expression>,
    pub whens: Vec<CaseWhen>,
    pub otherwise: Expression,
}

impl CaseExpression {
    /// Rebuild with every contained expression passed through `f`, in
    /// rendering order.
    pub fn map_expressions<F>(&self, f: &mut F) -> CriteriaResult<CaseExpression>
    where
        F: FnMut(&Expression) -> CriteriaResult<Expression>,
    {
        let operand = match &self.operand {
            Some(operand) => Some(f(operand)?),
            None => None,
        };
        let mut whens = Vec::with_capacity(self.whens.len());
        for when in &self.whens {
            let condition = match &when.condition {
                WhenCondition::Predicate(predicate) => {
                    WhenCondition::Predicate(predicate.map_expressions(f)?)
                }
                WhenCondition::Value(value) => WhenCondition::Value(f(value)?),
            };
            whens.push(CaseWhen {
                condition,
                result: f(&when.result)?,
            });
        }
        Ok(CaseExpression {
            operand,
            whens,
            otherwise: f(&self.otherwise)?,
        })
    }

    /// Visit every contained expression in rendering order.
    pub fn for_each_expression<F: FnMut(&Expression)>(&self, f: &mut F) {
        if let Some(operand) = &self.operand {
            f(operand);
        }
        for when in &self.whens {
            match &when.condition {
                WhenCondition::Predicate(predicate) => predicate.for_each_expression(f),
                WhenCondition::Value(value) => f(value),
            }
            f(&when.result);
        }
        f(&self.otherwise);
    }
}

impl std::fmt::Display for CaseExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CASE")?;
        if let Some(operand) = &self.operand {
            write!(f, " {}", operand)?;
        }
        for when in &self.whens {
            match &when.condition {
                WhenCondition::Predicate(predicate) => write!(f, " WHEN {}", predicate)?,
                WhenCondition::Value(value) => write!(f, " WHEN {}", value)?,
            }
            write!(f, " THEN {}", when.result)?;
        }
        write!(f, " ELSE {} END", self.otherwise)
    }
}
