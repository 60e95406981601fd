//! `CASE` expression builders.
//!
//! The searched form hands each `WHEN` condition to a [`RestrictionBuilder`]
//! (or an OR/AND group) whose terminal returns a [`CaseThenBuilder`]:
//!
//! ```
//! use criteria::Criteria;
//!
//! let mut criteria = Criteria::from("Document", "d")?;
//! criteria
//!     .select_case()?
//!     .when("d.age")?.lt(18)
//!     .then("'minor'")?
//!     .otherwise("'adult'")?;
//! assert_eq!(
//!     criteria.query_string()?,
//!     "SELECT CASE WHEN d.age < :param_0 THEN 'minor' ELSE 'adult' END FROM Document d"
//! );
//! # Ok::<(), criteria::CriteriaError>(())
//! ```

use crate::ast::*;
use crate::builders::{AndBuilder, OrBuilder, PredicateParent, RestrictionBuilder};
use crate::error::{CriteriaError, CriteriaResult};
use crate::parser;

/// Receiver of a finished `CASE` expression.
pub trait CaseParent: Sized {
    type Output;

    fn end_case(self, case: CaseExpression) -> Self::Output;

    /// Give up on the pending expression.
    fn abandon(self);
}

fn parse_or_abandon<P: CaseParent>(parent: P, text: &str) -> Result<(P, Expression), CriteriaError> {
    match parser::parse(text) {
        Ok(expr) => Ok((parent, expr)),
        Err(e) => {
            parent.abandon();
            Err(e)
        }
    }
}

/// Searched `CASE WHEN <predicate> THEN .. ELSE .. END`.
#[must_use = "call `otherwise` to attach the expression"]
pub struct CaseWhenBuilder<P: CaseParent> {
    parent: P,
    whens: Vec<CaseWhen>,
}

impl<P: CaseParent> CaseWhenBuilder<P> {
    pub fn new(parent: P) -> Self {
        Self {
            parent,
            whens: Vec::new(),
        }
    }

    /// Start a `WHEN` condition on `expression`.
    pub fn when(self, expression: &str) -> CriteriaResult<RestrictionBuilder<WhenParent<P>>> {
        match parser::parse(expression) {
            Ok(left) => Ok(RestrictionBuilder::new(WhenParent { case: self }, left)),
            Err(e) => {
                self.parent.abandon();
                Err(e)
            }
        }
    }

    /// `WHEN` condition made of OR-ed restrictions.
    pub fn when_or(self) -> OrBuilder<WhenParent<P>> {
        OrBuilder::new(WhenParent { case: self })
    }

    /// `WHEN` condition made of AND-ed restrictions.
    pub fn when_and(self) -> AndBuilder<WhenParent<P>> {
        AndBuilder::new(WhenParent { case: self })
    }

    /// Close with `ELSE expression END`.
    pub fn otherwise(self, expression: &str) -> CriteriaResult<P::Output> {
        if self.whens.is_empty() {
            self.parent.abandon();
            return Err(CriteriaError::illegal_state("CASE needs at least one WHEN branch"));
        }
        let (parent, otherwise) = parse_or_abandon(self.parent, expression)?;
        Ok(parent.end_case(CaseExpression {
            operand: None,
            whens: self.whens,
            otherwise,
        }))
    }

    /// Close with `ELSE :param END`, binding `value`.
    pub fn otherwise_value(self, value: impl Into<ParamValue>) -> CriteriaResult<P::Output> {
        if self.whens.is_empty() {
            self.parent.abandon();
            return Err(CriteriaError::illegal_state("CASE needs at least one WHEN branch"));
        }
        Ok(self.parent.end_case(CaseExpression {
            operand: None,
            whens: self.whens,
            otherwise: Expression::value(value),
        }))
    }
}

/// Collects the condition of one `WHEN` branch.
pub struct WhenParent<P: CaseParent> {
    case: CaseWhenBuilder<P>,
}

impl<P: CaseParent> PredicateParent for WhenParent<P> {
    type Output = CaseThenBuilder<P>;

    fn end_predicate(self, predicate: Predicate) -> CaseThenBuilder<P> {
        CaseThenBuilder {
            case: self.case,
            condition: predicate,
        }
    }

    fn abandon(self) {
        self.case.parent.abandon();
    }
}

/// A `WHEN` branch waiting for its `THEN` result.
#[must_use = "call `then` to complete the branch"]
pub struct CaseThenBuilder<P: CaseParent> {
    case: CaseWhenBuilder<P>,
    condition: Predicate,
}

impl<P: CaseParent> CaseThenBuilder<P> {
    pub fn then(self, expression: &str) -> CriteriaResult<CaseWhenBuilder<P>> {
        match parser::parse(expression) {
            Ok(result) => Ok(self.push(result)),
            Err(e) => {
                self.case.parent.abandon();
                Err(e)
            }
        }
    }

    pub fn then_value(self, value: impl Into<ParamValue>) -> CaseWhenBuilder<P> {
        self.push(Expression::value(value))
    }

    fn push(self, result: Expression) -> CaseWhenBuilder<P> {
        let mut case = self.case;
        case.whens.push(CaseWhen {
            condition: WhenCondition::Predicate(self.condition),
            result,
        });
        case
    }
}

/// Simple `CASE operand WHEN value THEN .. ELSE .. END`.
#[must_use = "call `otherwise` to attach the expression"]
pub struct SimpleCaseWhenBuilder<P: CaseParent> {
    parent: P,
    operand: Expression,
    whens: Vec<CaseWhen>,
}

impl<P: CaseParent> SimpleCaseWhenBuilder<P> {
    pub fn new(parent: P, operand: Expression) -> Self {
        Self {
            parent,
            operand,
            whens: Vec::new(),
        }
    }

    /// Add `WHEN value THEN result`, both given as expression text.
    pub fn when(self, value: &str, result: &str) -> CriteriaResult<Self> {
        let parsed = parser::parse(value).and_then(|value| Ok((value, parser::parse(result)?)));
        match parsed {
            Ok((value, result)) => {
                let mut builder = self;
                builder.whens.push(CaseWhen {
                    condition: WhenCondition::Value(value),
                    result,
                });
                Ok(builder)
            }
            Err(e) => {
                self.parent.abandon();
                Err(e)
            }
        }
    }

    pub fn otherwise(self, expression: &str) -> CriteriaResult<P::Output> {
        if self.whens.is_empty() {
            self.parent.abandon();
            return Err(CriteriaError::illegal_state("CASE needs at least one WHEN branch"));
        }
        let (parent, otherwise) = parse_or_abandon(self.parent, expression)?;
        Ok(parent.end_case(CaseExpression {
            operand: Some(self.operand),
            whens: self.whens,
            otherwise,
        }))
    }
}
