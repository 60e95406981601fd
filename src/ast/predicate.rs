use std::collections::BTreeSet;

use crate::ast::{CompareOp, Expression, Quantifier};
use crate::error::CriteriaResult;

/// Boolean predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        op: CompareOp,
        left: Expression,
        right: Expression,
        quantifier: Quantifier,
    },
    Between {
        expr: Expression,
        lower: Expression,
        upper: Expression,
    },
    /// `values` is either a list parameter or a sub-expression.
    In {
        expr: Expression,
        values: Expression,
    },
    Like {
        expr: Expression,
        pattern: Expression,
        case_sensitive: bool,
        escape: Option<char>,
    },
    IsNull(Expression),
    IsEmpty(Expression),
    IsMemberOf {
        expr: Expression,
        collection: Expression,
    },
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

/// Combinator kind, used to decide where parentheses are needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
    Leaf,
}

impl Predicate {
    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Predicate::Compare {
            op,
            left,
            right,
            quantifier: Quantifier::One,
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Conjunction, flattening nested `And` children. A single child is returned as is.
    pub fn and(children: Vec<Predicate>) -> Self {
        Self::combine(children, Combinator::And)
    }

    /// Disjunction, flattening nested `Or` children. A single child is returned as is.
    pub fn or(children: Vec<Predicate>) -> Self {
        Self::combine(children, Combinator::Or)
    }

    fn combine(children: Vec<Predicate>, kind: Combinator) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match (kind, child) {
                (Combinator::And, Predicate::And(grand)) => flat.extend(grand),
                (Combinator::Or, Predicate::Or(grand)) => flat.extend(grand),
                (_, child) if child.is_empty_group() => {}
                (_, child) => flat.push(child),
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        match kind {
            Combinator::Or => Predicate::Or(flat),
            _ => Predicate::And(flat),
        }
    }

    pub fn combinator(&self) -> Combinator {
        match self {
            Predicate::And(_) => Combinator::And,
            Predicate::Or(_) => Combinator::Or,
            _ => Combinator::Leaf,
        }
    }

    /// An `And`/`Or` without children contributes nothing.
    pub fn is_empty_group(&self) -> bool {
        match self {
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().all(Predicate::is_empty_group)
            }
            _ => false,
        }
    }

    /// Rebuild the predicate with every contained expression passed through `f`,
    /// left to right, depth first.
    pub fn map_expressions<F>(&self, f: &mut F) -> CriteriaResult<Predicate>
    where
        F: FnMut(&Expression) -> CriteriaResult<Expression>,
    {
        Ok(match self {
            Predicate::Compare {
                op,
                left,
                right,
                quantifier,
            } => Predicate::Compare {
                op: *op,
                left: f(left)?,
                right: f(right)?,
                quantifier: *quantifier,
            },
            Predicate::Between { expr, lower, upper } => Predicate::Between {
                expr: f(expr)?,
                lower: f(lower)?,
                upper: f(upper)?,
            },
            Predicate::In { expr, values } => Predicate::In {
                expr: f(expr)?,
                values: f(values)?,
            },
            Predicate::Like {
                expr,
                pattern,
                case_sensitive,
                escape,
            } => Predicate::Like {
                expr: f(expr)?,
                pattern: f(pattern)?,
                case_sensitive: *case_sensitive,
                escape: *escape,
            },
            Predicate::IsNull(expr) => Predicate::IsNull(f(expr)?),
            Predicate::IsEmpty(expr) => Predicate::IsEmpty(f(expr)?),
            Predicate::IsMemberOf { expr, collection } => Predicate::IsMemberOf {
                expr: f(expr)?,
                collection: f(collection)?,
            },
            Predicate::Not(inner) => Predicate::Not(Box::new(inner.map_expressions(f)?)),
            Predicate::And(children) => Predicate::And(
                children
                    .iter()
                    .map(|c| c.map_expressions(f))
                    .collect::<CriteriaResult<_>>()?,
            ),
            Predicate::Or(children) => Predicate::Or(
                children
                    .iter()
                    .map(|c| c.map_expressions(f))
                    .collect::<CriteriaResult<_>>()?,
            ),
        })
    }

    /// Visit every contained expression, left to right.
    pub fn for_each_expression<F: FnMut(&Expression)>(&self, f: &mut F) {
        match self {
            Predicate::Compare { left, right, .. } => {
                f(left);
                f(right);
            }
            Predicate::Between { expr, lower, upper } => {
                f(expr);
                f(lower);
                f(upper);
            }
            Predicate::In { expr, values } => {
                f(expr);
                f(values);
            }
            Predicate::Like { expr, pattern, .. } => {
                f(expr);
                f(pattern);
            }
            Predicate::IsNull(expr) | Predicate::IsEmpty(expr) => f(expr),
            Predicate::IsMemberOf { expr, collection } => {
                f(expr);
                f(collection);
            }
            Predicate::Not(inner) => inner.for_each_expression(f),
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.for_each_expression(f);
                }
            }
        }
    }

    pub fn collect_aliases(&self, out: &mut BTreeSet<String>) {
        self.for_each_expression(&mut |e| e.collect_aliases(out));
    }
}

/// Readable form for diagnostics; bound values print as their value.
impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Compare {
                op,
                left,
                right,
                quantifier,
            } => match quantifier.keyword() {
                Some(kw) => write!(f, "{} {} {}({})", left, op, kw, right),
                None => write!(f, "{} {} {}", left, op, right),
            },
            Predicate::Between { expr, lower, upper } => {
                write!(f, "{} BETWEEN {} AND {}", expr, lower, upper)
            }
            Predicate::In { expr, values } => write!(f, "{} IN ({})", expr, values),
            Predicate::Like { expr, pattern, .. } => write!(f, "{} LIKE {}", expr, pattern),
            Predicate::IsNull(expr) => write!(f, "{} IS NULL", expr),
            Predicate::IsEmpty(expr) => write!(f, "{} IS EMPTY", expr),
            Predicate::IsMemberOf { expr, collection } => {
                write!(f, "{} MEMBER OF {}", expr, collection)
            }
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
            Predicate::And(children) | Predicate::Or(children) => {
                let joiner = if matches!(self, Predicate::And(_)) { " AND " } else { " OR " };
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", joiner)?;
                    }
                    match child.combinator() {
                        Combinator::Leaf => write!(f, "{}", child)?,
                        _ => write!(f, "({})", child)?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(field: &str) -> Predicate {
        Predicate::IsNull(Expression::property("d", Some(field)))
    }

    #[test]
    fn test_and_flattens_nested_and() {
        let nested = Predicate::And(vec![leaf("a"), leaf("b")]);
        let combined = Predicate::and(vec![nested, leaf("c")]);
        assert_eq!(combined, Predicate::And(vec![leaf("a"), leaf("b"), leaf("c")]));
    }

    #[test]
    fn test_or_keeps_nested_and() {
        let nested = Predicate::And(vec![leaf("a"), leaf("b")]);
        let combined = Predicate::or(vec![nested.clone(), leaf("c")]);
        assert_eq!(combined, Predicate::Or(vec![nested, leaf("c")]));
    }

    #[test]
    fn test_single_child_unwrapped() {
        assert_eq!(Predicate::or(vec![leaf("a")]), leaf("a"));
        assert!(Predicate::or(vec![]).is_empty_group());
    }

    #[test]
    fn test_collect_aliases() {
        let p = Predicate::and(vec![
            Predicate::compare(
                CompareOp::Eq,
                Expression::property("owner", Some("name")),
                Expression::value("x"),
            ),
            leaf("age"),
        ]);
        let mut aliases = BTreeSet::new();
        p.collect_aliases(&mut aliases);
        assert_eq!(aliases.into_iter().collect::<Vec<_>>(), vec!["d", "owner"]);
    }
}
