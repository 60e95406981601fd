use crate::ast::*;
use crate::builders::PredicateParent;
use crate::error::CriteriaResult;
use crate::parser;

/// Builds one restriction on a left-hand expression.
#[must_use = "a restriction builder does nothing until a terminal method is called"]
pub struct RestrictionBuilder<P: PredicateParent> {
    parent: P,
    left: Expression,
}

impl<P: PredicateParent> RestrictionBuilder<P> {
    pub fn new(parent: P, left: Expression) -> Self {
        Self { parent, left }
    }

    pub fn left(&self) -> &Expression {
        &self.left
    }

    fn finish(self, predicate: impl FnOnce(Expression) -> Predicate) -> P::Output {
        let predicate = predicate(self.left);
        self.parent.end_predicate(predicate)
    }

    /// Parse `text`; on failure the pending predicate is abandoned.
    fn finish_with(
        self,
        text: &str,
        predicate: impl FnOnce(Expression, Expression) -> Predicate,
    ) -> CriteriaResult<P::Output> {
        match parser::parse(text) {
            Ok(right) => Ok(self.finish(|left| predicate(left, right))),
            Err(e) => {
                self.parent.abandon();
                Err(e)
            }
        }
    }

    fn compare(self, op: CompareOp, right: Expression) -> P::Output {
        self.finish(|left| Predicate::compare(op, left, right))
    }

    /// `left = value`.
    ///
    /// Value terminals return the parent directly, so a `Null` value is not
    /// rejected here: rendering fails with `NullInput` instead. Use
    /// [`is_null`](Self::is_null) to compare against NULL.
    pub fn eq(self, value: impl Into<ParamValue>) -> P::Output {
        self.compare(CompareOp::Eq, Expression::value(value))
    }

    pub fn ne(self, value: impl Into<ParamValue>) -> P::Output {
        self.compare(CompareOp::Ne, Expression::value(value))
    }

    pub fn gt(self, value: impl Into<ParamValue>) -> P::Output {
        self.compare(CompareOp::Gt, Expression::value(value))
    }

    pub fn ge(self, value: impl Into<ParamValue>) -> P::Output {
        self.compare(CompareOp::Ge, Expression::value(value))
    }

    pub fn lt(self, value: impl Into<ParamValue>) -> P::Output {
        self.compare(CompareOp::Lt, Expression::value(value))
    }

    pub fn le(self, value: impl Into<ParamValue>) -> P::Output {
        self.compare(CompareOp::Le, Expression::value(value))
    }

    /// Compare against another expression, e.g. `eq_expression("d.owner.age")`.
    pub fn compare_expression(self, op: CompareOp, text: &str) -> CriteriaResult<P::Output> {
        self.finish_with(text, |left, right| Predicate::compare(op, left, right))
    }

    pub fn eq_expression(self, text: &str) -> CriteriaResult<P::Output> {
        self.compare_expression(CompareOp::Eq, text)
    }

    pub fn ne_expression(self, text: &str) -> CriteriaResult<P::Output> {
        self.compare_expression(CompareOp::Ne, text)
    }

    pub fn gt_expression(self, text: &str) -> CriteriaResult<P::Output> {
        self.compare_expression(CompareOp::Gt, text)
    }

    pub fn ge_expression(self, text: &str) -> CriteriaResult<P::Output> {
        self.compare_expression(CompareOp::Ge, text)
    }

    pub fn lt_expression(self, text: &str) -> CriteriaResult<P::Output> {
        self.compare_expression(CompareOp::Lt, text)
    }

    pub fn le_expression(self, text: &str) -> CriteriaResult<P::Output> {
        self.compare_expression(CompareOp::Le, text)
    }

    /// Start a comparison whose right-hand side (and quantifier) come later.
    pub fn quantified(self, op: CompareOp) -> QuantifiableBuilder<P> {
        QuantifiableBuilder {
            inner: self,
            op,
            quantifier: Quantifier::One,
        }
    }

    pub fn eq_quantified(self) -> QuantifiableBuilder<P> {
        self.quantified(CompareOp::Eq)
    }

    pub fn ne_quantified(self) -> QuantifiableBuilder<P> {
        self.quantified(CompareOp::Ne)
    }

    pub fn gt_quantified(self) -> QuantifiableBuilder<P> {
        self.quantified(CompareOp::Gt)
    }

    pub fn ge_quantified(self) -> QuantifiableBuilder<P> {
        self.quantified(CompareOp::Ge)
    }

    pub fn lt_quantified(self) -> QuantifiableBuilder<P> {
        self.quantified(CompareOp::Lt)
    }

    pub fn le_quantified(self) -> QuantifiableBuilder<P> {
        self.quantified(CompareOp::Le)
    }

    pub fn between(
        self,
        lower: impl Into<ParamValue>,
        upper: impl Into<ParamValue>,
    ) -> P::Output {
        let (lower, upper) = (Expression::value(lower), Expression::value(upper));
        self.finish(|expr| Predicate::Between { expr, lower, upper })
    }

    pub fn not_between(
        self,
        lower: impl Into<ParamValue>,
        upper: impl Into<ParamValue>,
    ) -> P::Output {
        let (lower, upper) = (Expression::value(lower), Expression::value(upper));
        self.finish(|expr| Predicate::Between { expr, lower, upper }.negate())
    }

    pub fn in_list<T: Into<ParamValue>>(self, values: Vec<T>) -> P::Output {
        let values = Expression::value(values);
        self.finish(|expr| Predicate::In { expr, values })
    }

    pub fn not_in_list<T: Into<ParamValue>>(self, values: Vec<T>) -> P::Output {
        let values = Expression::value(values);
        self.finish(|expr| Predicate::In { expr, values }.negate())
    }

    /// `IN (expression)`, with a collection path or a `:name` parameter.
    pub fn in_expression(self, text: &str) -> CriteriaResult<P::Output> {
        self.finish_with(text, |expr, values| Predicate::In { expr, values })
    }

    pub fn not_in_expression(self, text: &str) -> CriteriaResult<P::Output> {
        self.finish_with(text, |expr, values| Predicate::In { expr, values }.negate())
    }

    pub fn is_null(self) -> P::Output {
        self.finish(Predicate::IsNull)
    }

    pub fn is_not_null(self) -> P::Output {
        self.finish(|expr| Predicate::IsNull(expr).negate())
    }

    pub fn is_empty(self) -> P::Output {
        self.finish(Predicate::IsEmpty)
    }

    pub fn is_not_empty(self) -> P::Output {
        self.finish(|expr| Predicate::IsEmpty(expr).negate())
    }

    pub fn is_member_of(self, collection: &str) -> CriteriaResult<P::Output> {
        self.finish_with(collection, |expr, collection| Predicate::IsMemberOf {
            expr,
            collection,
        })
    }

    pub fn is_not_member_of(self, collection: &str) -> CriteriaResult<P::Output> {
        self.finish_with(collection, |expr, collection| {
            Predicate::IsMemberOf { expr, collection }.negate()
        })
    }

    /// Case-sensitive `LIKE` without escape character.
    pub fn like(self, pattern: impl Into<String>) -> P::Output {
        self.like_with(pattern, true, None)
    }

    pub fn not_like(self, pattern: impl Into<String>) -> P::Output {
        self.not_like_with(pattern, true, None)
    }

    /// With `case_sensitive = false` both sides are wrapped in `UPPER`.
    pub fn like_with(
        self,
        pattern: impl Into<String>,
        case_sensitive: bool,
        escape: Option<char>,
    ) -> P::Output {
        let pattern = Expression::value(pattern.into());
        self.finish(|expr| like(expr, pattern, case_sensitive, escape))
    }

    pub fn not_like_with(
        self,
        pattern: impl Into<String>,
        case_sensitive: bool,
        escape: Option<char>,
    ) -> P::Output {
        let pattern = Expression::value(pattern.into());
        self.finish(|expr| like(expr, pattern, case_sensitive, escape).negate())
    }

    /// `LIKE` against a pattern expression such as `d.owner.name`.
    pub fn like_expression(
        self,
        text: &str,
        case_sensitive: bool,
        escape: Option<char>,
    ) -> CriteriaResult<P::Output> {
        self.finish_with(text, |expr, pattern| like(expr, pattern, case_sensitive, escape))
    }

    pub fn not_like_expression(
        self,
        text: &str,
        case_sensitive: bool,
        escape: Option<char>,
    ) -> CriteriaResult<P::Output> {
        self.finish_with(text, |expr, pattern| {
            like(expr, pattern, case_sensitive, escape).negate()
        })
    }
}

fn like(expr: Expression, pattern: Expression, case_sensitive: bool, escape: Option<char>) -> Predicate {
    let (expr, pattern) = if case_sensitive {
        (expr, pattern)
    } else {
        (expr.upper(), pattern.upper())
    };
    Predicate::Like {
        expr,
        pattern,
        case_sensitive,
        escape,
    }
}

/// A comparison waiting for its right-hand side, optionally quantified.
#[must_use = "a quantified comparison does nothing until `value` or `expression` is called"]
pub struct QuantifiableBuilder<P: PredicateParent> {
    inner: RestrictionBuilder<P>,
    op: CompareOp,
    quantifier: Quantifier,
}

impl<P: PredicateParent> QuantifiableBuilder<P> {
    pub fn all(mut self) -> Self {
        self.quantifier = Quantifier::All;
        self
    }

    pub fn any(mut self) -> Self {
        self.quantifier = Quantifier::Any;
        self
    }

    pub fn some(mut self) -> Self {
        self.quantifier = Quantifier::Some;
        self
    }

    pub fn quantifier(mut self, quantifier: Quantifier) -> Self {
        self.quantifier = quantifier;
        self
    }

    fn predicate(op: CompareOp, quantifier: Quantifier, left: Expression, right: Expression) -> Predicate {
        Predicate::Compare {
            op,
            left,
            right,
            quantifier,
        }
    }

    pub fn value(self, value: impl Into<ParamValue>) -> P::Output {
        let (op, quantifier) = (self.op, self.quantifier);
        let right = Expression::value(value);
        self.inner
            .finish(|left| Self::predicate(op, quantifier, left, right))
    }

    pub fn expression(self, text: &str) -> CriteriaResult<P::Output> {
        let (op, quantifier) = (self.op, self.quantifier);
        self.inner
            .finish_with(text, |left, right| Self::predicate(op, quantifier, left, right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collects predicates; `abandoned` records give-ups.
    #[derive(Default)]
    struct Sink {
        predicates: Vec<Predicate>,
        abandoned: bool,
    }

    impl PredicateParent for &mut Sink {
        type Output = ();

        fn end_predicate(self, predicate: Predicate) {
            self.predicates.push(predicate);
        }

        fn abandon(self) {
            self.abandoned = true;
        }
    }

    fn age() -> Expression {
        Expression::property("d", Some("age"))
    }

    #[test]
    fn test_compare_and_negations() {
        let mut sink = Sink::default();
        RestrictionBuilder::new(&mut sink, age()).is_not_null();
        RestrictionBuilder::new(&mut sink, age()).not_between(1, 5);
        assert!(matches!(&sink.predicates[0], Predicate::Not(inner) if matches!(**inner, Predicate::IsNull(_))));
        assert!(matches!(&sink.predicates[1], Predicate::Not(inner) if matches!(**inner, Predicate::Between { .. })));
    }

    #[test]
    fn test_case_insensitive_like_wraps_both_sides() {
        let mut sink = Sink::default();
        RestrictionBuilder::new(&mut sink, age()).like_with("a%", false, None);
        let Predicate::Like { expr, pattern, .. } = &sink.predicates[0] else {
            panic!("expected like");
        };
        assert_eq!(expr.to_string(), "UPPER(d.age)");
        assert!(pattern.to_string().starts_with("UPPER("));
    }

    #[test]
    fn test_quantified_comparison() {
        let mut sink = Sink::default();
        RestrictionBuilder::new(&mut sink, age())
            .gt_quantified()
            .all()
            .expression("d.partners.age")
            .unwrap();
        assert!(matches!(
            &sink.predicates[0],
            Predicate::Compare {
                op: CompareOp::Gt,
                quantifier: Quantifier::All,
                ..
            }
        ));
    }

    #[test]
    fn test_null_value_kept_until_render() {
        let mut sink = Sink::default();
        RestrictionBuilder::new(&mut sink, age()).eq(None::<i64>);
        let predicate = &sink.predicates[0];
        assert!(!sink.abandoned);

        let mut registry = crate::transpiler::ParameterRegistry::new();
        let options = crate::transpiler::RenderOptions::default();
        let err = crate::transpiler::QueryGenerator::new(&mut registry, &options)
            .predicate(predicate)
            .unwrap_err();
        assert!(matches!(err, crate::error::CriteriaError::NullInput(_)));
    }

    #[test]
    fn test_syntax_error_abandons() {
        let mut sink = Sink::default();
        let result = RestrictionBuilder::new(&mut sink, age()).eq_expression("d.owner[");
        assert!(result.is_err());
        assert!(sink.abandoned);
        assert!(sink.predicates.is_empty());
    }
}
