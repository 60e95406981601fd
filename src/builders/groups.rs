use crate::ast::Predicate;
use crate::builders::{PredicateParent, RestrictionBuilder};
use crate::error::CriteriaResult;
use crate::parser;

/// Disjunctive group: every restriction added becomes one `OR` branch.
#[must_use = "call `end()` to attach the group"]
pub struct OrBuilder<P: PredicateParent> {
    parent: P,
    children: Vec<Predicate>,
}

impl<P: PredicateParent> OrBuilder<P> {
    pub fn new(parent: P) -> Self {
        Self {
            parent,
            children: Vec::new(),
        }
    }

    /// Start a restriction on `expression` inside this group.
    pub fn restrict(self, expression: &str) -> CriteriaResult<RestrictionBuilder<Self>> {
        match parser::parse(expression) {
            Ok(left) => Ok(RestrictionBuilder::new(self, left)),
            Err(e) => {
                self.parent.abandon();
                Err(e)
            }
        }
    }

    /// Nested conjunction, one branch of this group.
    pub fn and(self) -> AndBuilder<Self> {
        AndBuilder::new(self)
    }

    /// Close the group and hand it to the parent.
    pub fn end(self) -> P::Output {
        self.parent.end_predicate(Predicate::or(self.children))
    }
}

impl<P: PredicateParent> PredicateParent for OrBuilder<P> {
    type Output = Self;

    fn end_predicate(mut self, predicate: Predicate) -> Self {
        self.children.push(predicate);
        self
    }

    fn abandon(self) {
        self.parent.abandon();
    }
}

/// Conjunctive group nested in a disjunction.
#[must_use = "call `end()` to attach the group"]
pub struct AndBuilder<P: PredicateParent> {
    parent: P,
    children: Vec<Predicate>,
}

impl<P: PredicateParent> AndBuilder<P> {
    pub fn new(parent: P) -> Self {
        Self {
            parent,
            children: Vec::new(),
        }
    }

    pub fn restrict(self, expression: &str) -> CriteriaResult<RestrictionBuilder<Self>> {
        match parser::parse(expression) {
            Ok(left) => Ok(RestrictionBuilder::new(self, left)),
            Err(e) => {
                self.parent.abandon();
                Err(e)
            }
        }
    }

    pub fn or(self) -> OrBuilder<Self> {
        OrBuilder::new(self)
    }

    pub fn end(self) -> P::Output {
        self.parent.end_predicate(Predicate::and(self.children))
    }
}

impl<P: PredicateParent> PredicateParent for AndBuilder<P> {
    type Output = Self;

    fn end_predicate(mut self, predicate: Predicate) -> Self {
        self.children.push(predicate);
        self
    }

    fn abandon(self) {
        self.parent.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_nested_groups() {
        let mut sink = Sink::default();
        OrBuilder::new(&mut sink)
            .restrict("d.age")
            .unwrap()
            .gt(18)
            .and()
            .restrict("d.name")
            .unwrap()
            .is_null()
            .restrict("d.owner")
            .unwrap()
            .is_null()
            .end()
            .end();

        let Predicate::Or(branches) = &sink.predicates[0] else {
            panic!("expected an OR group");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(
            branches[1],
            Predicate::And(vec![
                Predicate::IsNull(parser::parse("d.name").unwrap()),
                Predicate::IsNull(parser::parse("d.owner").unwrap()),
            ])
        );
    }

    #[test]
    fn test_empty_group_collapses() {
        let mut sink = Sink::default();
        OrBuilder::new(&mut sink).end();
        assert!(sink.predicates[0].is_empty_group());
    }

    #[test]
    fn test_syntax_error_abandons_through_groups() {
        let mut sink = Sink::default();
        assert!(OrBuilder::new(&mut sink).and().restrict("d.]").is_err());
        assert!(sink.abandoned);
    }
}
