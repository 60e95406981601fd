//! Indexed collection access.
//!
//! `d.contacts[1].name` reads a single member of the `contacts` collection.
//! The resolver turns the access into `VALUE(contacts).name` and registers the
//! pair `(contacts, 1)` here; the pair becomes `KEY(contacts) = 1` in the root
//! WHERE clause, because the index restricts the join rather than the clause
//! the access was written in.

use tracing::debug;

use crate::ast::{CompareOp, Expression, Predicate, PropertyExpression};

/// A `(collection node, index)` pair produced by one array access.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPredicate {
    /// Alias of the join node of the indexed collection.
    pub collection: String,
    /// Resolved index expression.
    pub index: Expression,
}

impl KeyPredicate {
    /// `KEY(collection) = index`
    pub fn to_predicate(&self) -> Predicate {
        Predicate::compare(
            CompareOp::Eq,
            Expression::function("KEY", vec![Expression::property(&self.collection, None)]),
            self.index.clone(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayTransformer {
    keys: Vec<KeyPredicate>,
}

impl ArrayTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an access to `collection[index]`. Structurally equal pairs are
    /// kept once. Returns `true` when the pair was new.
    pub fn register(&mut self, collection: &str, index: Expression) -> bool {
        let key = KeyPredicate {
            collection: collection.to_string(),
            index,
        };
        if self.keys.contains(&key) {
            debug!(collection = %collection, index = %key.index, "duplicate array access ignored");
            return false;
        }
        debug!(collection = %collection, index = %key.index, "array key registered");
        self.keys.push(key);
        true
    }

    /// The member read by an access: `VALUE(collection)[.field]`.
    pub fn value_accessor(collection: &str, field: Option<&str>) -> Expression {
        Expression::Property(PropertyExpression {
            base_node: Some(collection.to_string()),
            field: field.map(str::to_string),
            value_access: true,
        })
    }

    pub fn keys(&self) -> &[KeyPredicate] {
        &self.keys
    }

    /// Key predicates in registration order.
    pub fn key_predicates(&self) -> Vec<Predicate> {
        self.keys.iter().map(KeyPredicate::to_predicate).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_dedups_structurally() {
        let mut arrays = ArrayTransformer::new();
        assert!(arrays.register("contacts", Expression::literal("1")));
        assert!(!arrays.register("contacts", Expression::literal("1")));
        assert!(arrays.register("contacts", Expression::literal("2")));
        assert!(arrays.register("localized", Expression::literal("1")));
        assert_eq!(arrays.keys().len(), 3);
    }

    #[test]
    fn test_key_predicate_shape() {
        let mut arrays = ArrayTransformer::new();
        arrays.register("contacts", Expression::property("d", Some("age")));
        assert_eq!(
            arrays.key_predicates(),
            vec![Predicate::compare(
                CompareOp::Eq,
                Expression::function("KEY", vec![Expression::property("contacts", None)]),
                Expression::property("d", Some("age")),
            )]
        );
    }

    #[test]
    fn test_value_accessor_display() {
        assert_eq!(
            ArrayTransformer::value_accessor("contacts", Some("name")).to_string(),
            "VALUE(contacts).name"
        );
        assert_eq!(
            ArrayTransformer::value_accessor("contacts", None).to_string(),
            "VALUE(contacts)"
        );
    }
}
