//! Implicit-join resolution.
//!
//! [`JoinResolver`] rewrites every unresolved [`Expression::Path`] into an
//! [`Expression::Property`] bound to a node of the join graph, joining missing
//! relationships on the way and handing array accesses to the
//! [`ArrayTransformer`]. Resolved properties pass through untouched, so running
//! the resolver twice changes nothing.

use std::collections::{BTreeMap, BTreeSet};

use crate::arrays::ArrayTransformer;
use crate::ast::*;
use crate::clauses::SelectManager;
use crate::error::{CriteriaError, CriteriaResult};
use crate::joins::{JoinManager, NodeId};

/// Rewrites expressions; clause managers apply it to everything they own.
pub trait ExpressionVisitor {
    fn visit(&mut self, expr: &Expression) -> CriteriaResult<Expression>;

    fn visit_predicate(&mut self, predicate: &Predicate) -> CriteriaResult<Predicate> {
        predicate.map_expressions(&mut |e| self.visit(e))
    }
}

pub struct JoinResolver<'a> {
    joins: &'a mut JoinManager,
    arrays: &'a mut ArrayTransformer,
    select_aliases: BTreeSet<String>,
    from_select: bool,
    join_with_object_leaf_allowed: bool,
}

impl<'a> JoinResolver<'a> {
    pub fn new(joins: &'a mut JoinManager, arrays: &'a mut ArrayTransformer) -> Self {
        Self {
            joins,
            arrays,
            select_aliases: BTreeSet::new(),
            from_select: false,
            join_with_object_leaf_allowed: true,
        }
    }

    /// Aliases introduced by the select clause, usable as bare names elsewhere.
    pub fn with_select_aliases(mut self, aliases: BTreeSet<String>) -> Self {
        self.select_aliases = aliases;
        self
    }

    pub fn set_from_select(&mut self, from_select: bool) {
        self.from_select = from_select;
    }

    pub fn set_join_with_object_leaf_allowed(&mut self, allowed: bool) {
        self.join_with_object_leaf_allowed = allowed;
    }

    fn resolve_path(&mut self, path: &PathExpression) -> CriteriaResult<Expression> {
        let Some((first, rest)) = path.elements.split_first() else {
            return Err(CriteriaError::illegal_argument("empty path expression"));
        };

        if let (PathElement::Property(name), true) = (first, rest.is_empty()) {
            if !self.from_select
                && self.select_aliases.contains(name)
                && self.joins.lookup(name).is_none()
            {
                return Ok(Expression::Property(PropertyExpression::select_alias(name)));
            }
        }

        let mut keys: Vec<(NodeId, Expression)> = Vec::new();
        let mut value_access = false;
        let (mut current, remaining) = match self.joins.lookup(first.property()) {
            Some(node) => {
                if let PathElement::ArrayAccess { index, .. } = first {
                    keys.push((node, self.visit(index)?));
                    value_access = true;
                }
                (node, rest)
            }
            None => (self.joins.root(), path.elements.as_slice()),
        };

        let mut field = None;
        for (i, element) in remaining.iter().enumerate() {
            let last = i + 1 == remaining.len();
            match element {
                PathElement::Property(name) if last => {
                    match self.joins.child(current, name) {
                        Some(child) if !value_access => current = child,
                        _ => field = Some(name.clone()),
                    }
                }
                PathElement::Property(name) => {
                    current = self.joins.implicit_join(current, name);
                    value_access = false;
                }
                PathElement::ArrayAccess { property, index } => {
                    current = self.joins.implicit_join(current, property);
                    let index = self.visit(index)?;
                    keys.push((current, index));
                    value_access = true;
                }
            }
        }

        // The outermost access restricts the member actually read, so it comes first.
        for (node, index) in keys.into_iter().rev() {
            let alias = self.joins.node(node).alias.clone();
            self.arrays.register(&alias, index);
        }

        let alias = self.joins.node(current).alias.clone();
        if value_access {
            return Ok(ArrayTransformer::value_accessor(&alias, field.as_deref()));
        }
        let property = PropertyExpression {
            base_node: Some(alias),
            field,
            value_access: false,
        };
        if property.is_object_leaf() && !self.join_with_object_leaf_allowed {
            return Err(CriteriaError::illegal_argument(format!(
                "'{}' names an entity, not a scalar attribute",
                Expression::Path(path.clone())
            )));
        }
        Ok(Expression::Property(property))
    }
}

impl ExpressionVisitor for JoinResolver<'_> {
    fn visit(&mut self, expr: &Expression) -> CriteriaResult<Expression> {
        match expr {
            Expression::Path(path) => self.resolve_path(path),
            Expression::Function(func) => Ok(Expression::Function(FunctionExpression {
                name: func.name.clone(),
                args: func
                    .args
                    .iter()
                    .map(|arg| self.visit(arg))
                    .collect::<CriteriaResult<_>>()?,
            })),
            Expression::Composite(parts) => Ok(Expression::Composite(
                parts
                    .iter()
                    .map(|part| self.visit(part))
                    .collect::<CriteriaResult<_>>()?,
            )),
            Expression::Case(case) => Ok(Expression::Case(Box::new(
                case.map_expressions(&mut |e| self.visit(e))?,
            ))),
            Expression::Property(_) | Expression::Parameter(_) | Expression::Literal(_) => {
                Ok(expr.clone())
            }
        }
    }
}

/// Replaces bare references to select aliases with the aliased expression.
///
/// Derived queries that swap out the projection run this first, since the
/// aliases disappear with it.
pub struct SelectAliasInliner<'a> {
    aliased: BTreeMap<String, Expression>,
    joins: &'a JoinManager,
}

impl<'a> SelectAliasInliner<'a> {
    pub fn new(select: &SelectManager, joins: &'a JoinManager) -> Self {
        let aliased = select
            .items()
            .iter()
            .filter_map(|item| {
                let alias = item.alias.clone()?;
                Some((alias, item.expression.clone()))
            })
            .collect();
        Self { aliased, joins }
    }

    pub fn is_empty(&self) -> bool {
        self.aliased.is_empty()
    }
}

impl ExpressionVisitor for SelectAliasInliner<'_> {
    fn visit(&mut self, expr: &Expression) -> CriteriaResult<Expression> {
        match expr {
            Expression::Path(path) => match path.elements.as_slice() {
                [PathElement::Property(name)] if self.joins.lookup(name).is_none() => {
                    Ok(self.aliased.get(name).cloned().unwrap_or_else(|| expr.clone()))
                }
                _ => Ok(expr.clone()),
            },
            Expression::Property(property) if property.is_select_alias() => {
                let name = property.field.as_deref().unwrap_or_default();
                Ok(self.aliased.get(name).cloned().unwrap_or_else(|| expr.clone()))
            }
            Expression::Function(func) => Ok(Expression::Function(FunctionExpression {
                name: func.name.clone(),
                args: func
                    .args
                    .iter()
                    .map(|arg| self.visit(arg))
                    .collect::<CriteriaResult<_>>()?,
            })),
            Expression::Composite(parts) => Ok(Expression::Composite(
                parts
                    .iter()
                    .map(|part| self.visit(part))
                    .collect::<CriteriaResult<_>>()?,
            )),
            Expression::Case(case) => Ok(Expression::Case(Box::new(
                case.map_expressions(&mut |e| self.visit(e))?,
            ))),
            Expression::Property(_) | Expression::Parameter(_) | Expression::Literal(_) => {
                Ok(expr.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn resolve(joins: &mut JoinManager, arrays: &mut ArrayTransformer, text: &str) -> String {
        let expr = parse(text).unwrap();
        JoinResolver::new(joins, arrays).visit(&expr).unwrap().to_string()
    }

    #[test]
    fn test_scalar_on_root() {
        let mut joins = JoinManager::new("Document", "d");
        let mut arrays = ArrayTransformer::new();
        assert_eq!(resolve(&mut joins, &mut arrays, "d.age"), "d.age");
        assert_eq!(resolve(&mut joins, &mut arrays, "age"), "d.age");
        assert!(joins.is_empty());
    }

    #[test]
    fn test_relationship_joined_implicitly() {
        let mut joins = JoinManager::new("Document", "d");
        let mut arrays = ArrayTransformer::new();
        assert_eq!(resolve(&mut joins, &mut arrays, "d.owner.name"), "owner.name");
        assert_eq!(resolve(&mut joins, &mut arrays, "owner.name"), "owner.name");
        assert_eq!(joins.render(None, true), "LEFT JOIN d.owner owner");
    }

    #[test]
    fn test_array_access() {
        let mut joins = JoinManager::new("Document", "d");
        let mut arrays = ArrayTransformer::new();
        assert_eq!(
            resolve(&mut joins, &mut arrays, "d.contacts[:age].localized[d.age]"),
            "VALUE(localized)"
        );
        assert_eq!(
            joins.render(None, true),
            "LEFT JOIN d.contacts contacts LEFT JOIN contacts.localized localized"
        );
        let keys: Vec<String> = arrays
            .keys()
            .iter()
            .map(|k| format!("{}={}", k.collection, k.index))
            .collect();
        assert_eq!(keys, vec!["localized=d.age", "contacts=:age"]);
    }

    #[test]
    fn test_field_after_array_access() {
        let mut joins = JoinManager::new("Document", "d");
        let mut arrays = ArrayTransformer::new();
        assert_eq!(
            resolve(&mut joins, &mut arrays, "d.contacts[1].name"),
            "VALUE(contacts).name"
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut joins = JoinManager::new("Document", "d");
        let mut arrays = ArrayTransformer::new();
        let expr = parse("UPPER(d.owner.name)").unwrap();
        let once = JoinResolver::new(&mut joins, &mut arrays).visit(&expr).unwrap();
        let snapshot = joins.clone();
        let twice = JoinResolver::new(&mut joins, &mut arrays).visit(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(joins, snapshot);
    }

    #[test]
    fn test_object_leaf_rejected_when_disallowed() {
        let mut joins = JoinManager::new("Document", "d");
        let mut arrays = ArrayTransformer::new();
        joins
            .join(&["d".into(), "owner".into()], "o", JoinKind::Left, false)
            .unwrap();
        let expr = parse("d.owner").unwrap();
        let mut resolver = JoinResolver::new(&mut joins, &mut arrays);
        resolver.set_join_with_object_leaf_allowed(false);
        assert!(matches!(
            resolver.visit(&expr),
            Err(CriteriaError::IllegalArgument(_))
        ));
        assert!(matches!(
            resolver.visit(&parse("o").unwrap()),
            Err(CriteriaError::IllegalArgument(_))
        ));
        assert_eq!(resolver.visit(&parse("o.name").unwrap()).unwrap().to_string(), "o.name");
    }

    #[test]
    fn test_select_alias_reference() {
        let mut joins = JoinManager::new("Document", "d");
        let mut arrays = ArrayTransformer::new();
        let aliases = BTreeSet::from(["ageSum".to_string()]);
        let mut resolver = JoinResolver::new(&mut joins, &mut arrays).with_select_aliases(aliases);
        let expr = parse("ageSum").unwrap();
        assert_eq!(
            resolver.visit(&expr).unwrap(),
            Expression::Property(PropertyExpression::select_alias("ageSum"))
        );
        resolver.set_from_select(true);
        assert_eq!(resolver.visit(&expr).unwrap().to_string(), "d.ageSum");
    }
}
