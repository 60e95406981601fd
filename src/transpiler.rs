//! Query generator.
//!
//! Serializes a resolved [`QueryModel`] into query text. Bound parameter
//! values are registered in a [`ParameterRegistry`] while walking the tree
//! and replaced by their generated names (`:param_0`, `:param_1`, ...).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ast::*;
use crate::engine::Query;
use crate::error::{CriteriaError, CriteriaResult};
use crate::model::QueryModel;

const PARAM_PREFIX: &str = "param_";

/// Options that change how text is rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Identifier attribute of the root entity, used by pagination.
    pub id_attribute: String,
    /// Default null ordering of the target language.
    pub nulls: NullPrecedence,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            id_attribute: "id".to_string(),
            nulls: NullPrecedence::default(),
        }
    }
}

/// Maps bound parameters to generated names, keyed by parameter identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterRegistry {
    counter: usize,
    names: HashMap<ParamId, String>,
    values: BTreeMap<String, ParamValue>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of a bound parameter; the first lookup assigns the next free name.
    pub fn name_for(&mut self, id: ParamId, value: &ParamValue) -> CriteriaResult<String> {
        if let Some(name) = self.names.get(&id) {
            return Ok(name.clone());
        }
        if value.is_null() {
            return Err(CriteriaError::NullInput("parameter value"));
        }
        let name = format!("{}{}", PARAM_PREFIX, self.counter);
        self.counter += 1;
        trace!(name = %name, value = %value, "parameter named");
        self.names.insert(id, name.clone());
        self.values.insert(name.clone(), value.clone());
        Ok(name)
    }

    /// Values of every generated parameter, by name.
    pub fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }
}

/// Text of one rendering and the parameters it references.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub text: String,
    /// Generated parameters with their values.
    pub bound: BTreeMap<String, ParamValue>,
    /// `:name` references written in expression text.
    pub named: BTreeSet<String>,
}

impl RenderedQuery {
    /// Attach values for the named references. Names listed in `deferred`
    /// are bound later by the caller and may be missing here.
    pub fn bind(
        &self,
        values: &BTreeMap<String, ParamValue>,
        deferred: &[&str],
    ) -> CriteriaResult<Query> {
        let mut parameters = self.bound.clone();
        for name in &self.named {
            match values.get(name) {
                Some(value) => {
                    parameters.insert(name.clone(), value.clone());
                }
                None if deferred.contains(&name.as_str()) => {}
                None => {
                    return Err(CriteriaError::illegal_state(format!(
                        "parameter '{}' is not bound",
                        name
                    )));
                }
            }
        }
        Ok(Query::new(self.text.clone(), parameters))
    }
}

/// Walks resolved expressions and predicates, emitting text.
pub struct QueryGenerator<'a> {
    registry: &'a mut ParameterRegistry,
    options: &'a RenderOptions,
    bound: BTreeMap<String, ParamValue>,
    named: BTreeSet<String>,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(registry: &'a mut ParameterRegistry, options: &'a RenderOptions) -> Self {
        Self {
            registry,
            options,
            bound: BTreeMap::new(),
            named: BTreeSet::new(),
        }
    }

    pub fn options(&self) -> &RenderOptions {
        self.options
    }

    pub fn expression(&mut self, expr: &Expression) -> CriteriaResult<String> {
        match expr {
            Expression::Path(path) => Err(CriteriaError::illegal_state(format!(
                "path '{}' reached generation unresolved",
                Expression::Path(path.clone())
            ))),
            Expression::Property(prop) => Ok(prop.to_string()),
            Expression::Function(func) => {
                let args = func
                    .args
                    .iter()
                    .map(|a| self.expression(a))
                    .collect::<CriteriaResult<Vec<_>>>()?;
                Ok(format!("{}({})", func.name, args.join(", ")))
            }
            Expression::Parameter(Parameter::Named(name)) => {
                self.named.insert(name.clone());
                Ok(format!(":{}", name))
            }
            Expression::Parameter(Parameter::Bound { id, value }) => {
                let name = self.registry.name_for(*id, value)?;
                self.bound.insert(name.clone(), value.clone());
                Ok(format!(":{}", name))
            }
            Expression::Literal(text) => Ok(text.clone()),
            Expression::Composite(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&self.expression(part)?);
                }
                Ok(out)
            }
            Expression::Case(case) => self.case(case),
        }
    }

    fn case(&mut self, case: &CaseExpression) -> CriteriaResult<String> {
        let mut out = String::from("CASE");
        if let Some(operand) = &case.operand {
            out.push(' ');
            out.push_str(&self.expression(operand)?);
        }
        for when in &case.whens {
            let condition = match &when.condition {
                WhenCondition::Predicate(predicate) => self.predicate(predicate)?,
                WhenCondition::Value(value) => self.expression(value)?,
            };
            let result = self.expression(&when.result)?;
            out.push_str(&format!(" WHEN {} THEN {}", condition, result));
        }
        out.push_str(&format!(" ELSE {} END", self.expression(&case.otherwise)?));
        Ok(out)
    }

    pub fn predicate(&mut self, predicate: &Predicate) -> CriteriaResult<String> {
        match predicate {
            Predicate::Compare {
                op,
                left,
                right,
                quantifier,
            } => {
                let left = self.expression(left)?;
                let right = self.expression(right)?;
                Ok(match quantifier.keyword() {
                    Some(kw) => format!("{} {} {}({})", left, op, kw, right),
                    None => format!("{} {} {}", left, op, right),
                })
            }
            Predicate::Between { expr, lower, upper } => self.between(expr, lower, upper, false),
            Predicate::In { expr, values } => self.in_list(expr, values, false),
            Predicate::Like {
                expr,
                pattern,
                escape,
                ..
            } => self.like(expr, pattern, *escape, false),
            Predicate::IsNull(expr) => Ok(format!("{} IS NULL", self.expression(expr)?)),
            Predicate::IsEmpty(expr) => Ok(format!("{} IS EMPTY", self.expression(expr)?)),
            Predicate::IsMemberOf { expr, collection } => self.member_of(expr, collection, false),
            Predicate::Not(inner) => self.negated(inner),
            Predicate::And(children) => self.group(children, Combinator::And, " AND "),
            Predicate::Or(children) => self.group(children, Combinator::Or, " OR "),
        }
    }

    /// Negations with a dedicated keyword form render inline.
    fn negated(&mut self, inner: &Predicate) -> CriteriaResult<String> {
        match inner {
            Predicate::Between { expr, lower, upper } => self.between(expr, lower, upper, true),
            Predicate::In { expr, values } => self.in_list(expr, values, true),
            Predicate::Like {
                expr,
                pattern,
                escape,
                ..
            } => self.like(expr, pattern, *escape, true),
            Predicate::IsNull(expr) => Ok(format!("{} IS NOT NULL", self.expression(expr)?)),
            Predicate::IsEmpty(expr) => Ok(format!("{} IS NOT EMPTY", self.expression(expr)?)),
            Predicate::IsMemberOf { expr, collection } => self.member_of(expr, collection, true),
            Predicate::And(_) | Predicate::Or(_) => {
                Ok(format!("NOT ({})", self.predicate(inner)?))
            }
            _ => Ok(format!("NOT {}", self.predicate(inner)?)),
        }
    }

    fn between(
        &mut self,
        expr: &Expression,
        lower: &Expression,
        upper: &Expression,
        negated: bool,
    ) -> CriteriaResult<String> {
        Ok(format!(
            "{} {}BETWEEN {} AND {}",
            self.expression(expr)?,
            if negated { "NOT " } else { "" },
            self.expression(lower)?,
            self.expression(upper)?
        ))
    }

    fn in_list(
        &mut self,
        expr: &Expression,
        values: &Expression,
        negated: bool,
    ) -> CriteriaResult<String> {
        Ok(format!(
            "{} {}IN ({})",
            self.expression(expr)?,
            if negated { "NOT " } else { "" },
            self.expression(values)?
        ))
    }

    fn like(
        &mut self,
        expr: &Expression,
        pattern: &Expression,
        escape: Option<char>,
        negated: bool,
    ) -> CriteriaResult<String> {
        let mut out = format!(
            "{} {}LIKE {}",
            self.expression(expr)?,
            if negated { "NOT " } else { "" },
            self.expression(pattern)?
        );
        if let Some(c) = escape {
            out.push_str(&format!(" ESCAPE '{}'", c));
        }
        Ok(out)
    }

    fn member_of(
        &mut self,
        expr: &Expression,
        collection: &Expression,
        negated: bool,
    ) -> CriteriaResult<String> {
        Ok(format!(
            "{} {}MEMBER OF {}",
            self.expression(expr)?,
            if negated { "NOT " } else { "" },
            self.expression(collection)?
        ))
    }

    /// Children of the other combinator kind get parentheses.
    fn group(
        &mut self,
        children: &[Predicate],
        kind: Combinator,
        joiner: &str,
    ) -> CriteriaResult<String> {
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            if child.is_empty_group() {
                continue;
            }
            let text = self.predicate(child)?;
            let child_kind = child.combinator();
            if child_kind != Combinator::Leaf && child_kind != kind {
                parts.push(format!("({})", text));
            } else {
                parts.push(text);
            }
        }
        Ok(parts.join(joiner))
    }

    /// Render the complete query, clause by clause.
    pub fn render(mut self, model: &QueryModel) -> CriteriaResult<RenderedQuery> {
        let joins = &model.joins;
        let mut parts = Vec::new();

        let select = model.select.render(&mut self)?;
        if !select.is_empty() {
            parts.push(select);
        }
        parts.push(format!("FROM {} {}", joins.entity(), joins.root_alias()));

        let join_clause = joins.render(model.retained.as_ref(), model.fetch_allowed);
        if !join_clause.is_empty() {
            parts.push(join_clause);
        }

        for fragment in [
            model.where_.render(&mut self)?,
            model.group_by.render(&mut self)?,
            model.having.render(&mut self)?,
            model.order_by.render(&mut self)?,
        ] {
            if !fragment.is_empty() {
                parts.push(fragment);
            }
        }

        let text = parts.join(" ");
        debug!(query = %text, parameters = self.bound.len(), "query rendered");
        Ok(RenderedQuery {
            text,
            bound: self.bound,
            named: self.named,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prop(alias: &str, field: &str) -> Expression {
        Expression::property(alias, Some(field))
    }

    fn render(predicate: &Predicate) -> String {
        let mut registry = ParameterRegistry::new();
        let options = RenderOptions::default();
        QueryGenerator::new(&mut registry, &options)
            .predicate(predicate)
            .unwrap()
    }

    #[test]
    fn test_parameter_names_follow_traversal_order() {
        let predicate = Predicate::and(vec![
            Predicate::compare(CompareOp::Gt, prop("d", "age"), Expression::value(18)),
            Predicate::Between {
                expr: prop("d", "rank"),
                lower: Expression::value(1),
                upper: Expression::value(5),
            },
        ]);
        assert_eq!(
            render(&predicate),
            "d.age > :param_0 AND d.rank BETWEEN :param_1 AND :param_2"
        );
    }

    #[test]
    fn test_repeated_generation_is_stable() {
        let predicate = Predicate::compare(CompareOp::Eq, prop("d", "name"), Expression::value("x"));
        let mut registry = ParameterRegistry::new();
        let options = RenderOptions::default();
        let first = QueryGenerator::new(&mut registry, &options).predicate(&predicate).unwrap();
        let second = QueryGenerator::new(&mut registry, &options).predicate(&predicate).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.values().len(), 1);
        assert_eq!(registry.values()["param_0"], ParamValue::String("x".into()));
    }

    #[test]
    fn test_quantifier_before_right_side() {
        let predicate = Predicate::Compare {
            op: CompareOp::Gt,
            left: prop("d", "age"),
            right: prop("partners", "age"),
            quantifier: Quantifier::All,
        };
        assert_eq!(render(&predicate), "d.age > ALL(partners.age)");
    }

    #[test]
    fn test_opposite_combinators_parenthesized() {
        let or = Predicate::or(vec![
            Predicate::IsNull(prop("d", "a")),
            Predicate::IsNull(prop("d", "b")),
        ]);
        let predicate = Predicate::and(vec![Predicate::IsNull(prop("d", "c")), or]);
        assert_eq!(
            render(&predicate),
            "d.c IS NULL AND (d.a IS NULL OR d.b IS NULL)"
        );
    }

    #[test]
    fn test_negated_forms() {
        let like = Predicate::Like {
            expr: prop("d", "name").upper(),
            pattern: Expression::literal("'A%'").upper(),
            case_sensitive: false,
            escape: Some('!'),
        };
        assert_eq!(
            render(&like.negate()),
            "UPPER(d.name) NOT LIKE UPPER('A%') ESCAPE '!'"
        );
        assert_eq!(
            render(&Predicate::IsEmpty(prop("d", "contacts")).negate()),
            "d.contacts IS NOT EMPTY"
        );
        let compare = Predicate::compare(CompareOp::Eq, prop("d", "age"), Expression::literal("1"));
        assert_eq!(render(&compare.negate()), "NOT d.age = 1");
    }

    #[test]
    fn test_null_value_rejected() {
        let predicate = Predicate::compare(
            CompareOp::Eq,
            prop("d", "name"),
            Expression::value(ParamValue::Null),
        );
        let mut registry = ParameterRegistry::new();
        let options = RenderOptions::default();
        let err = QueryGenerator::new(&mut registry, &options)
            .predicate(&predicate)
            .unwrap_err();
        assert!(matches!(err, CriteriaError::NullInput(_)));
    }

    #[test]
    fn test_rendered_query_binds_named_parameters() {
        let rendered = RenderedQuery {
            text: "FROM Document d WHERE d.age = :age AND d.id IN (:ids)".into(),
            bound: BTreeMap::new(),
            named: BTreeSet::from(["age".to_string(), "ids".to_string()]),
        };
        let mut values = BTreeMap::new();
        assert!(matches!(
            rendered.bind(&values, &["ids"]),
            Err(CriteriaError::IllegalState(_))
        ));
        values.insert("age".to_string(), ParamValue::Int(30));
        let query = rendered.bind(&values, &["ids"]).unwrap();
        assert_eq!(query.parameters.len(), 1);
        assert_eq!(query.parameters["age"], ParamValue::Int(30));
    }

    #[test]
    fn test_unresolved_path_is_an_error() {
        let path = crate::parser::parse("d.owner.name").unwrap();
        let mut registry = ParameterRegistry::new();
        let options = RenderOptions::default();
        assert!(matches!(
            QueryGenerator::new(&mut registry, &options).expression(&path),
            Err(CriteriaError::IllegalState(_))
        ));
    }
}
