//! Configuration and criteria documents.
//!
//! `Config` is read from `criteria.toml` (or the user config directory) and
//! carries render options and CLI defaults. A [`CriteriaDocument`] describes
//! one criteria in TOML so the CLI can build and render it:
//!
//! ```toml
//! entity = "Document"
//! alias = "d"
//! group_by = ["d.owner"]
//!
//! [[select]]
//! expr = "d.contacts[1].name"
//!
//! [[where]]
//! expr = "d.age"
//! op = "gt"
//! value = 18
//!
//! [[order_by]]
//! expr = "d.name"
//! direction = "desc"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::ast::*;
use crate::builders::{PredicateParent, RestrictionBuilder};
use crate::criteria::Criteria;
use crate::error::{CriteriaError, CriteriaResult};
use crate::transpiler::RenderOptions;

const CONFIG_FILE: &str = "criteria.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size used when the CLI is not given one.
    pub page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub render: RenderOptions,
    pub pagination: PaginationConfig,
}

impl Config {
    /// Load from `explicit`, else `./criteria.toml`, else the user config
    /// directory, else defaults.
    pub fn load(explicit: Option<&Path>) -> CriteriaResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        for candidate in Self::candidates() {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }
        debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("criteria").join("config.toml"));
        }
        paths
    }

    pub fn from_file(path: &Path) -> CriteriaResult<Self> {
        let content = fs::read_to_string(path)?;
        debug!(path = %path.display(), "configuration loaded");
        Self::from_toml(&content)
    }

    pub fn from_toml(text: &str) -> CriteriaResult<Self> {
        let config: Config = toml::from_str(text).map_err(|e| CriteriaError::Config(e.to_string()))?;
        if config.render.id_attribute.trim().is_empty() {
            return Err(CriteriaError::Config("render.id_attribute must not be empty".into()));
        }
        if config.pagination.page_size == 0 {
            return Err(CriteriaError::Config("pagination.page_size must be positive".into()));
        }
        Ok(config)
    }
}

/// A criteria described in TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CriteriaDocument {
    pub entity: Option<String>,
    pub alias: Option<String>,
    pub distinct: bool,
    pub select: Vec<SelectDoc>,
    pub join: Vec<JoinDoc>,
    #[serde(rename = "where")]
    pub where_: Vec<RestrictionDoc>,
    pub group_by: Vec<String>,
    pub having: Vec<RestrictionDoc>,
    pub order_by: Vec<OrderByDoc>,
    pub parameters: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelectDoc {
    pub expr: Option<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinDoc {
    pub path: Option<String>,
    pub alias: Option<String>,
    #[serde(default = "default_join_kind")]
    pub kind: JoinKind,
    #[serde(default)]
    pub fetch: bool,
}

fn default_join_kind() -> JoinKind {
    JoinKind::Left
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrderByDoc {
    pub expr: Option<String>,
    pub direction: Direction,
    /// Defaults to the target language's null ordering.
    pub nulls_first: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Between,
    NotBetween,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
    MemberOf,
    NotMemberOf,
    Like,
    NotLike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantifierDoc {
    All,
    Any,
    Some,
}

/// One restriction. The right-hand side is either `value`, `values`
/// (between / in) or an `expression`.
#[derive(Debug, Clone, Deserialize)]
pub struct RestrictionDoc {
    pub expr: Option<String>,
    pub op: RestrictionOp,
    pub value: Option<toml::Value>,
    pub values: Option<Vec<toml::Value>>,
    pub expression: Option<String>,
    pub quantifier: Option<QuantifierDoc>,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
    pub escape: Option<String>,
}

fn default_case_sensitive() -> bool {
    true
}

/// Right-hand side of a validated restriction.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Value(ParamValue),
    Expression(String),
}

/// A restriction whose inputs are checked, ready to drive a builder.
#[derive(Debug, Clone, PartialEq)]
enum Restriction {
    Compare {
        op: CompareOp,
        quantifier: Quantifier,
        right: Operand,
    },
    Between {
        lower: ParamValue,
        upper: ParamValue,
        negated: bool,
    },
    In {
        values: Operand,
        negated: bool,
    },
    IsNull {
        negated: bool,
    },
    IsEmpty {
        negated: bool,
    },
    MemberOf {
        collection: String,
        negated: bool,
    },
    Like {
        pattern: Operand,
        case_sensitive: bool,
        escape: Option<char>,
        negated: bool,
    },
}

impl RestrictionDoc {
    fn operand(&self) -> CriteriaResult<Operand> {
        match (&self.value, &self.expression) {
            (Some(value), None) => Ok(Operand::Value(param_value(value)?)),
            (None, Some(expression)) => Ok(Operand::Expression(expression.clone())),
            (Some(_), Some(_)) => Err(CriteriaError::Config(format!(
                "{:?} takes either 'value' or 'expression', not both",
                self.op
            ))),
            (None, None) => Err(CriteriaError::NullInput("restriction value")),
        }
    }

    fn validate(&self) -> CriteriaResult<Restriction> {
        let compare = |op| -> CriteriaResult<Restriction> {
            let quantifier = match self.quantifier {
                None => Quantifier::One,
                Some(QuantifierDoc::All) => Quantifier::All,
                Some(QuantifierDoc::Any) => Quantifier::Any,
                Some(QuantifierDoc::Some) => Quantifier::Some,
            };
            Ok(Restriction::Compare {
                op,
                quantifier,
                right: self.operand()?,
            })
        };

        match self.op {
            RestrictionOp::Eq => compare(CompareOp::Eq),
            RestrictionOp::Ne => compare(CompareOp::Ne),
            RestrictionOp::Gt => compare(CompareOp::Gt),
            RestrictionOp::Ge => compare(CompareOp::Ge),
            RestrictionOp::Lt => compare(CompareOp::Lt),
            RestrictionOp::Le => compare(CompareOp::Le),
            RestrictionOp::Between | RestrictionOp::NotBetween => {
                let values = self
                    .values
                    .as_ref()
                    .ok_or(CriteriaError::NullInput("between values"))?;
                let [lower, upper] = values.as_slice() else {
                    return Err(CriteriaError::Config(
                        "between takes exactly two values".into(),
                    ));
                };
                Ok(Restriction::Between {
                    lower: param_value(lower)?,
                    upper: param_value(upper)?,
                    negated: self.op == RestrictionOp::NotBetween,
                })
            }
            RestrictionOp::In | RestrictionOp::NotIn => {
                let values = match (&self.values, &self.expression) {
                    (Some(values), None) => Operand::Value(ParamValue::List(
                        values.iter().map(param_value).collect::<CriteriaResult<_>>()?,
                    )),
                    _ => self.operand()?,
                };
                Ok(Restriction::In {
                    values,
                    negated: self.op == RestrictionOp::NotIn,
                })
            }
            RestrictionOp::IsNull | RestrictionOp::IsNotNull => Ok(Restriction::IsNull {
                negated: self.op == RestrictionOp::IsNotNull,
            }),
            RestrictionOp::IsEmpty | RestrictionOp::IsNotEmpty => Ok(Restriction::IsEmpty {
                negated: self.op == RestrictionOp::IsNotEmpty,
            }),
            RestrictionOp::MemberOf | RestrictionOp::NotMemberOf => Ok(Restriction::MemberOf {
                collection: self
                    .expression
                    .clone()
                    .ok_or(CriteriaError::NullInput("member-of collection expression"))?,
                negated: self.op == RestrictionOp::NotMemberOf,
            }),
            RestrictionOp::Like | RestrictionOp::NotLike => {
                let pattern = self.operand()?;
                if let Operand::Value(value) = &pattern {
                    if !matches!(value, ParamValue::String(_)) {
                        return Err(CriteriaError::Config("like pattern must be a string".into()));
                    }
                }
                let escape = match &self.escape {
                    None => None,
                    Some(text) => {
                        let mut chars = text.chars();
                        match (chars.next(), chars.next()) {
                            (Some(c), None) => Some(c),
                            _ => {
                                return Err(CriteriaError::Config(format!(
                                    "escape must be a single character, got '{}'",
                                    text
                                )));
                            }
                        }
                    }
                };
                Ok(Restriction::Like {
                    pattern,
                    case_sensitive: self.case_sensitive,
                    escape,
                    negated: self.op == RestrictionOp::NotLike,
                })
            }
        }
    }
}

impl Restriction {
    fn apply<P: PredicateParent>(self, builder: RestrictionBuilder<P>) -> CriteriaResult<P::Output> {
        match self {
            Restriction::Compare {
                op,
                quantifier,
                right,
            } => {
                let builder = builder.quantified(op).quantifier(quantifier);
                match right {
                    Operand::Value(value) => Ok(builder.value(value)),
                    Operand::Expression(text) => builder.expression(&text),
                }
            }
            Restriction::Between {
                lower,
                upper,
                negated: false,
            } => Ok(builder.between(lower, upper)),
            Restriction::Between { lower, upper, .. } => Ok(builder.not_between(lower, upper)),
            Restriction::In { values, negated } => match (values, negated) {
                (Operand::Value(ParamValue::List(items)), false) => Ok(builder.in_list(items)),
                (Operand::Value(ParamValue::List(items)), true) => Ok(builder.not_in_list(items)),
                (Operand::Value(value), false) => Ok(builder.in_list(vec![value])),
                (Operand::Value(value), true) => Ok(builder.not_in_list(vec![value])),
                (Operand::Expression(text), false) => builder.in_expression(&text),
                (Operand::Expression(text), true) => builder.not_in_expression(&text),
            },
            Restriction::IsNull { negated: false } => Ok(builder.is_null()),
            Restriction::IsNull { negated: true } => Ok(builder.is_not_null()),
            Restriction::IsEmpty { negated: false } => Ok(builder.is_empty()),
            Restriction::IsEmpty { negated: true } => Ok(builder.is_not_empty()),
            Restriction::MemberOf {
                collection,
                negated: false,
            } => builder.is_member_of(&collection),
            Restriction::MemberOf { collection, .. } => builder.is_not_member_of(&collection),
            Restriction::Like {
                pattern,
                case_sensitive,
                escape,
                negated,
            } => match (pattern, negated) {
                (Operand::Value(ParamValue::String(p)), false) => {
                    Ok(builder.like_with(p, case_sensitive, escape))
                }
                (Operand::Value(ParamValue::String(p)), true) => {
                    Ok(builder.not_like_with(p, case_sensitive, escape))
                }
                (Operand::Value(value), false) => {
                    Ok(builder.like_with(value.to_string(), case_sensitive, escape))
                }
                (Operand::Value(value), true) => {
                    Ok(builder.not_like_with(value.to_string(), case_sensitive, escape))
                }
                (Operand::Expression(text), false) => {
                    builder.like_expression(&text, case_sensitive, escape)
                }
                (Operand::Expression(text), true) => {
                    builder.not_like_expression(&text, case_sensitive, escape)
                }
            },
        }
    }
}

/// Convert a TOML value into a parameter value.
pub fn param_value(value: &toml::Value) -> CriteriaResult<ParamValue> {
    match value {
        toml::Value::String(s) => Ok(ParamValue::String(s.clone())),
        toml::Value::Integer(n) => Ok(ParamValue::Int(*n)),
        toml::Value::Float(f) => Ok(ParamValue::Float(*f)),
        toml::Value::Boolean(b) => Ok(ParamValue::Bool(*b)),
        toml::Value::Datetime(dt) => {
            let text = dt.to_string();
            if let Ok(ts) = DateTime::parse_from_rfc3339(&text) {
                return Ok(ParamValue::Timestamp(ts.with_timezone(&Utc)));
            }
            NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .map(ParamValue::Date)
                .map_err(|_| CriteriaError::Config(format!("unsupported datetime '{}'", text)))
        }
        toml::Value::Array(items) => Ok(ParamValue::List(
            items.iter().map(param_value).collect::<CriteriaResult<_>>()?,
        )),
        toml::Value::Table(_) => Err(CriteriaError::Config(
            "tables cannot be used as parameter values".into(),
        )),
    }
}

impl CriteriaDocument {
    pub fn from_toml(text: &str) -> CriteriaResult<Self> {
        toml::from_str(text).map_err(|e| CriteriaError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> CriteriaResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Replay the document as builder calls.
    pub fn build(&self, options: RenderOptions) -> CriteriaResult<Criteria> {
        let entity = self.entity.as_deref().ok_or(CriteriaError::NullInput("entity"))?;
        let alias = self.alias.as_deref().ok_or(CriteriaError::NullInput("alias"))?;
        let mut criteria = Criteria::from(entity, alias)?.with_options(options);

        if self.distinct {
            criteria.distinct()?;
        }
        for join in &self.join {
            let path = join.path.as_deref().ok_or(CriteriaError::NullInput("join.path"))?;
            let alias = join.alias.as_deref().ok_or(CriteriaError::NullInput("join.alias"))?;
            criteria.join(path, alias, join.kind, join.fetch)?;
        }
        for select in &self.select {
            let expr = select.expr.as_deref().ok_or(CriteriaError::NullInput("select.expr"))?;
            match &select.alias {
                Some(alias) => criteria.select_as(expr, alias)?,
                None => criteria.select(expr)?,
            };
        }
        for restriction in &self.where_ {
            let expr = restriction.expr.as_deref().ok_or(CriteriaError::NullInput("where.expr"))?;
            let validated = restriction.validate()?;
            validated.apply(criteria.where_(expr)?)?;
        }
        for expr in &self.group_by {
            criteria.group_by(expr)?;
        }
        for restriction in &self.having {
            let expr = restriction.expr.as_deref().ok_or(CriteriaError::NullInput("having.expr"))?;
            let validated = restriction.validate()?;
            validated.apply(criteria.having(expr)?)?;
        }
        for order in &self.order_by {
            let expr = order.expr.as_deref().ok_or(CriteriaError::NullInput("order_by.expr"))?;
            let ascending = order.direction == Direction::Asc;
            let nulls_first = order
                .nulls_first
                .unwrap_or_else(|| criteria.options().nulls.nulls_first_by_default(ascending));
            criteria.order_by(expr, ascending, nulls_first)?;
        }
        for (name, value) in &self.parameters {
            criteria.set_parameter(name, param_value(value)?);
        }
        Ok(criteria)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_defaults_and_overrides() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.render.id_attribute, "id");
        assert_eq!(config.pagination.page_size, 20);

        let config = Config::from_toml(
            r#"
            [render]
            id_attribute = "uuid"
            nulls = "smallest"

            [pagination]
            page_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.render.id_attribute, "uuid");
        assert_eq!(config.render.nulls, NullPrecedence::Smallest);
        assert_eq!(config.pagination.page_size, 50);
    }

    #[test]
    fn test_config_rejects_zero_page_size() {
        let err = Config::from_toml("[pagination]\npage_size = 0").unwrap_err();
        assert!(matches!(err, CriteriaError::Config(_)));
    }

    #[test]
    fn test_document_build() {
        let doc = CriteriaDocument::from_toml(
            r#"
            entity = "Document"
            alias = "d"
            group_by = ["d.owner"]

            [[select]]
            expr = "d.owner"

            [[select]]
            expr = "COUNT(d.id)"
            alias = "total"

            [[where]]
            expr = "d.name"
            op = "like"
            value = "a%"
            case_sensitive = false

            [[where]]
            expr = "d.age"
            op = "between"
            values = [18, 65]

            [[having]]
            expr = "COUNT(d.id)"
            op = "gt"
            expression = ":minimum"

            [parameters]
            minimum = 2
            "#,
        )
        .unwrap();
        let mut criteria = doc.build(RenderOptions::default()).unwrap();
        let query = criteria.query().unwrap();
        assert_eq!(
            query.text,
            "SELECT d.owner, COUNT(d.id) AS total FROM Document d \
             WHERE UPPER(d.name) LIKE UPPER(:param_0) AND d.age BETWEEN :param_1 AND :param_2 \
             GROUP BY d.owner HAVING COUNT(d.id) > :minimum"
        );
        assert_eq!(query.parameters["minimum"], ParamValue::Int(2));
        assert_eq!(query.parameters["param_0"], ParamValue::String("a%".into()));
    }

    #[test]
    fn test_document_missing_fields() {
        let doc = CriteriaDocument::from_toml("alias = \"d\"").unwrap();
        assert!(matches!(
            doc.build(RenderOptions::default()),
            Err(CriteriaError::NullInput("entity"))
        ));

        let doc = CriteriaDocument::from_toml(
            r#"
            entity = "Document"
            alias = "d"

            [[where]]
            expr = "d.age"
            op = "gt"
            "#,
        )
        .unwrap();
        assert!(matches!(
            doc.build(RenderOptions::default()),
            Err(CriteriaError::NullInput(_))
        ));
    }

    #[test]
    fn test_param_value_conversion() {
        let value: toml::Value = toml::from_str::<toml::Table>("v = [1, 'a', true]").unwrap()["v"].clone();
        assert_eq!(
            param_value(&value).unwrap(),
            ParamValue::List(vec![
                ParamValue::Int(1),
                ParamValue::String("a".into()),
                ParamValue::Bool(true),
            ])
        );
    }
}
