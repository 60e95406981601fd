use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ast::{CaseExpression, ParamValue};

static NEXT_PARAM_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a bound parameter.
///
/// Cloning an expression keeps the id, so every copy of the same bound value
/// maps to the same generated name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(u64);

impl ParamId {
    pub fn next() -> Self {
        ParamId(NEXT_PARAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A parameter reference inside an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    /// `:name` written in expression text, bound later by the caller.
    Named(String),
    /// A runtime value supplied to a builder; named `param_N` at generation.
    Bound { id: ParamId, value: ParamValue },
}

impl Parameter {
    pub fn bound(value: impl Into<ParamValue>) -> Self {
        Parameter::Bound {
            id: ParamId::next(),
            value: value.into(),
        }
    }
}

/// One element of a dotted path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathElement {
    /// Plain attribute or relationship name.
    Property(String),
    /// `name[index]`: the path prefix ending here is the indexed collection.
    /// Eliminated by the array transformer; never reaches generation.
    ArrayAccess {
        property: String,
        index: Box<Expression>,
    },
}

impl PathElement {
    pub fn property(&self) -> &str {
        match self {
            PathElement::Property(name) => name,
            PathElement::ArrayAccess { property, .. } => property,
        }
    }
}

/// Unresolved dotted path, optionally rooted at an alias.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpression {
    pub elements: Vec<PathElement>,
}

impl PathExpression {
    pub fn new(elements: Vec<PathElement>) -> Self {
        Self { elements }
    }

    pub fn has_array_access(&self) -> bool {
        self.elements
            .iter()
            .any(|e| matches!(e, PathElement::ArrayAccess { .. }))
    }
}

/// A path bound to a node of the join graph.
///
/// `base_node` is the alias of the join node (a handle, never a copy of the
/// node). `field` is the scalar attribute read from it; `None` means the path
/// names the node itself. With `value_access` the node is read through the
/// `VALUE()` accessor of an indexed collection. A property with no base node
/// refers to a select alias.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyExpression {
    pub base_node: Option<String>,
    pub field: Option<String>,
    pub value_access: bool,
}

impl PropertyExpression {
    pub fn node(alias: impl Into<String>) -> Self {
        Self {
            base_node: Some(alias.into()),
            field: None,
            value_access: false,
        }
    }

    pub fn field(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            base_node: Some(alias.into()),
            field: Some(field.into()),
            value_access: false,
        }
    }

    pub fn select_alias(alias: impl Into<String>) -> Self {
        Self {
            base_node: None,
            field: Some(alias.into()),
            value_access: false,
        }
    }

    pub fn is_select_alias(&self) -> bool {
        self.base_node.is_none()
    }

    /// Whether the property names a whole node rather than a scalar leaf.
    pub fn is_object_leaf(&self) -> bool {
        self.field.is_none() && !self.value_access
    }
}

impl std::fmt::Display for PropertyExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.base_node, &self.field) {
            (Some(base), field) => {
                if self.value_access {
                    write!(f, "VALUE({})", base)?;
                } else {
                    write!(f, "{}", base)?;
                }
                if let Some(field) = field {
                    write!(f, ".{}", field)?;
                }
                Ok(())
            }
            (None, Some(field)) => write!(f, "{}", field),
            (None, None) => Ok(()),
        }
    }
}

/// Function call `NAME(arg, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpression {
    pub name: String,
    pub args: Vec<Expression>,
}

/// A general expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Dotted path as written, resolved into a `Property` before generation.
    Path(PathExpression),
    /// Path bound to the join graph.
    Property(PropertyExpression),
    /// Function call (aggregates, UPPER, KEY, VALUE, ...)
    Function(FunctionExpression),
    /// Parameter reference
    Parameter(Parameter),
    /// Verbatim text: numbers, quoted strings, operators inside composites.
    Literal(String),
    /// Concatenation of sub-expressions (`d.age + 1`).
    Composite(Vec<Expression>),
    /// `CASE .. END`, built through the select-case builders.
    Case(Box<CaseExpression>),
}

impl Expression {
    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Function(FunctionExpression {
            name: name.into(),
            args,
        })
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Expression::Literal(text.into())
    }

    /// Wrap a runtime value as a bound parameter.
    pub fn value(value: impl Into<ParamValue>) -> Self {
        Expression::Parameter(Parameter::bound(value))
    }

    pub fn named_parameter(name: impl Into<String>) -> Self {
        Expression::Parameter(Parameter::Named(name.into()))
    }

    /// Property bound to a node (`alias`) or a node attribute (`alias.field`).
    pub fn property(alias: impl Into<String>, field: Option<&str>) -> Self {
        Expression::Property(PropertyExpression {
            base_node: Some(alias.into()),
            field: field.map(str::to_string),
            value_access: false,
        })
    }

    /// `UPPER(self)`: textual case folding used by case-insensitive LIKE.
    pub fn upper(self) -> Self {
        Expression::function("UPPER", vec![self])
    }

    /// True once no unresolved path remains anywhere in the tree.
    pub fn is_resolved(&self) -> bool {
        match self {
            Expression::Path(_) => false,
            Expression::Property(_) | Expression::Parameter(_) | Expression::Literal(_) => true,
            Expression::Function(func) => func.args.iter().all(Expression::is_resolved),
            Expression::Composite(parts) => parts.iter().all(Expression::is_resolved),
            Expression::Case(case) => {
                let mut resolved = true;
                case.for_each_expression(&mut |e| resolved &= e.is_resolved());
                resolved
            }
        }
    }

    /// Collect the join-node aliases this expression reads from.
    pub fn collect_aliases(&self, out: &mut BTreeSet<String>) {
        match self {
            Expression::Property(prop) => {
                if let Some(base) = &prop.base_node {
                    out.insert(base.clone());
                }
            }
            Expression::Function(func) => {
                for arg in &func.args {
                    arg.collect_aliases(out);
                }
            }
            Expression::Composite(parts) => {
                for part in parts {
                    part.collect_aliases(out);
                }
            }
            Expression::Case(case) => case.for_each_expression(&mut |e| e.collect_aliases(out)),
            Expression::Path(_) | Expression::Parameter(_) | Expression::Literal(_) => {}
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Path(path) => {
                for (i, element) in path.elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    match element {
                        PathElement::Property(name) => write!(f, "{}", name)?,
                        PathElement::ArrayAccess { property, index } => {
                            write!(f, "{}[{}]", property, index)?
                        }
                    }
                }
                Ok(())
            }
            Expression::Property(prop) => write!(f, "{}", prop),
            Expression::Function(func) => {
                let args: Vec<String> = func.args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", func.name, args.join(", "))
            }
            Expression::Parameter(Parameter::Named(name)) => write!(f, ":{}", name),
            Expression::Parameter(Parameter::Bound { value, .. }) => write!(f, "{}", value),
            Expression::Literal(text) => write!(f, "{}", text),
            Expression::Composite(parts) => {
                for part in parts {
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
            Expression::Case(case) => write!(f, "{}", case),
        }
    }
}
