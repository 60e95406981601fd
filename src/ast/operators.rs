use serde::{Deserialize, Serialize};

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "="),
            CompareOp::Ne => write!(f, "<>"),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Ge => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Le => write!(f, "<="),
        }
    }
}

/// Quantifier narrowing a comparison against a multi-valued right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quantifier {
    #[default]
    One,
    All,
    Any,
    Some,
}

impl Quantifier {
    /// Keyword emitted before the right-hand side, `None` for a plain comparison.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Quantifier::One => None,
            Quantifier::All => Some("ALL"),
            Quantifier::Any => Some("ANY"),
            Quantifier::Some => Some("SOME"),
        }
    }
}

/// Join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Outer,
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER"),
            JoinKind::Left => write!(f, "LEFT"),
            JoinKind::Right => write!(f, "RIGHT"),
            JoinKind::Outer => write!(f, "FULL"),
        }
    }
}

impl std::str::FromStr for JoinKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinKind::Inner),
            "left" => Ok(JoinKind::Left),
            "right" => Ok(JoinKind::Right),
            "outer" | "full" => Ok(JoinKind::Outer),
            other => Err(format!("unknown join kind '{}'", other)),
        }
    }
}

/// Where the target language sorts NULLs when ORDER BY does not say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullPrecedence {
    /// NULL compares greater than every value: ASC puts them last, DESC first.
    #[default]
    Largest,
    /// NULL compares smaller than every value: ASC puts them first, DESC last.
    Smallest,
}

impl NullPrecedence {
    pub fn nulls_first_by_default(&self, ascending: bool) -> bool {
        match self {
            NullPrecedence::Largest => !ascending,
            NullPrecedence::Smallest => ascending,
        }
    }
}
