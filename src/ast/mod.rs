pub mod case;
pub mod expr;
pub mod operators;
pub mod predicate;
pub mod values;

pub use self::case::{CaseExpression, CaseWhen, WhenCondition};
pub use self::expr::{
    Expression, FunctionExpression, ParamId, Parameter, PathElement, PathExpression,
    PropertyExpression,
};
pub use self::operators::{CompareOp, JoinKind, NullPrecedence, Quantifier};
pub use self::predicate::{Combinator, Predicate};
pub use self::values::ParamValue;
