//! # criteria
//!
//! A criteria builder for object query languages: compose path expressions
//! and predicates through a fluent API, and render deterministic query text
//! with generated parameter names.
//!
//! ## Quick Example
//!
//! ```
//! use criteria::prelude::*;
//!
//! let mut criteria = Criteria::from("Document", "d")?;
//! criteria
//!     .select("d.owner.name")?
//!     .where_("d.age")?.gt(18)
//!     .order_by_desc("d.name")?;
//!
//! assert_eq!(
//!     criteria.query_string()?,
//!     "SELECT owner.name FROM Document d LEFT JOIN d.owner owner \
//!      WHERE d.age > :param_0 ORDER BY d.name DESC"
//! );
//! # Ok::<(), criteria::CriteriaError>(())
//! ```
//!
//! ## Expressions
//!
//! | Form            | Example                 | Meaning                          |
//! |-----------------|-------------------------|----------------------------------|
//! | path            | `d.owner.name`          | attribute, joined implicitly     |
//! | array access    | `d.contacts[1]`         | map/list value at a key          |
//! | function        | `UPPER(d.name)`         | function call                    |
//! | parameter       | `:name`                 | named parameter, bound later     |
//! | literal         | `'text'`, `42`, `TRUE`  | inline constant                  |

pub mod arrays;
pub mod ast;
pub mod builders;
pub mod clauses;
pub mod config;
pub mod criteria;
pub mod engine;
pub mod error;
pub mod joins;
pub mod model;
pub mod pagination;
pub mod parser;
pub mod resolver;
pub mod transpiler;

pub use crate::criteria::Criteria;
pub use crate::engine::{Query, QueryExecutor};
pub use crate::error::{CriteriaError, CriteriaResult};
pub use crate::pagination::{Page, PaginatedCriteria};
pub use crate::transpiler::RenderOptions;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::builders::{
        AndBuilder, CaseParent, CaseWhenBuilder, OrBuilder, PredicateParent, RestrictionBuilder,
        SimpleCaseWhenBuilder,
    };
    pub use crate::config::{Config, CriteriaDocument};
    pub use crate::criteria::Criteria;
    pub use crate::engine::{Query, QueryExecutor};
    pub use crate::error::*;
    pub use crate::pagination::{Page, PaginatedCriteria};
    pub use crate::parser::parse;
    pub use crate::transpiler::RenderOptions;
}

/// Parse expression text into an [`ast::Expression`].
///
/// # Example
///
/// ```
/// use criteria::parse;
///
/// let expr = parse("d.contacts[1].name").unwrap();
/// assert_eq!(expr.to_string(), "d.contacts[1].name");
/// ```
pub fn parse(input: &str) -> CriteriaResult<ast::Expression> {
    parser::parse(input)
}
