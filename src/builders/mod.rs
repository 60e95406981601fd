//! Predicate builders.
//!
//! A builder is created for a left-hand expression, and its terminal call
//! hands the finished [`Predicate`] to its parent through
//! [`PredicateParent::end_predicate`], returning whatever the parent yields.
//! For a criteria clause that is the criteria itself; for an OR/AND group it
//! is the group builder, so chains read top to bottom:
//!
//! ```
//! use criteria::Criteria;
//!
//! let mut criteria = Criteria::from("Document", "d")?;
//! criteria
//!     .where_or()?
//!     .restrict("d.age")?.gt(18)
//!     .and()
//!         .restrict("d.name")?.like("A%")
//!         .restrict("d.owner")?.is_not_null()
//!     .end()
//!     .end();
//! assert_eq!(
//!     criteria.query_string()?,
//!     "FROM Document d WHERE d.age > :param_0 OR (d.name LIKE :param_1 AND d.owner IS NOT NULL)"
//! );
//! # Ok::<(), criteria::CriteriaError>(())
//! ```

pub mod case;
pub mod groups;
pub mod restriction;

pub use self::case::{CaseParent, CaseThenBuilder, CaseWhenBuilder, SimpleCaseWhenBuilder, WhenParent};
pub use self::groups::{AndBuilder, OrBuilder};
pub use self::restriction::{QuantifiableBuilder, RestrictionBuilder};

use crate::ast::Predicate;

/// Receiver of finished predicates.
pub trait PredicateParent: Sized {
    type Output;

    /// Attach a finished predicate and hand control back.
    fn end_predicate(self, predicate: Predicate) -> Self::Output;

    /// Give up on the pending predicate, e.g. after a syntax error in a
    /// terminal that takes expression text.
    fn abandon(self);
}
