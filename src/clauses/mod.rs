//! Clause managers.
//!
//! Each manager owns the state of one clause, lets a visitor rewrite the
//! expressions it holds, and renders its fragment of query text (empty when
//! the clause is unused).

pub mod filter;
pub mod group_by;
pub mod order_by;
pub mod select;

pub use self::filter::{FilterClause, FilterManager};
pub use self::group_by::GroupByManager;
pub use self::order_by::{OrderByInfo, OrderByManager};
pub use self::select::{SelectInfo, SelectManager};
