//! Execution contract.
//!
//! The criteria layer only produces text and parameter maps. Running them is
//! left to a [`QueryExecutor`] supplied by the caller (a JPA-style session, an
//! ORM adapter, or an in-memory fake in tests).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ast::ParamValue;
use crate::error::CriteriaResult;

/// A rendered query ready to be handed to an executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub text: String,
    /// Parameter name (without the leading `:`) to value.
    pub parameters: BTreeMap<String, ParamValue>,
    /// Offset of the first row, for paged queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_result: Option<usize>,
    /// Maximum number of rows, for paged queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

impl Query {
    pub fn new(text: impl Into<String>, parameters: BTreeMap<String, ParamValue>) -> Self {
        Self {
            text: text.into(),
            parameters,
            first_result: None,
            max_results: None,
        }
    }

    /// Bind (or rebind) one parameter value.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_range(mut self, first_result: usize, max_results: usize) -> Self {
        self.first_result = Some(first_result);
        self.max_results = Some(max_results);
        self
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Runs rendered queries against a data store.
pub trait QueryExecutor {
    /// Typed row produced by object queries.
    type Row;

    /// Run a query projecting one scalar per row (counts, identifiers).
    fn fetch_scalars(&mut self, query: &Query) -> CriteriaResult<Vec<ParamValue>>;

    /// Run a query and map each row into `Self::Row`.
    fn fetch_rows(&mut self, query: &Query) -> CriteriaResult<Vec<Self::Row>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_parameter_and_range() {
        let query = Query::new("FROM Document d WHERE d.id IN (:ids)", BTreeMap::new())
            .with_parameter("ids", vec![1, 2])
            .with_range(20, 10);
        assert_eq!(
            query.parameters["ids"],
            ParamValue::List(vec![ParamValue::Int(1), ParamValue::Int(2)])
        );
        assert_eq!(query.first_result, Some(20));
        assert_eq!(query.max_results, Some(10));
        assert_eq!(query.to_string(), "FROM Document d WHERE d.id IN (:ids)");
    }
}
