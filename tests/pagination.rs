use criteria::prelude::*;
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, PartialEq)]
struct Document {
    id: i64,
    name: &'static str,
    age: i64,
}

/// Executes the three pagination queries over a fixed set of documents.
///
/// Understands exactly the shapes produced for
/// `where d.age > :param_0 order by d.name asc`.
struct InMemory {
    documents: Vec<Document>,
    executed: Vec<String>,
}

impl InMemory {
    fn new() -> Self {
        let documents = vec![
            Document { id: 1, name: "delta", age: 40 },
            Document { id: 2, name: "alpha", age: 10 },
            Document { id: 3, name: "charlie", age: 35 },
            Document { id: 4, name: "bravo", age: 50 },
            Document { id: 5, name: "echo", age: 20 },
        ];
        Self {
            documents,
            executed: Vec::new(),
        }
    }

    fn matching(&self, query: &Query) -> Vec<Document> {
        let minimum = query
            .parameters
            .get("param_0")
            .and_then(ParamValue::as_i64)
            .unwrap_or(i64::MIN);
        let mut docs: Vec<Document> = self
            .documents
            .iter()
            .filter(|d| d.age > minimum)
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.name);
        docs
    }
}

impl QueryExecutor for InMemory {
    type Row = Document;

    fn fetch_scalars(&mut self, query: &Query) -> CriteriaResult<Vec<ParamValue>> {
        self.executed.push(query.text.clone());
        let docs = self.matching(query);
        if query.text.starts_with("SELECT COUNT(DISTINCT d.id)") {
            return Ok(vec![ParamValue::Int(docs.len() as i64)]);
        }
        let first = query.first_result.unwrap_or(0);
        let max = query.max_results.unwrap_or(usize::MAX);
        Ok(docs
            .iter()
            .skip(first)
            .take(max)
            .map(|d| ParamValue::Int(d.id))
            .collect())
    }

    fn fetch_rows(&mut self, query: &Query) -> CriteriaResult<Vec<Document>> {
        self.executed.push(query.text.clone());
        let Some(ParamValue::List(ids)) = query.parameters.get("ids") else {
            return Err(CriteriaError::Execution("ids not bound".into()));
        };
        let mut rows: Vec<Document> = self
            .documents
            .iter()
            .filter(|d| ids.contains(&ParamValue::Int(d.id)))
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.name);
        Ok(rows)
    }
}

fn adults() -> Criteria {
    let mut criteria = Criteria::from("Document", "d").unwrap();
    criteria
        .where_("d.age")
        .unwrap()
        .gt(30)
        .order_by_asc("d.name")
        .unwrap();
    criteria
}

#[test]
fn test_queries() {
    let mut page = adults().page(1, 2).unwrap();
    assert_eq!(
        page.count_query_string().unwrap(),
        "SELECT COUNT(DISTINCT d.id) FROM Document d WHERE d.age > :param_0"
    );
    assert_eq!(
        page.id_query_string().unwrap(),
        "SELECT DISTINCT d.id FROM Document d WHERE d.age > :param_0 ORDER BY d.name ASC"
    );
    assert_eq!(
        page.object_query_string().unwrap(),
        "FROM Document d WHERE d.id IN (:ids) ORDER BY d.name ASC"
    );
    assert_eq!(page.count_query().unwrap().parameters["param_0"], ParamValue::Int(30));
}

#[test]
fn test_first_page_consistent_with_count_and_ids() {
    let mut executor = InMemory::new();
    let mut page = adults().page(1, 2).unwrap();

    let ids = executor.fetch_scalars(&page.id_query().unwrap().clone()).unwrap();
    assert_eq!(ids, vec![ParamValue::Int(4), ParamValue::Int(3)]);

    let result = page.execute(&mut executor).unwrap();
    assert_eq!(result.total_count, 3);
    assert_eq!(result.len(), 2);
    let names: Vec<&str> = result.items.iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["bravo", "charlie"]);
    let row_ids: Vec<ParamValue> = result.items.iter().map(|d| ParamValue::Int(d.id)).collect();
    assert_eq!(row_ids, ids);
}

#[test]
fn test_last_page_is_partial() {
    let mut executor = InMemory::new();
    let result = adults().page(2, 2).unwrap().execute(&mut executor).unwrap();
    assert_eq!(result.total_count, 3);
    assert_eq!(result.items.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1]);
}

#[test]
fn test_empty_page_skips_object_query() {
    let mut executor = InMemory::new();
    let result = adults().page(3, 2).unwrap().execute(&mut executor).unwrap();
    assert!(result.is_empty());
    assert_eq!(result.total_count, 3);
    assert_eq!(executor.executed.len(), 2);
    assert!(executor.executed.iter().all(|text| !text.contains(":ids")));
}

#[test]
fn test_parameters_rebound_after_page() {
    let mut criteria = Criteria::from("Document", "d").unwrap();
    criteria
        .where_("d.age")
        .unwrap()
        .gt_expression(":minimum")
        .unwrap();
    let mut page = criteria.page(1, 10).unwrap();
    assert!(matches!(page.count_query(), Err(CriteriaError::IllegalState(_))));

    page.set_parameter("minimum", 18);
    assert_eq!(
        page.count_query().unwrap().parameters["minimum"],
        ParamValue::Int(18)
    );
}

#[test]
fn test_select_alias_in_order_by_survives_projection_swap() {
    let mut criteria = Criteria::from("Document", "d").unwrap();
    criteria
        .select_as("d.owner.name", "ownerName")
        .unwrap()
        .where_("d.age")
        .unwrap()
        .gt(1)
        .order_by_asc("ownerName")
        .unwrap();
    let mut page = criteria.page(1, 2).unwrap();
    assert_eq!(
        page.id_query_string().unwrap(),
        "SELECT DISTINCT d.id FROM Document d LEFT JOIN d.owner owner \
         WHERE d.age > :param_0 ORDER BY owner.name ASC"
    );
    assert_eq!(
        page.count_query_string().unwrap(),
        "SELECT COUNT(DISTINCT d.id) FROM Document d WHERE d.age > :param_0"
    );
    assert_eq!(
        page.object_query_string().unwrap(),
        "SELECT owner.name AS ownerName FROM Document d LEFT JOIN d.owner owner \
         WHERE d.id IN (:ids) ORDER BY ownerName ASC"
    );
}
