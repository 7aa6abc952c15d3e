//! Data-grid state (pagination, sort, search) and its translation into the
//! master's dotted query parameters.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::QueryParams;

pub const FILTER_DEFAULT_WITH_TOTAL: &str = "default_with_total";
pub const FILTER_TOTAL: &str = "total";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Offset of the first row.
    pub start: Option<u64>,
    /// Rows per page.
    pub number: Option<u64>,
    pub number_of_pages: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub predicate: Option<String>,
    #[serde(default)]
    pub reverse: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Search {
    pub predicate_object: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub sort: Sort,
    #[serde(default)]
    pub search: Search,
}

impl TableState {
    pub fn page(start: u64, number: u64) -> Self {
        Self {
            pagination: Pagination {
                start: Some(start),
                number: Some(number),
                number_of_pages: None,
            },
            ..Default::default()
        }
    }

    pub fn sorted_by(mut self, predicate: impl Into<String>, reverse: bool) -> Self {
        self.sort = Sort {
            predicate: Some(predicate.into()),
            reverse,
        };
        self
    }

    pub fn searching(mut self, field: impl Into<String>, value: Value) -> Self {
        self.search
            .predicate_object
            .get_or_insert_with(Map::new)
            .insert(field.into(), value);
        self
    }

    /// Rows per page, falling back to the view's default.
    pub fn limit(&self, default_limit: u64) -> u64 {
        self.pagination
            .number
            .filter(|n| *n > 0)
            .unwrap_or(default_limit)
    }
}

/// `.sort` value: empty without predicate, `-predicate` when descending.
pub fn ordering(state: &TableState) -> String {
    match state.sort.predicate.as_deref() {
        None => String::new(),
        Some(predicate) if state.sort.reverse => format!("-{predicate}"),
        Some(predicate) => predicate.to_string(),
    }
}

pub fn search_terms(state: &TableState) -> Map<String, Value> {
    state.search.predicate_object.clone().unwrap_or_default()
}

/// Query for one page of a table. Search fields are merged last so they may
/// override any key.
pub fn to_query(state: &TableState, default_limit: u64) -> QueryParams {
    let mut params = QueryParams::new();
    params
        .set(".filter", FILTER_DEFAULT_WITH_TOTAL)
        .set(".offset", state.pagination.start.unwrap_or(0))
        .set(".limit", state.limit(default_limit))
        .set(".sort", ordering(state));
    for (key, value) in search_terms(state) {
        params.set_json(key, &value);
    }
    params
}

/// `floor((total - 1) / limit) + 1`, with an empty result having no pages.
pub fn number_of_pages(total: u64, limit: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    if limit == 0 {
        return 1;
    }
    (total - 1) / limit + 1
}

/// Record the page count derived from a server total.
pub fn apply_total(state: &mut TableState, total: u64, limit: u64) {
    state.pagination.number_of_pages = Some(number_of_pages(total, limit));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ordering_without_predicate_is_empty() {
        let mut state = TableState::default();
        assert_eq!(ordering(&state), "");
        state.sort.reverse = true;
        assert_eq!(ordering(&state), "");
    }

    #[test]
    fn ordering_prefix_for_descending() {
        let state = TableState::default().sorted_by("start_time", true);
        assert_eq!(ordering(&state), "-start_time");
        let state = TableState::default().sorted_by("subject", false);
        assert_eq!(ordering(&state), "subject");
    }

    #[test]
    fn page_count_formula() {
        assert_eq!(number_of_pages(25, 10), 3);
        assert_eq!(number_of_pages(1, 10), 1);
        assert_eq!(number_of_pages(10, 10), 1);
        assert_eq!(number_of_pages(11, 10), 2);
        assert_eq!(number_of_pages(0, 10), 0);
        for total in 1..200u64 {
            for limit in 1..15u64 {
                assert_eq!(number_of_pages(total, limit), (total - 1) / limit + 1);
            }
        }
    }

    #[test]
    fn query_uses_dotted_names_and_defaults() {
        let q = to_query(&TableState::default(), 25);
        assert_eq!(q.get(".filter"), Some("default_with_total"));
        assert_eq!(q.get(".offset"), Some("0"));
        assert_eq!(q.get(".limit"), Some("25"));
        assert_eq!(q.get(".sort"), Some(""));
    }

    #[test]
    fn search_fields_are_merged_verbatim() {
        let state = TableState::page(50, 10)
            .sorted_by("email", true)
            .searching("email", json!("@example.org"))
            .searching("send_status", json!("ERROR"));
        let q = to_query(&state, 100);
        assert_eq!(q.get(".offset"), Some("50"));
        assert_eq!(q.get(".limit"), Some("10"));
        assert_eq!(q.get(".sort"), Some("-email"));
        assert_eq!(q.get("email"), Some("@example.org"));
        assert_eq!(q.get("send_status"), Some("ERROR"));
    }

    #[test]
    fn table_state_reads_grid_json() {
        let state: TableState = serde_json::from_value(json!({
            "pagination": {"start": 20, "number": 10},
            "sort": {"predicate": "id", "reverse": true},
            "search": {"predicateObject": {"subject": "promo"}}
        }))
        .unwrap();
        assert_eq!(state.limit(5), 10);
        assert_eq!(ordering(&state), "-id");
        assert_eq!(search_terms(&state)["subject"], "promo");
    }
}
