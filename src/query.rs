use serde_json::Value;

use crate::Document;

/// A paginated query: a filter plus a 1-based page number and page size.
///
/// The default query matches every document and selects the first page of
/// 20. The filter is forwarded to the store untouched.
///
/// ```
/// use drover::FindQuery;
///
/// let query = FindQuery::default().page(3).limit(50);
/// assert_eq!(query.page, 3);
/// assert_eq!(query.limit, 50);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    /// Filter forwarded to the store.
    pub filter: Document,
    /// 1-based page number.
    pub page: u64,
    /// Maximum number of documents in the page.
    pub limit: u64,
}

impl FindQuery {
    /// A query over `filter` with the default page and limit.
    pub fn new(filter: Document) -> Self {
        FindQuery {
            filter,
            ..FindQuery::default()
        }
    }

    /// Select a 1-based page.
    pub fn page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    /// Set the page size.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Number of documents skipped before this page starts. Page numbers
    /// below 1 clamp to the first page.
    pub(crate) fn skip(&self) -> u64 {
        self.limit.saturating_mul(self.page.saturating_sub(1))
    }
}

impl Default for FindQuery {
    fn default() -> Self {
        FindQuery {
            filter: Document::new(),
            page: 1,
            limit: 20,
        }
    }
}

impl From<Document> for FindQuery {
    fn from(filter: Document) -> Self {
        FindQuery::new(filter)
    }
}

/// One page of documents for a [`FindQuery`], echoing the page and limit it
/// was selected with.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// The documents in this page.
    pub list: Vec<Document>,
    /// Total number of matching documents across all pages.
    pub total: u64,
    /// 1-based page number the query asked for.
    pub page: u64,
    /// Page size the query asked for.
    pub limit: u64,
}

/// One or more partial-update documents applied to a single document id.
///
/// A single [`Document`] converts into a one-update payload. Updates with no
/// non-empty field are dropped when the batch is folded into a bulk write;
/// see [`Batch::update`](crate::Batch::update).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdatePayload {
    updates: Vec<Document>,
}

impl UpdatePayload {
    pub(crate) fn updates(&self) -> &[Document] {
        &self.updates
    }
}

impl From<Document> for UpdatePayload {
    fn from(update: Document) -> Self {
        UpdatePayload {
            updates: vec![update],
        }
    }
}

impl From<Vec<Document>> for UpdatePayload {
    fn from(updates: Vec<Document>) -> Self {
        UpdatePayload { updates }
    }
}

/// Whether an update document carries anything worth writing: at least one
/// field whose value is not null and not an empty string, array, or object.
/// Zero and `false` are real values and do count.
pub(crate) fn has_non_empty_field(update: &Document) -> bool {
    update.values().any(|value| !is_empty_value(value))
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(raw) => raw.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
