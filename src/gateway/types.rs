use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// One backend row: column name to value
pub type Row = Map<String, Value>;

/// Collections exposed by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Brokers,
    Admins,
    Properties,
    Leads,
    ChatMessages,
    SiteSettings,
    Amenities,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Brokers => "brokers",
            Table::Admins => "admins",
            Table::Properties => "properties",
            Table::Leads => "property_leads",
            Table::ChatMessages => "chat_messages",
            Table::SiteSettings => "site_settings",
            Table::Amenities => "amenities",
        }
    }

    /// Column recording when a row was inserted
    pub fn created_column(&self) -> &'static str {
        match self {
            Table::Brokers => "registered_at",
            Table::ChatMessages => "timestamp",
            _ => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
}

/// Column predicate used by reads, updates, deletes and subscriptions
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Gt,
            value: value.into(),
        }
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Gte,
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Gt => compare(actual, &self.value).map_or(false, Ordering::is_gt),
            FilterOp::Gte => compare(actual, &self.value).map_or(false, Ordering::is_ge),
        }
    }

    /// PostgREST query-string form, e.g. `status=eq.pending`
    pub fn to_query_pair(&self) -> (String, String) {
        let op = match self.op {
            FilterOp::Eq => "eq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
        };
        let value = match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        (self.column.clone(), format!("{}.{}", op, value))
    }
}

fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        // RFC 3339 timestamps and plain strings both order lexically
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Read parameters for a select
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Authenticated backend identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
}

/// Live insert feed for one table; dropped or unsubscribed to stop
#[derive(Debug)]
pub struct Subscription {
    pub id: String,
    pub events: mpsc::Receiver<Row>,
}

pub fn to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Remote {
            status: 0,
            message: format!("expected an object row, got {}", other),
        }),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn eq_filter_matches_exact_value() {
        let filter = Filter::eq("status", "pending");
        assert!(filter.matches(&row(json!({"status": "pending"}))));
        assert!(!filter.matches(&row(json!({"status": "approved"}))));
        assert!(!filter.matches(&row(json!({}))));
    }

    #[test]
    fn gt_filter_orders_timestamps() {
        let filter = Filter::gt("timestamp", "2025-01-01T00:00:00Z");
        assert!(filter.matches(&row(json!({"timestamp": "2025-01-02T00:00:00Z"}))));
        assert!(!filter.matches(&row(json!({"timestamp": "2024-12-31T00:00:00Z"}))));
    }

    #[test]
    fn gte_filter_includes_the_boundary() {
        let filter = Filter::gte("timestamp", "2025-01-01T00:00:00Z");
        assert!(filter.matches(&row(json!({"timestamp": "2025-01-01T00:00:00Z"}))));
        assert!(!filter.matches(&row(json!({"timestamp": "2024-12-31T23:59:59Z"}))));
        assert_eq!(filter.to_query_pair().1, "gte.2025-01-01T00:00:00Z");
    }

    #[test]
    fn query_pair_uses_postgrest_syntax() {
        assert_eq!(
            Filter::eq("broker_id", "b1").to_query_pair(),
            ("broker_id".to_string(), "eq.b1".to_string())
        );
        assert_eq!(
            Filter::gt("likes_count", 3).to_query_pair(),
            ("likes_count".to_string(), "gt.3".to_string())
        );
    }
}
