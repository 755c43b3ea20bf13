use async_trait::async_trait;
use serde_json::Value;

use super::types::{AuthSession, Filter, Query, Row, Subscription, Table};
use crate::error::Result;

/// Atomic counter procedure for listing likes
pub const INCREMENT_LIKES_FN: &str = "increment_property_likes";

/// Atomic counter procedure for listing lead counts
pub const INCREMENT_LEADS_FN: &str = "increment_property_leads";

/// Capabilities the store needs from the hosted backend.
/// Implemented over HTTP for production and in memory for tests and demos.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Read rows from a collection
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>>;

    /// Insert one row and return it as stored
    async fn insert(&self, table: Table, row: Row) -> Result<Row>;

    /// Merge `patch` into every row matching `filter`
    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> Result<()>;

    /// Insert, or replace the row whose `key_column` matches
    async fn upsert(&self, table: Table, key_column: &str, row: Row) -> Result<()>;

    async fn delete(&self, table: Table, filter: &Filter) -> Result<()>;

    /// Call a named stored procedure
    async fn rpc(&self, function: &str, args: Value) -> Result<Value>;

    /// Store a blob and return its public URL
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;

    async fn sign_out(&self) -> Result<()>;

    async fn update_password(&self, new_password: &str) -> Result<()>;

    async fn current_session(&self) -> Result<Option<AuthSession>>;

    /// Subscribe to inserts on `table` whose row matches `filter`
    async fn subscribe_inserts(&self, table: Table, filter: Filter) -> Result<Subscription>;

    async fn unsubscribe(&self, subscription_id: &str) -> Result<()>;

    /// Name of the backend, for logs
    fn backend_name(&self) -> &'static str;
}
