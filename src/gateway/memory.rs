use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::{Gateway, INCREMENT_LEADS_FN, INCREMENT_LIKES_FN};
use super::types::{AuthSession, Filter, Query, Row, Subscription, Table};
use crate::error::{Error, Result};

struct Credential {
    user_id: String,
    password: String,
}

/// In-process backend with the same contract as the hosted one
pub struct MemoryGateway {
    tables: Mutex<HashMap<Table, Vec<Row>>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    credentials: Mutex<HashMap<String, Credential>>,
    session: Mutex<Option<AuthSession>>,
    inserts: broadcast::Sender<(Table, Row)>,
    forwarders: Mutex<HashMap<String, JoinHandle<()>>>,
    fail_writes: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        let (inserts, _) = broadcast::channel(256);
        Self {
            tables: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
            credentials: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            inserts,
            forwarders: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Seed a table without emitting insert events
    pub fn seed(&self, table: Table, rows: Vec<Row>) {
        lock(&self.tables).entry(table).or_default().extend(rows);
    }

    pub fn rows(&self, table: Table) -> Vec<Row> {
        lock(&self.tables).get(&table).cloned().unwrap_or_default()
    }

    /// Register login credentials; returns the new user id
    pub fn add_user(&self, email: &str, password: &str) -> String {
        let user_id = Uuid::new_v4().to_string();
        self.add_user_with_id(&user_id, email, password);
        user_id
    }

    pub fn add_user_with_id(&self, user_id: &str, email: &str, password: &str) {
        lock(&self.credentials).insert(
            email.to_lowercase(),
            Credential {
                user_id: user_id.to_string(),
                password: password.to_string(),
            },
        );
    }

    /// Make every subsequent write fail, as if the backend were unreachable
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn blob_count(&self) -> usize {
        lock(&self.blobs).len()
    }

    pub fn active_subscriptions(&self) -> usize {
        lock(&self.forwarders).len()
    }

    /// End every live feed, as a dropped connection would
    pub fn drop_subscriptions(&self) {
        for (_, handle) in lock(&self.forwarders).drain() {
            handle.abort();
        }
    }

    /// Insert a row as if another client had written it
    pub fn push_remote_insert(&self, table: Table, row: Row) {
        lock(&self.tables).entry(table).or_default().push(row.clone());
        let _ = self.inserts.send((table, row));
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Remote {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn increment(&self, column: &str, args: &Value) -> Result<Value> {
        let property_id = args
            .get("property_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("property_id", "missing procedure argument"))?;

        let mut tables = lock(&self.tables);
        let row = tables
            .entry(Table::Properties)
            .or_default()
            .iter_mut()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(property_id))
            .ok_or_else(|| Error::not_found("property", property_id))?;

        let next = row.get(column).and_then(Value::as_u64).unwrap_or(0) + 1;
        row.insert(column.to_string(), json!(next));
        Ok(json!(next))
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        let tables = lock(&self.tables);
        let mut rows: Vec<Row> = tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| f.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let a = a.get(&order.column).map(Value::to_string).unwrap_or_default();
                let b = b.get(&order.column).map(Value::to_string).unwrap_or_default();
                if order.ascending {
                    a.cmp(&b)
                } else {
                    b.cmp(&a)
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Row) -> Result<Row> {
        self.check_writable()?;
        lock(&self.tables).entry(table).or_default().push(row.clone());
        let _ = self.inserts.send((table, row.clone()));
        Ok(row)
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> Result<()> {
        self.check_writable()?;
        let mut tables = lock(&self.tables);
        for row in tables.entry(table).or_default().iter_mut() {
            if filter.matches(row) {
                row.extend(patch.clone());
            }
        }
        Ok(())
    }

    async fn upsert(&self, table: Table, key_column: &str, row: Row) -> Result<()> {
        self.check_writable()?;
        let key = row.get(key_column).cloned();
        let mut tables = lock(&self.tables);
        let rows = tables.entry(table).or_default();
        match rows.iter_mut().find(|r| key.is_some() && r.get(key_column) == key.as_ref()) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
        Ok(())
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<()> {
        self.check_writable()?;
        lock(&self.tables)
            .entry(table)
            .or_default()
            .retain(|row| !filter.matches(row));
        Ok(())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        self.check_writable()?;
        match function {
            INCREMENT_LIKES_FN => self.increment("likes_count", &args),
            INCREMENT_LEADS_FN => self.increment("leads_count", &args),
            other => Err(Error::Remote {
                status: 404,
                message: format!("unknown procedure {}", other),
            }),
        }
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        self.check_writable()?;
        let key = format!("{}/{}", bucket, path);
        lock(&self.blobs).insert(key.clone(), bytes);
        Ok(format!("memory://{}", key))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = email.trim().to_lowercase();
        let credentials = lock(&self.credentials);
        let credential = credentials
            .get(&email)
            .filter(|c| c.password == password)
            .ok_or(Error::Remote {
                status: 400,
                message: "invalid login credentials".to_string(),
            })?;

        let session = AuthSession {
            user_id: credential.user_id.clone(),
            email,
            access_token: Uuid::new_v4().to_string(),
        };
        *lock(&self.session) = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        *lock(&self.session) = None;
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        let email = lock(&self.session)
            .as_ref()
            .map(|s| s.email.clone())
            .ok_or(Error::NotAuthenticated)?;
        if let Some(credential) = lock(&self.credentials).get_mut(&email) {
            credential.password = new_password.to_string();
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<AuthSession>> {
        Ok(lock(&self.session).clone())
    }

    async fn subscribe_inserts(&self, table: Table, filter: Filter) -> Result<Subscription> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(64);
        let mut inserts = self.inserts.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match inserts.recv().await {
                    Ok((t, row)) if t == table && filter.matches(&row) => {
                        if tx.send(row).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Subscriber lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        lock(&self.forwarders).insert(id.clone(), handle);
        info!("Subscribed {} to inserts on {}", id, table.name());

        Ok(Subscription { id, events: rx })
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        if let Some(handle) = lock(&self.forwarders).remove(subscription_id) {
            handle.abort();
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
