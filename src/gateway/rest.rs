use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::traits::Gateway;
use super::types::{AuthSession, Filter, Query, Row, Subscription, Table};
use crate::config::BackendConfig;
use crate::error::{Error, Result};

/// How far behind the newest forwarded row each poll looks again. Insert
/// timestamps come from client clocks, so rows can land out of order.
const POLL_OVERLAP_SECS: i64 = 120;

/// Rows a poller has already forwarded, keyed by id, within the overlap window
struct PollWindow {
    grace: chrono::Duration,
    high_water: DateTime<Utc>,
    seen: HashMap<String, DateTime<Utc>>,
}

impl PollWindow {
    fn new(start: DateTime<Utc>, grace: chrono::Duration) -> Self {
        Self {
            grace,
            high_water: start,
            seen: HashMap::new(),
        }
    }

    fn lower_bound(&self) -> DateTime<Utc> {
        self.high_water - self.grace
    }

    fn lower_bound_rfc3339(&self) -> String {
        self.lower_bound().to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// True the first time a row is seen
    fn admit(&mut self, row: &Row, created: &str) -> bool {
        let key = match row.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => Value::Object(row.clone()).to_string(),
        };
        if self.seen.contains_key(&key) {
            return false;
        }
        let stamp = row
            .get(created)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map_or(self.high_water, |t| t.with_timezone(&Utc));
        if stamp > self.high_water {
            self.high_water = stamp;
        }
        self.seen.insert(key, stamp);
        true
    }

    /// Forget rows that the next query can no longer return
    fn prune(&mut self) {
        let floor = self.lower_bound();
        self.seen.retain(|_, stamp| *stamp >= floor);
    }
}

/// Gateway speaking the hosted backend's REST surface
#[derive(Clone)]
pub struct RestGateway {
    client: Client,
    base_url: String,
    anon_key: String,
    realtime_poll: Duration,
    session: Arc<RwLock<Option<AuthSession>>>,
    pollers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl RestGateway {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("broker-market/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            realtime_poll: config.realtime_poll,
            session: Arc::new(RwLock::new(None)),
            pollers: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.name())
    }

    /// Attaches the project key and the caller's bearer token
    async fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone());
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authed(request).await.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Backend returned status {}: {}", status, message);
            return Err(Error::Remote {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    fn query_pairs(query: &Query) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), "*".to_string())];
        pairs.extend(query.filters.iter().map(Filter::to_query_pair));
        if let Some(order) = &query.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            pairs.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = query.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        debug!("Selecting from {}", table.name());
        let request = self.client.get(self.rest_url(table)).query(&Self::query_pairs(query));
        let rows: Vec<Row> = self.send(request).await?.json().await?;
        debug!("Fetched {} rows from {}", rows.len(), table.name());
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Row) -> Result<Row> {
        let request = self
            .client
            .post(self.rest_url(table))
            .header("Prefer", "return=representation")
            .json(&row);
        let mut rows: Vec<Row> = self.send(request).await?.json().await?;
        // return=representation echoes the inserted rows
        Ok(rows.pop().unwrap_or(row))
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> Result<()> {
        let request = self
            .client
            .patch(self.rest_url(table))
            .query(&[filter.to_query_pair()])
            .json(&patch);
        self.send(request).await?;
        Ok(())
    }

    async fn upsert(&self, table: Table, key_column: &str, row: Row) -> Result<()> {
        let request = self
            .client
            .post(self.rest_url(table))
            .query(&[("on_conflict", key_column)])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&row);
        self.send(request).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<()> {
        let request = self
            .client
            .delete(self.rest_url(table))
            .query(&[filter.to_query_pair()]);
        self.send(request).await?;
        Ok(())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        debug!("Calling procedure {}", function);
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);
        let response = self.send(self.client.post(url).json(&args)).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        info!("Uploading {} bytes to {}/{}", bytes.len(), bucket, path);
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path);
        let request = self
            .client
            .post(url)
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes);
        self.send(request).await?;
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, bucket, path
        ))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let url = format!("{}/auth/v1/token", self.base_url);
        let request = self
            .client
            .post(url)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let token: TokenResponse = self.send(request).await?.json().await?;

        let session = AuthSession {
            user_id: token.user.id,
            email: token.user.email.unwrap_or_else(|| email.to_string()),
            access_token: token.access_token,
        };
        *self.session.write().await = Some(session.clone());
        info!("Signed in as {}", session.email);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.session.read().await.is_some() {
            let url = format!("{}/auth/v1/logout", self.base_url);
            if let Err(e) = self.send(self.client.post(url)).await {
                warn!("Remote sign-out failed, clearing local token anyway: {}", e);
            }
        }
        *self.session.write().await = None;
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        if self.session.read().await.is_none() {
            return Err(Error::NotAuthenticated);
        }
        let url = format!("{}/auth/v1/user", self.base_url);
        self.send(self.client.put(url).json(&json!({ "password": new_password })))
            .await?;
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<AuthSession>> {
        Ok(self.session.read().await.clone())
    }

    async fn subscribe_inserts(&self, table: Table, filter: Filter) -> Result<Subscription> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(64);
        let gateway = self.clone();
        let created = table.created_column();

        info!("Polling {} every {:?} for new rows", table.name(), self.realtime_poll);
        let mut pollers = self.pollers.lock().await;
        let poller_id = id.clone();
        let handle = tokio::spawn(async move {
            let mut window = PollWindow::new(Utc::now(), chrono::Duration::seconds(POLL_OVERLAP_SECS));
            'poll: loop {
                tokio::time::sleep(gateway.realtime_poll).await;
                if tx.is_closed() {
                    break;
                }
                let query = Query::all()
                    .filter(filter.clone())
                    .filter(Filter::gte(created, window.lower_bound_rfc3339()))
                    .order_by(created, true);
                let rows = match gateway.select(table, &query).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!("Realtime poll on {} failed: {}", table.name(), e);
                        continue;
                    }
                };
                for row in rows {
                    if !window.admit(&row, created) {
                        continue;
                    }
                    if tx.send(row).await.is_err() {
                        break 'poll;
                    }
                }
                window.prune();
            }
            gateway.pollers.lock().await.remove(&poller_id);
            debug!("Poller {} exited, receiver dropped", poller_id);
        });
        pollers.insert(id.clone(), handle);

        Ok(Subscription { id, events: rx })
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        if let Some(handle) = self.pollers.lock().await.remove(subscription_id) {
            handle.abort();
            debug!("Stopped poller {}", subscription_id);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_include_filters_order_and_limit() {
        let query = Query::all()
            .filter(Filter::eq("status", "approved"))
            .order_by("created_at", false)
            .limit(10);
        let pairs = RestGateway::query_pairs(&query);

        assert_eq!(pairs[0], ("select".to_string(), "*".to_string()));
        assert!(pairs.contains(&("status".to_string(), "eq.approved".to_string())));
        assert!(pairs.contains(&("order".to_string(), "created_at.desc".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "10".to_string())));
    }

    #[tokio::test]
    async fn update_password_requires_session() {
        let gateway = RestGateway::new(&BackendConfig {
            url: "http://localhost:54321".to_string(),
            anon_key: "anon".to_string(),
            request_timeout: Duration::from_secs(1),
            realtime_poll: Duration::from_secs(1),
        })
        .unwrap();

        assert!(matches!(
            gateway.update_password("secret").await,
            Err(Error::NotAuthenticated)
        ));
        assert!(gateway.current_session().await.unwrap().is_none());
    }

    fn chat_row(id: &str, timestamp: &str) -> Row {
        json!({ "id": id, "timestamp": timestamp })
            .as_object()
            .cloned()
            .unwrap()
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn poll_window_overlaps_and_skips_repeats() {
        let mut window = PollWindow::new(at("2025-03-01T10:00:00Z"), chrono::Duration::seconds(120));
        assert_eq!(window.lower_bound(), at("2025-03-01T09:58:00Z"));

        assert!(window.admit(&chat_row("m2", "2025-03-01T10:05:00Z"), "timestamp"));
        assert_eq!(window.lower_bound(), at("2025-03-01T10:03:00Z"));

        // Stamped earlier by a slow clock but inserted later: still inside the window
        assert!(window.admit(&chat_row("m1", "2025-03-01T10:04:00Z"), "timestamp"));
        // The next poll returns both again
        assert!(!window.admit(&chat_row("m2", "2025-03-01T10:05:00Z"), "timestamp"));
        assert!(!window.admit(&chat_row("m1", "2025-03-01T10:04:00Z"), "timestamp"));
        assert!(window.lower_bound_rfc3339().ends_with('Z'));
    }

    #[test]
    fn poll_window_prunes_rows_below_the_floor() {
        let mut window = PollWindow::new(at("2025-03-01T10:00:00Z"), chrono::Duration::seconds(60));
        assert!(window.admit(&chat_row("old", "2025-03-01T10:00:30Z"), "timestamp"));
        assert!(window.admit(&chat_row("new", "2025-03-01T10:10:00Z"), "timestamp"));

        window.prune();

        assert_eq!(window.seen.len(), 1);
        assert!(window.seen.contains_key("new"));
    }

    #[tokio::test]
    async fn poller_removes_itself_when_receiver_is_dropped() {
        let gateway = RestGateway::new(&BackendConfig {
            url: "http://127.0.0.1:9".to_string(),
            anon_key: "anon".to_string(),
            request_timeout: Duration::from_millis(200),
            realtime_poll: Duration::from_millis(10),
        })
        .unwrap();

        let subscription = gateway
            .subscribe_inserts(Table::ChatMessages, Filter::eq("receiver_id", "b1"))
            .await
            .unwrap();
        assert_eq!(gateway.pollers.lock().await.len(), 1);

        drop(subscription);
        let mut cleaned = false;
        for _ in 0..100 {
            if gateway.pollers.lock().await.is_empty() {
                cleaned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(cleaned);
    }
}
