//! Push channel that feeds incoming chat messages into the store.
//!
//! At most one channel exists, keyed by the user it listens for.
//! Subscribing again for the same user is a no-op; subscribing for a
//! different user tears the old channel down first.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::gateway::{from_row, Filter, Gateway, Subscription, Table};
use crate::models::ChatMessage;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unsubscribed,
    Subscribing,
    Subscribed,
}

type SubscriptionSlot = Arc<StdMutex<Option<String>>>;

struct ActiveChannel {
    user_id: String,
    task: JoinHandle<()>,
    subscription_id: SubscriptionSlot,
}

/// Lifecycle owner for the chat push channel
pub struct ChatRealtime {
    store: Arc<Store>,
    reconnect_delay: Duration,
    active: Mutex<Option<ActiveChannel>>,
    state: Arc<watch::Sender<ChannelState>>,
}

fn receiver_filter(user_id: &str) -> Filter {
    Filter::eq("receiver_id", user_id)
}

impl ChatRealtime {
    pub fn new(store: Arc<Store>, reconnect_delay: Duration) -> Self {
        let (state, _) = watch::channel(ChannelState::Unsubscribed);
        Self {
            store,
            reconnect_delay,
            active: Mutex::new(None),
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub async fn subscribed_user(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|c| c.user_id.clone())
    }

    /// Open the channel when a user is known and the chat UI is showing,
    /// close it otherwise
    pub async fn sync(&self, user_id: Option<&str>, chat_open: bool) -> Result<()> {
        match (user_id, chat_open) {
            (Some(user_id), true) => self.subscribe(user_id).await,
            _ => {
                self.unsubscribe().await;
                Ok(())
            }
        }
    }

    pub async fn subscribe(&self, user_id: &str) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(channel) = active.as_ref() {
            if channel.user_id == user_id {
                debug!("Chat channel for {} already open", user_id);
                return Ok(());
            }
        }
        if let Some(previous) = active.take() {
            self.teardown(previous).await;
        }

        self.state.send_replace(ChannelState::Subscribing);
        let gateway = Arc::clone(self.store.gateway());
        let subscription = match gateway
            .subscribe_inserts(Table::ChatMessages, receiver_filter(user_id))
            .await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("Chat subscription for {} failed: {}", user_id, e);
                self.state.send_replace(ChannelState::Unsubscribed);
                return Err(e);
            }
        };
        let slot: SubscriptionSlot = Arc::new(StdMutex::new(Some(subscription.id.clone())));
        self.state.send_replace(ChannelState::Subscribed);
        info!("Chat channel open for {}", user_id);

        let task = tokio::spawn(pump(
            Arc::clone(&self.store),
            gateway,
            user_id.to_string(),
            subscription,
            Arc::clone(&slot),
            Arc::clone(&self.state),
            self.reconnect_delay,
        ));
        *active = Some(ActiveChannel {
            user_id: user_id.to_string(),
            task,
            subscription_id: slot,
        });
        Ok(())
    }

    pub async fn unsubscribe(&self) {
        if let Some(channel) = self.active.lock().await.take() {
            self.teardown(channel).await;
        }
    }

    async fn teardown(&self, channel: ActiveChannel) {
        // A reconnect in flight may still swap the slot until the task is gone
        channel.task.abort();
        let _ = channel.task.await;
        let id = channel
            .subscription_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = id {
            if let Err(e) = self.store.gateway().unsubscribe(&id).await {
                warn!("Failed to close subscription {}: {}", id, e);
            }
        }
        self.state.send_replace(ChannelState::Unsubscribed);
        info!("Chat channel closed for {}", channel.user_id);
    }
}

/// Forward pushed rows into the store, resubscribing whenever the feed ends
async fn pump(
    store: Arc<Store>,
    gateway: Arc<dyn Gateway>,
    user_id: String,
    mut subscription: Subscription,
    slot: SubscriptionSlot,
    state: Arc<watch::Sender<ChannelState>>,
    reconnect_delay: Duration,
) {
    loop {
        while let Some(row) = subscription.events.recv().await {
            let message = match from_row::<ChatMessage>(row) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Skipping malformed chat row: {}", e);
                    continue;
                }
            };
            if message.receiver_id != user_id {
                continue;
            }
            if let Err(e) = store.apply_remote_message(message).await {
                warn!("Failed to apply pushed message: {}", e);
            }
        }

        warn!("Chat feed for {} ended, reconnecting", user_id);
        state.send_replace(ChannelState::Subscribing);
        subscription = loop {
            tokio::time::sleep(reconnect_delay).await;
            match gateway
                .subscribe_inserts(Table::ChatMessages, receiver_filter(&user_id))
                .await
            {
                Ok(subscription) => break subscription,
                Err(e) => warn!("Reconnect for {} failed: {}", user_id, e),
            }
        };
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription.id.clone());
        state.send_replace(ChannelState::Subscribed);
        info!("Chat channel for {} restored", user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{to_row, MemoryGateway};
    use crate::store::StoreOptions;

    fn setup() -> (Arc<Store>, Arc<MemoryGateway>, ChatRealtime) {
        let gateway = Arc::new(MemoryGateway::new());
        let store = Arc::new(Store::new(gateway.clone(), StoreOptions::default()));
        let realtime = ChatRealtime::new(Arc::clone(&store), Duration::from_millis(10));
        (store, gateway, realtime)
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn pushed_messages_reach_the_store_once() {
        let (store, gateway, realtime) = setup();
        realtime.subscribe("b1").await.unwrap();
        assert_eq!(realtime.state(), ChannelState::Subscribed);

        let message = ChatMessage::new("b2", "b1", "is the plot still available?");
        gateway.push_remote_insert(Table::ChatMessages, to_row(&message).unwrap());
        gateway.push_remote_insert(Table::ChatMessages, to_row(&message).unwrap());
        gateway.push_remote_insert(
            Table::ChatMessages,
            to_row(&ChatMessage::new("b2", "b3", "someone else")).unwrap(),
        );

        assert!(eventually(|| store.read(|s| s.chat_messages.len() == 1)).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.read(|s| s.chat_messages.len()), 1);
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_per_user() {
        let (_, gateway, realtime) = setup();
        realtime.subscribe("b1").await.unwrap();
        realtime.subscribe("b1").await.unwrap();
        assert_eq!(gateway.active_subscriptions(), 1);

        realtime.subscribe("b2").await.unwrap();
        assert_eq!(gateway.active_subscriptions(), 1);
        assert_eq!(realtime.subscribed_user().await.as_deref(), Some("b2"));
    }

    #[tokio::test]
    async fn sync_follows_session_and_ui() {
        let (_, gateway, realtime) = setup();
        realtime.sync(Some("b1"), false).await.unwrap();
        assert_eq!(realtime.state(), ChannelState::Unsubscribed);

        realtime.sync(Some("b1"), true).await.unwrap();
        assert_eq!(realtime.state(), ChannelState::Subscribed);

        realtime.sync(None, true).await.unwrap();
        assert_eq!(realtime.state(), ChannelState::Unsubscribed);
        assert_eq!(gateway.active_subscriptions(), 0);
        assert!(realtime.subscribed_user().await.is_none());
    }

    #[tokio::test]
    async fn reconnects_when_feed_drops() {
        let (store, gateway, realtime) = setup();
        realtime.subscribe("b1").await.unwrap();

        gateway.drop_subscriptions();
        assert!(eventually(|| gateway.active_subscriptions() == 1).await);
        assert!(eventually(|| realtime.state() == ChannelState::Subscribed).await);

        let message = ChatMessage::new("b2", "b1", "back online");
        gateway.push_remote_insert(Table::ChatMessages, to_row(&message).unwrap());
        assert!(eventually(|| store.read(|s| s.chat_messages.len() == 1)).await);

        realtime.unsubscribe().await;
        assert_eq!(gateway.active_subscriptions(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unsubscribe_during_reconnect_leaves_nothing_open() {
        let gateway = Arc::new(MemoryGateway::new());
        let store = Arc::new(Store::new(gateway.clone(), StoreOptions::default()));
        let realtime = ChatRealtime::new(Arc::clone(&store), Duration::from_millis(30));
        realtime.subscribe("b1").await.unwrap();

        gateway.drop_subscriptions();
        assert!(eventually(|| realtime.state() == ChannelState::Subscribing).await);
        realtime.unsubscribe().await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(gateway.active_subscriptions(), 0);
        assert_eq!(realtime.state(), ChannelState::Unsubscribed);
        assert!(realtime.subscribed_user().await.is_none());
    }
}
