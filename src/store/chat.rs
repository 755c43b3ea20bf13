use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::{Store, StoreState};
use crate::chat::bot;
use crate::error::Result;
use crate::gateway::{from_rows, to_row, Filter, Query, Table};
use crate::models::{ChatMessage, BOT_ID};

/// Where an appended message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    /// Written on this client; persisted unless it is a bot exchange
    Local,
    /// Delivered by the push channel; already persisted
    Remote,
}

/// Insert keeping timestamp order; false when the id is already present
fn append_unique(state: &mut StoreState, message: ChatMessage) -> bool {
    if state.chat_messages.iter().any(|m| m.id == message.id) {
        return false;
    }
    let at = state
        .chat_messages
        .partition_point(|m| m.timestamp <= message.timestamp);
    state.chat_messages.insert(at, message);
    true
}

impl Store {
    /// Append a message. Echoes of a known id are dropped, so local sends
    /// and push deliveries of the same message converge.
    pub async fn add_chat_message(&self, message: ChatMessage) -> Result<bool> {
        self.append_message(message, MessageOrigin::Local).await
    }

    /// Entry point for the push channel
    pub async fn apply_remote_message(&self, message: ChatMessage) -> Result<bool> {
        self.append_message(message, MessageOrigin::Remote).await
    }

    async fn append_message(&self, message: ChatMessage, origin: MessageOrigin) -> Result<bool> {
        let id = message.id.clone();
        let persist = origin == MessageOrigin::Local && !message.involves_bot();

        let row = if persist { Some(to_row(&message)?) } else { None };
        if self.mutate_if(|s| append_unique(s, message).then_some(())).is_none() {
            debug!("Dropping duplicate message {}", id);
            return Ok(false);
        }

        let Some(row) = row else {
            return Ok(true);
        };
        let outcome = self.gateway.insert(Table::ChatMessages, row).await.map(|_| ());
        self.reconcile("add_chat_message", outcome, |s| s.chat_messages.retain(|m| m.id != id))?;
        Ok(true)
    }

    /// Send as the signed-in user. Messages to the bot get a scripted
    /// reply after the configured delay.
    pub async fn send_chat_message(self: &Arc<Self>, receiver_id: &str, text: &str) -> Result<ChatMessage> {
        let sender_id = self.require_user()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(crate::error::Error::validation("text", "message is empty"));
        }

        let message = ChatMessage::new(sender_id.clone(), receiver_id, text);
        self.add_chat_message(message.clone()).await?;

        if receiver_id == BOT_ID {
            let store = Arc::clone(self);
            let reply_text = bot::reply_for(text).to_string();
            let delay = self.options.bot_reply_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let reply = ChatMessage::new(BOT_ID, sender_id.clone(), reply_text);
                // Bot replies stay local; drop the reply if its user signed out meanwhile
                let appended = store.mutate_if(|s| {
                    (s.current_user_id() == Some(sender_id.as_str()) && append_unique(s, reply))
                        .then_some(())
                });
                if appended.is_none() {
                    debug!("Discarding bot reply for {}, session changed", sender_id);
                }
            });
        }
        Ok(message)
    }

    /// Load the user's conversations, keeping the local-only bot exchange
    pub async fn fetch_chat_messages(&self, user_id: &str) -> Result<()> {
        let sent = Query::all()
            .filter(Filter::eq("sender_id", user_id))
            .order_by("timestamp", true);
        let received = Query::all()
            .filter(Filter::eq("receiver_id", user_id))
            .order_by("timestamp", true);

        let mut rows = self.gateway.select(Table::ChatMessages, &sent).await?;
        rows.extend(self.gateway.select(Table::ChatMessages, &received).await?);
        let fetched: Vec<ChatMessage> = from_rows(rows)?;
        info!("Fetched {} chat messages for {}", fetched.len(), user_id);

        self.mutate(|s| {
            let bot_messages: Vec<ChatMessage> = s
                .chat_messages
                .drain(..)
                .filter(ChatMessage::involves_bot)
                .collect();
            let mut seen = HashSet::new();
            let mut merged: Vec<ChatMessage> = fetched
                .into_iter()
                .chain(bot_messages)
                .filter(|m| seen.insert(m.id.clone()))
                .collect();
            merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
            s.chat_messages = merged;
        });
        Ok(())
    }
}
