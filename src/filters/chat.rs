use std::collections::HashSet;

use crate::models::ChatMessage;

/// Messages exchanged between `user` and `partner`, oldest first
pub fn conversation<'a>(messages: &'a [ChatMessage], user: &str, partner: &str) -> Vec<&'a ChatMessage> {
    let mut thread: Vec<&ChatMessage> = messages.iter().filter(|m| m.is_between(user, partner)).collect();
    thread.sort_by_key(|m| m.timestamp);
    thread
}

/// Everyone `user` has talked to, most recent conversation first
pub fn partners(messages: &[ChatMessage], user: &str) -> Vec<String> {
    let mut ordered: Vec<&ChatMessage> = messages.iter().collect();
    ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut seen = HashSet::new();
    ordered
        .into_iter()
        .filter_map(|m| m.partner_of(user))
        .filter(|p| *p != user && seen.insert(p.to_string()))
        .map(str::to_string)
        .collect()
}
