//! In-memory conversation store.

use super::{
    Contact, ContactHistory, ConversationMessage, ConversationStore, MessageWithThread,
    SimilarMessage, SimilaritySearch, Thread,
};
use crate::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

/// Length of snippets returned by [`InMemoryStore::find_similar`].
const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Default)]
struct Inner {
    /// (owner, thread id) -> thread
    threads: HashMap<(String, String), Thread>,
    /// (owner, message id) -> thread id
    message_index: HashMap<(String, String), String>,
    /// (owner, contact id) -> contact
    contacts: HashMap<(String, String), Contact>,
}

/// Conversation store and similarity search backed by process memory.
///
/// Messages are grouped into threads; contact histories are derived from
/// messages whose sender or recipients include the contact's email address.
/// Similarity is plain word overlap, which is enough for tests and fixtures.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a thread owned by `owner_id`.
    pub fn insert_thread(&self, owner_id: &str, thread: Thread) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for message in &thread.messages {
            inner.message_index.insert(
                (owner_id.to_string(), message.id.clone()),
                thread.id.clone(),
            );
        }
        inner
            .threads
            .insert((owner_id.to_string(), thread.id.clone()), thread);
    }

    /// Inserts or replaces a contact owned by `owner_id`.
    pub fn insert_contact(&self, owner_id: &str, contact: Contact) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .contacts
            .insert((owner_id.to_string(), contact.id.clone()), contact);
    }

    fn owned_messages(inner: &Inner, owner_id: &str) -> Vec<ConversationMessage> {
        inner
            .threads
            .iter()
            .filter(|((owner, _), _)| owner == owner_id)
            .flat_map(|(_, thread)| thread.messages.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get_message(&self, id: &str, owner_id: &str) -> Result<Option<MessageWithThread>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let key = (owner_id.to_string(), id.to_string());
        let Some(thread_id) = inner.message_index.get(&key) else {
            return Ok(None);
        };
        let Some(thread) = inner.threads.get(&(owner_id.to_string(), thread_id.clone())) else {
            return Ok(None);
        };

        let message = thread.messages.iter().find(|m| m.id == id).cloned();
        Ok(message.map(|message| MessageWithThread {
            message,
            thread_messages: thread.messages.clone(),
        }))
    }

    async fn get_thread(&self, id: &str, owner_id: &str) -> Result<Option<Thread>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .threads
            .get(&(owner_id.to_string(), id.to_string()))
            .cloned())
    }

    async fn get_contact_history(
        &self,
        contact_id: &str,
        owner_id: &str,
        limit: usize,
    ) -> Result<Option<ContactHistory>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let Some(contact) = inner
            .contacts
            .get(&(owner_id.to_string(), contact_id.to_string()))
            .cloned()
        else {
            return Ok(None);
        };

        let email = contact.email.to_lowercase();
        let mut messages: Vec<ConversationMessage> = Self::owned_messages(&inner, owner_id)
            .into_iter()
            .filter(|m| {
                m.from.to_lowercase().contains(&email)
                    || m.to.iter().any(|to| to.to_lowercase().contains(&email))
            })
            .collect();
        messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        messages.truncate(limit);

        Ok(Some(ContactHistory { contact, messages }))
    }
}

#[async_trait]
impl SimilaritySearch for InMemoryStore {
    async fn find_similar(
        &self,
        query: &str,
        owner_id: &str,
        exclude_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SimilarMessage>> {
        let query_words = words(query);
        if query_words.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<(usize, ConversationMessage)> = Self::owned_messages(&inner, owner_id)
            .into_iter()
            .filter(|m| exclude_id != Some(m.id.as_str()))
            .map(|m| {
                let overlap = words(&m.body).intersection(&query_words).count();
                (overlap, m)
            })
            .filter(|(overlap, _)| *overlap > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.sent_at.cmp(&a.1.sent_at)));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, m)| SimilarMessage {
                subject: m.subject,
                snippet: m.body.chars().take(SNIPPET_CHARS).collect(),
            })
            .collect())
    }
}

/// Lowercased words of four or more characters.
fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 4)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(id: &str, from: &str, body: &str, hour: i64) -> ConversationMessage {
        ConversationMessage {
            id: id.to_string(),
            from: from.to_string(),
            to: vec!["me@example.com".to_string()],
            sent_at: Utc
                .timestamp_opt(1_700_000_000 + hour * 3600, 0)
                .single()
                .unwrap_or_default(),
            subject: format!("About {id}"),
            body: body.to_string(),
        }
    }

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_thread(
            "owner",
            Thread {
                id: "t1".to_string(),
                subject: "Pricing".to_string(),
                messages: vec![
                    message("m1", "alice@acme.io", "Can we discuss pricing tiers?", 1),
                    message("m2", "bob@other.io", "Pricing tiers attached for review", 2),
                ],
            },
        );
        store.insert_contact(
            "owner",
            Contact {
                id: "c1".to_string(),
                name: "Alice".to_string(),
                email: "alice@acme.io".to_string(),
                company: Some("Acme".to_string()),
            },
        );
        store
    }

    #[tokio::test]
    async fn test_get_message_with_thread() {
        let store = seeded();
        let found = store.get_message("m1", "owner").await.unwrap().unwrap();
        assert_eq!(found.message.id, "m1");
        assert_eq!(found.thread_messages.len(), 2);
    }

    #[tokio::test]
    async fn test_lookups_are_owner_scoped() {
        let store = seeded();
        assert!(store.get_message("m1", "intruder").await.unwrap().is_none());
        assert!(store.get_thread("t1", "intruder").await.unwrap().is_none());
        assert!(store.get_thread("missing", "owner").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contact_history_filters_by_address() {
        let store = seeded();
        let history = store
            .get_contact_history("c1", "owner", 10)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(history.contact.name, "Alice");
        assert_eq!(history.messages.len(), 1);
        assert_eq!(history.messages[0].id, "m1");
    }

    #[tokio::test]
    async fn test_find_similar_ranks_by_overlap() {
        let store = seeded();
        let similar = store
            .find_similar("pricing tiers question", "owner", None, 5)
            .await
            .unwrap();
        assert_eq!(similar.len(), 2);
        assert!(similar.iter().all(|s| s.snippet.contains("ricing")));

        let none = store
            .find_similar("unrelated words", "owner", None, 5)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_find_similar_skips_excluded_message() {
        let store = seeded();
        let similar = store
            .find_similar("Can we discuss pricing tiers?", "owner", Some("m1"), 5)
            .await
            .unwrap();
        assert_eq!(similar.len(), 1);
        assert!(similar[0].snippet.starts_with("Pricing tiers attached"));
    }
}
