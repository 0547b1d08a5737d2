//! Conversation data collaborators.
//!
//! The skill pipelines read messages, threads and contact histories from a
//! [`ConversationStore`] and optionally enrich prompts through a
//! [`SimilaritySearch`]. Both are owned by the embedding application; this
//! module defines their contracts and the read-only snapshot types they
//! return. [`InMemoryStore`] implements both for tests and local tooling.

mod memory;

pub use memory::InMemoryStore;

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single message snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Message id.
    pub id: String,
    /// Sender address or display name.
    pub from: String,
    /// Recipients.
    pub to: Vec<String>,
    /// When the message was sent or received.
    pub sent_at: DateTime<Utc>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// A message together with the thread it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageWithThread {
    /// The requested message.
    pub message: ConversationMessage,
    /// Other messages of the same thread, in any order.
    #[serde(default)]
    pub thread_messages: Vec<ConversationMessage>,
}

/// A conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Thread id.
    pub id: String,
    /// Thread subject.
    pub subject: String,
    /// Messages of the thread, in any order.
    pub messages: Vec<ConversationMessage>,
}

/// A CRM contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Primary email address.
    pub email: String,
    /// Company, when known.
    #[serde(default)]
    pub company: Option<String>,
}

/// A contact and the messages exchanged with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactHistory {
    /// The contact.
    pub contact: Contact,
    /// Messages exchanged with the contact, most recent first or in any order.
    pub messages: Vec<ConversationMessage>,
}

/// A prior message close to a query text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarMessage {
    /// Subject of the prior message.
    pub subject: String,
    /// Short excerpt of its body.
    pub snippet: String,
}

/// Lookup of conversation data.
///
/// Absence is reported as `Ok(None)`; `Err` is reserved for store failures.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetches a message and its thread.
    async fn get_message(&self, id: &str, owner_id: &str) -> Result<Option<MessageWithThread>>;

    /// Fetches a thread.
    async fn get_thread(&self, id: &str, owner_id: &str) -> Result<Option<Thread>>;

    /// Fetches a contact and up to `limit` of the messages exchanged with them.
    async fn get_contact_history(
        &self,
        contact_id: &str,
        owner_id: &str,
        limit: usize,
    ) -> Result<Option<ContactHistory>>;
}

/// Nearest-neighbour search over prior messages.
///
/// Failures are never fatal to callers.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Returns up to `limit` prior messages similar to `query`, never
    /// including the message with id `exclude_id`.
    async fn find_similar(
        &self,
        query: &str,
        owner_id: &str,
        exclude_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SimilarMessage>>;
}

/// A similarity search that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSimilaritySearch;

#[async_trait]
impl SimilaritySearch for NoSimilaritySearch {
    async fn find_similar(
        &self,
        _query: &str,
        _owner_id: &str,
        _exclude_id: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<SimilarMessage>> {
        Ok(Vec::new())
    }
}
