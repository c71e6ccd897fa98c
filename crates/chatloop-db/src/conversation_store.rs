use std::sync::Arc;

use chatloop_common::{ChatMessage, Result, ThreadId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

/// One thread's message log plus bookkeeping timestamps.
#[derive(Debug)]
struct Conversation {
    thread_id: ThreadId,
    log: Vec<ChatMessage>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Conversation {
    fn new(thread_id: ThreadId) -> Self {
        let now = Utc::now();
        Self {
            thread_id,
            log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate the whole batch first so a bad message leaves the log untouched.
    fn commit(&mut self, messages: Vec<ChatMessage>) -> Result<usize> {
        for message in &messages {
            message.validate()?;
        }
        if !messages.is_empty() {
            self.log.extend(messages);
            self.updated_at = Utc::now();
        }
        Ok(self.log.len())
    }
}

/// Read-only copy of a conversation, used for history inspection.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnapshot {
    pub thread_id: ThreadId,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Process-wide store of conversations keyed by thread id.
///
/// Each thread has its own async mutex, so appends to one thread are
/// serialized while distinct threads never wait on each other. Conversations
/// are never evicted; memory grows with the number of threads seen.
#[derive(Debug, Default)]
pub struct ConversationStore {
    threads: DashMap<ThreadId, Arc<Mutex<Conversation>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the slot for `thread_id`, creating it at most once.
    fn slot(&self, thread_id: &ThreadId) -> Arc<Mutex<Conversation>> {
        if let Some(existing) = self.threads.get(thread_id) {
            return Arc::clone(existing.value());
        }
        let entry = self.threads.entry(thread_id.clone()).or_insert_with(|| {
            debug!(thread_id = %thread_id, "creating conversation");
            Arc::new(Mutex::new(Conversation::new(thread_id.clone())))
        });
        Arc::clone(entry.value())
    }

    /// Snapshot of the thread's log; an unseen thread starts out empty.
    pub async fn get(&self, thread_id: &ThreadId) -> Vec<ChatMessage> {
        let slot = self.slot(thread_id);
        let conversation = slot.lock().await;
        conversation.log.clone()
    }

    /// Append `messages` to the thread's log as one unit. Returns the new log length.
    pub async fn append(&self, thread_id: &ThreadId, messages: Vec<ChatMessage>) -> Result<usize> {
        let slot = self.slot(thread_id);
        let mut conversation = slot.lock().await;
        let count = messages.len();
        let len = conversation.commit(messages)?;
        debug!(thread_id = %thread_id, appended = count, len, "conversation updated");
        Ok(len)
    }

    /// Take exclusive ownership of one thread until the lease is dropped.
    ///
    /// Used to run a whole turn (read history, call the model, commit) without
    /// another request on the same thread interleaving.
    pub async fn checkout(&self, thread_id: &ThreadId) -> ConversationLease {
        let slot = self.slot(thread_id);
        ConversationLease {
            guard: slot.lock_owned().await,
        }
    }

    /// Snapshot of an existing thread without creating it.
    pub async fn snapshot(&self, thread_id: &ThreadId) -> Option<ConversationSnapshot> {
        let slot = self.threads.get(thread_id).map(|s| Arc::clone(s.value()))?;
        let conversation = slot.lock().await;
        Some(ConversationSnapshot {
            thread_id: conversation.thread_id.clone(),
            messages: conversation.log.clone(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        })
    }

    pub fn contains(&self, thread_id: &ThreadId) -> bool {
        self.threads.contains_key(thread_id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn thread_ids(&self) -> Vec<ThreadId> {
        let mut ids: Vec<ThreadId> = self.threads.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

/// Exclusive access to one conversation.
pub struct ConversationLease {
    guard: OwnedMutexGuard<Conversation>,
}

impl ConversationLease {
    pub fn thread_id(&self) -> &ThreadId {
        &self.guard.thread_id
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.guard.log
    }

    /// Commit a finished turn. All-or-nothing, like [`ConversationStore::append`].
    pub fn commit(&mut self, messages: Vec<ChatMessage>) -> Result<usize> {
        let count = messages.len();
        let len = self.guard.commit(messages)?;
        info!(thread_id = %self.guard.thread_id, appended = count, len, "turn committed");
        Ok(len)
    }
}
