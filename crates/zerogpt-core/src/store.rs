//! History Persistence
//!
//! The agent reads and appends conversation turns through [`HistoryStore`].
//! Implementations own ordering and per-user consistency: an append must be
//! visible to the next `load` for the same user id.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{AgentError, Result};
use crate::message::{History, Message};

/// Store trait for conversation history keyed by user id
pub trait HistoryStore: Send + Sync {
    /// Most recent messages for a user, oldest first, capped at the store's
    /// configured limit. Unknown users get an empty history.
    fn load(&self, user_id: &str) -> Result<History>;

    /// Append messages in the given order, without reordering or
    /// deduplicating
    fn save(&self, user_id: &str, messages: &[Message]) -> Result<()>;
}

/// In-memory history store (for development/testing)
pub struct MemoryHistoryStore {
    limit: usize,
    histories: RwLock<HashMap<String, Vec<Message>>>,
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_HISTORY_LIMIT)
    }
}

impl MemoryHistoryStore {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            histories: RwLock::new(HashMap::new()),
        }
    }

    /// Every stored message for a user, ignoring the load limit
    pub fn all_messages(&self, user_id: &str) -> Result<Vec<Message>> {
        let histories = self.histories.read().map_err(|_| poisoned())?;
        Ok(histories.get(user_id).cloned().unwrap_or_default())
    }
}

fn poisoned() -> AgentError {
    AgentError::Storage("history lock poisoned".into())
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self, user_id: &str) -> Result<History> {
        let histories = self.histories.read().map_err(|_| poisoned())?;
        let recent = histories.get(user_id).map_or_else(Vec::new, |messages| {
            let skip = messages.len().saturating_sub(self.limit);
            messages[skip..].to_vec()
        });
        Ok(History::from_messages(recent))
    }

    fn save(&self, user_id: &str, messages: &[Message]) -> Result<()> {
        let mut histories = self.histories.write().map_err(|_| poisoned())?;
        histories
            .entry(user_id.to_owned())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }
}
