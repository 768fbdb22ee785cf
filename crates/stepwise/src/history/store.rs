//! The history store: ordered managed messages plus a running size counter.
//!
//! Every mutation keeps `current_size == Σ metadata.size`. Messages are
//! identified by a [`MessageId`] handed out at append time, which lets
//! [`MessageHistory::replace_range`] detect callers working from a stale
//! snapshot instead of silently corrupting the counter.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::budget::MessageSizer;
use crate::Message;

/// Identity of a message within one [`MessageHistory`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// What a history entry represents.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// System prompt, task description, initial actions.
    Init,
    /// Observation of the environment for the current step.
    State,
    /// Output of the decision collaborator.
    Action,
    /// Outcome of an executed action (or a recorded failure).
    Result,
    /// Procedural memory produced by compaction.
    Memory,
}

impl MessageKind {
    /// `Init` and `Memory` entries are never compacted or trimmed.
    pub fn is_exempt(self) -> bool {
        matches!(self, MessageKind::Init | MessageKind::Memory)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageKind::Init => "init",
            MessageKind::State => "state",
            MessageKind::Action => "action",
            MessageKind::Result => "result",
            MessageKind::Memory => "memory",
        };
        f.write_str(s)
    }
}

/// Size and kind attached 1:1 to a history message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageMetadata {
    /// Cost in size units (estimated tokens).
    pub size: usize,
    pub kind: MessageKind,
}

impl MessageMetadata {
    pub fn new(size: usize, kind: MessageKind) -> Self {
        Self { size, kind }
    }
}

/// A message together with its metadata and history identity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ManagedMessage {
    pub id: MessageId,
    pub message: Message,
    pub metadata: MessageMetadata,
}

impl ManagedMessage {
    pub fn size(&self) -> usize {
        self.metadata.size
    }

    pub fn kind(&self) -> MessageKind {
        self.metadata.kind
    }

    pub fn is_exempt(&self) -> bool {
        self.metadata.kind.is_exempt()
    }
}

/// A history mutation referenced elements that are not (or no longer) there.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("message {0} is not in the history (stale snapshot)")]
    Stale(MessageId),
    #[error("message {0} is listed more than once")]
    Duplicate(MessageId),
    #[error("replacement range is empty")]
    EmptyRange,
}

/// Read-only copy of the history at a point in time.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HistorySnapshot {
    pub messages: Vec<ManagedMessage>,
    pub current_size: usize,
    pub taken_at: DateTime<Utc>,
}

impl HistorySnapshot {
    /// Plain messages in conversation order.
    pub fn to_messages(&self) -> Vec<Message> {
        self.messages.iter().map(|m| m.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Newest entry of the given kind.
    pub fn last_of_kind(&self, kind: MessageKind) -> Option<&ManagedMessage> {
        self.messages.iter().rev().find(|m| m.kind() == kind)
    }
}

/// Ordered, size-tracked conversation history.
#[derive(Debug, Default, Clone)]
pub struct MessageHistory {
    messages: Vec<ManagedMessage>,
    current_size: usize,
    next_id: u64,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Append a message at the end of the history.
    pub fn append(&mut self, message: Message, metadata: MessageMetadata) -> MessageId {
        let id = self.allocate_id();
        self.current_size += metadata.size;
        trace!(
            "history append {id}: kind={}, size={}, total={}",
            metadata.kind, metadata.size, self.current_size
        );
        self.messages.push(ManagedMessage {
            id,
            message,
            metadata,
        });
        id
    }

    /// Append a message whose size is computed by `sizer`.
    pub fn append_sized(
        &mut self,
        message: Message,
        kind: MessageKind,
        sizer: &dyn MessageSizer,
    ) -> MessageId {
        let size = sizer.size_of(&message);
        self.append(message, MessageMetadata::new(size, kind))
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            messages: self.messages.clone(),
            current_size: self.current_size,
            taken_at: Utc::now(),
        }
    }

    pub fn messages(&self) -> &[ManagedMessage] {
        &self.messages
    }

    pub fn to_messages(&self) -> Vec<Message> {
        self.messages.iter().map(|m| m.message.clone()).collect()
    }

    pub fn get(&self, id: MessageId) -> Option<&ManagedMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// Validate a set of ids against the current contents.
    fn resolve(&self, ids: &[MessageId]) -> Result<HashSet<MessageId>, HistoryError> {
        let mut wanted = HashSet::with_capacity(ids.len());
        for id in ids {
            if !wanted.insert(*id) {
                return Err(HistoryError::Duplicate(*id));
            }
        }
        let present: HashSet<MessageId> = self.messages.iter().map(|m| m.id).collect();
        if let Some(missing) = ids.iter().find(|id| !present.contains(id)) {
            return Err(HistoryError::Stale(*missing));
        }
        Ok(wanted)
    }

    /// Remove the given entries. Returns the size freed.
    ///
    /// Either every id is removed or, on error, none are.
    pub fn remove(&mut self, ids: &[MessageId]) -> Result<usize, HistoryError> {
        let wanted = self.resolve(ids)?;
        let mut freed = 0;
        self.messages.retain(|m| {
            if wanted.contains(&m.id) {
                freed += m.metadata.size;
                false
            } else {
                true
            }
        });
        self.current_size -= freed;
        self.debug_check();
        Ok(freed)
    }

    /// Atomically replace `old` with a single new message.
    ///
    /// The new message takes the position of the earliest removed entry;
    /// entries not in `old` keep their relative order around it. On error
    /// the history is left untouched.
    pub fn replace_range(
        &mut self,
        old: &[MessageId],
        message: Message,
        metadata: MessageMetadata,
    ) -> Result<MessageId, HistoryError> {
        let wanted = self.resolve(old)?;
        if wanted.is_empty() {
            return Err(HistoryError::EmptyRange);
        }

        let id = self.allocate_id();
        let mut kept = Vec::with_capacity(self.messages.len() - wanted.len() + 1);
        let mut insert_at = None;
        let mut removed_size = 0;
        for entry in std::mem::take(&mut self.messages) {
            if wanted.contains(&entry.id) {
                insert_at.get_or_insert(kept.len());
                removed_size += entry.metadata.size;
            } else {
                kept.push(entry);
            }
        }
        let position = insert_at.unwrap_or(kept.len());
        kept.insert(
            position,
            ManagedMessage {
                id,
                message,
                metadata,
            },
        );

        self.messages = kept;
        self.current_size = self.current_size - removed_size + metadata.size;
        debug!(
            "history replace: {} entries ({removed_size} size) -> {id} ({} size) at index {position}",
            wanted.len(),
            metadata.size
        );
        self.debug_check();
        Ok(id)
    }

    /// Remove the newest entry of `kind`, if any.
    pub fn remove_last_of_kind(&mut self, kind: MessageKind) -> Option<ManagedMessage> {
        let index = self.messages.iter().rposition(|m| m.kind() == kind)?;
        let removed = self.messages.remove(index);
        self.current_size -= removed.metadata.size;
        Some(removed)
    }

    /// Shrink the history until `current_size <= max_size`.
    ///
    /// Cuts the newest non-exempt message's text by the fraction of the
    /// excess it accounts for, dropping it when almost all of it would go.
    /// Exempt entries are never touched, so the result may still exceed
    /// `max_size` when only exempt entries remain. Returns the size freed.
    pub fn trim_to_budget(&mut self, max_size: usize, sizer: &dyn MessageSizer) -> usize {
        let before = self.current_size;
        while self.current_size > max_size {
            let Some(index) = self
                .messages
                .iter()
                .rposition(|m| !m.is_exempt() && !m.message.is_blank())
            else {
                break;
            };
            let excess = self.current_size - max_size;
            let entry = &mut self.messages[index];
            let old_size = entry.metadata.size;
            let proportion = if old_size == 0 {
                1.0
            } else {
                excess as f64 / old_size as f64
            };

            let text = entry.message.text();
            let total_chars = text.chars().count();
            let cut_chars = ((total_chars as f64 * proportion).ceil() as usize).min(total_chars);
            let keep_chars = total_chars - cut_chars;

            if proportion > 0.99 || keep_chars == 0 {
                let removed = self.messages.remove(index);
                debug!(
                    "budget trim: dropped {} ({} size)",
                    removed.id, removed.metadata.size
                );
                self.current_size -= removed.metadata.size;
                continue;
            }

            let shortened: String = text.chars().take(keep_chars).collect();
            entry.message.content = Some(shortened);
            let new_size = sizer.size_of(&entry.message);
            if new_size >= old_size {
                // The sizer did not shrink with the text; fall back to dropping it.
                let removed = self.messages.remove(index);
                self.current_size -= removed.metadata.size;
                continue;
            }
            entry.metadata.size = new_size;
            self.current_size = self.current_size - old_size + new_size;
            debug!(
                "budget trim: shortened {} from {old_size} to {new_size} size",
                entry.id
            );
        }
        self.debug_check();
        before.saturating_sub(self.current_size)
    }

    fn debug_check(&self) {
        debug_assert_eq!(
            self.current_size,
            self.messages.iter().map(|m| m.metadata.size).sum::<usize>(),
            "history size counter out of sync"
        );
    }
}
