//! Per-subscriber pending input flows.
//!
//! A subscriber has at most one flow waiting for free text. Starting a flow
//! replaces whatever was pending, `take` hands the flow to exactly one
//! completion attempt, and `cancel` drops it without running anything. The
//! state is process-local and intentionally not persisted.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::models::SubscriberId;

/// What the next free-text message from a subscriber means.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PendingInput {
    #[default]
    None,
    AwaitingLookupAsset,
    AwaitingAddAsset,
    AwaitingRemoveAsset,
    AwaitingDefaultThreshold,
    AwaitingOverrideThreshold(String),
}

impl PendingInput {
    pub fn is_none(&self) -> bool {
        matches!(self, PendingInput::None)
    }
}

/// Pending flows keyed by subscriber.
#[derive(Debug, Default)]
pub struct Conversation {
    pending: Mutex<HashMap<SubscriberId, PendingInput>>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `flow` for `id`, silently abandoning any previous one.
    pub fn begin(&self, id: SubscriberId, flow: PendingInput) {
        let mut pending = self.lock();
        if flow.is_none() {
            pending.remove(&id);
            return;
        }
        if let Some(previous) = pending.insert(id, flow) {
            debug!(subscriber = id, ?previous, "abandoned pending input");
        }
    }

    /// Remove and return the pending flow. The subscriber is back to `None` afterwards.
    pub fn take(&self, id: SubscriberId) -> PendingInput {
        self.lock().remove(&id).unwrap_or_default()
    }

    /// Clear the pending flow without completing it. Returns whether one was pending.
    pub fn cancel(&self, id: SubscriberId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Peek at the pending flow.
    pub fn current(&self, id: SubscriberId) -> PendingInput {
        self.lock().get(&id).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, PendingInput>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_replaces_previous_flow() {
        let conversation = Conversation::new();
        conversation.begin(1, PendingInput::AwaitingAddAsset);
        conversation.begin(1, PendingInput::AwaitingOverrideThreshold("bitcoin".into()));
        assert_eq!(
            conversation.current(1),
            PendingInput::AwaitingOverrideThreshold("bitcoin".into())
        );
    }

    #[test]
    fn test_take_runs_at_most_once() {
        let conversation = Conversation::new();
        conversation.begin(1, PendingInput::AwaitingDefaultThreshold);
        assert_eq!(conversation.take(1), PendingInput::AwaitingDefaultThreshold);
        assert_eq!(conversation.take(1), PendingInput::None);
    }

    #[test]
    fn test_cancel_and_isolation() {
        let conversation = Conversation::new();
        conversation.begin(1, PendingInput::AwaitingLookupAsset);
        conversation.begin(2, PendingInput::AwaitingRemoveAsset);

        assert!(conversation.cancel(1));
        assert!(!conversation.cancel(1));
        assert!(conversation.current(1).is_none());
        assert_eq!(conversation.current(2), PendingInput::AwaitingRemoveAsset);

        conversation.begin(2, PendingInput::None);
        assert!(conversation.current(2).is_none());
    }
}
