//! Promise value state.
//!
//! The core carries only the state machine; the external executor drives
//! transitions and calls reaction handlers. Reactions registered while a
//! promise is pending are stored on the promise in registration order.
//! Settling moves the matching side into the VM's FIFO event queue, which
//! the executor drains one event per call after the current synchronous
//! step completes.

use crate::value::Value;

/// Which side of a `then` pair a reaction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReactionKind {
    Fulfill,
    Reject,
}

/// A reaction registered on a pending promise.
#[derive(Debug, Clone)]
pub(crate) struct PromiseReaction {
    pub kind: ReactionKind,
    /// The `then`/`catch` handler; `None` means pass-through.
    pub handler: Option<Value>,
    /// The derived promise to settle with the handler's result.
    pub capability: Option<crate::heap::HeapId>,
}

/// A settled reaction waiting in the VM's event queue.
#[derive(Debug, Clone)]
pub(crate) struct PromiseEvent {
    pub reaction: PromiseReaction,
    /// The settlement value the handler receives.
    pub argument: Value,
}

#[derive(Debug, Clone)]
pub(crate) enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

/// Promise payload: state, handled flag, and pending reactions.
#[derive(Debug, Clone)]
pub(crate) struct JsPromise {
    state: PromiseState,
    /// Set once any rejection handler is attached; unhandled rejections
    /// are reported (or ignored) per VM option at the end of the outer
    /// call.
    is_handled: bool,
    fulfill_reactions: Vec<PromiseReaction>,
    reject_reactions: Vec<PromiseReaction>,
}

impl JsPromise {
    pub fn new() -> Self {
        Self {
            state: PromiseState::Pending,
            is_handled: false,
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, PromiseState::Pending)
    }

    pub fn is_handled(&self) -> bool {
        self.is_handled
    }

    /// Registers a reaction pair. Returns the events to enqueue when the
    /// promise is already settled, so late `then` calls still fire in FIFO
    /// order behind earlier queue entries.
    pub fn register(&mut self, on_fulfill: PromiseReaction, on_reject: PromiseReaction) -> Vec<PromiseEvent> {
        self.is_handled = true;
        match &self.state {
            PromiseState::Pending => {
                self.fulfill_reactions.push(on_fulfill);
                self.reject_reactions.push(on_reject);
                Vec::new()
            }
            PromiseState::Fulfilled(value) => vec![PromiseEvent {
                reaction: on_fulfill,
                argument: *value,
            }],
            PromiseState::Rejected(value) => vec![PromiseEvent {
                reaction: on_reject,
                argument: *value,
            }],
        }
    }

    /// Settles a pending promise, returning the reactions of the winning
    /// side as queue events in registration order. Settling twice is a
    /// no-op returning nothing.
    pub fn settle(&mut self, kind: ReactionKind, value: Value) -> Vec<PromiseEvent> {
        if !self.is_pending() {
            return Vec::new();
        }
        self.state = match kind {
            ReactionKind::Fulfill => PromiseState::Fulfilled(value),
            ReactionKind::Reject => PromiseState::Rejected(value),
        };
        let reactions = match kind {
            ReactionKind::Fulfill => std::mem::take(&mut self.fulfill_reactions),
            ReactionKind::Reject => std::mem::take(&mut self.reject_reactions),
        };
        self.fulfill_reactions.clear();
        self.reject_reactions.clear();
        reactions
            .into_iter()
            .map(|reaction| PromiseEvent {
                reaction,
                argument: value,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn reaction(kind: ReactionKind) -> PromiseReaction {
        PromiseReaction {
            kind,
            handler: None,
            capability: None,
        }
    }

    #[test]
    fn settle_releases_matching_side_in_order() {
        let mut promise = JsPromise::new();
        for _ in 0..3 {
            let events = promise.register(reaction(ReactionKind::Fulfill), reaction(ReactionKind::Reject));
            assert!(events.is_empty());
        }

        let events = promise.settle(ReactionKind::Fulfill, Value::Number(1.0));
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.reaction.kind == ReactionKind::Fulfill));
        assert!(!promise.is_pending());

        // Second settlement is ignored.
        assert!(promise.settle(ReactionKind::Reject, Value::Null).is_empty());
    }

    #[test]
    fn late_registration_fires_immediately() {
        let mut promise = JsPromise::new();
        promise.settle(ReactionKind::Reject, Value::Number(7.0));
        let events = promise.register(reaction(ReactionKind::Fulfill), reaction(ReactionKind::Reject));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reaction.kind, ReactionKind::Reject);
        assert!(promise.is_handled());
    }
}
