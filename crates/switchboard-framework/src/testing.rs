//! In-memory [`Interaction`] for tests and demos.
//!
//! [`RecordingInteraction`] follows the three-state acknowledgement contract
//! and records every reply it is asked to send, so assertions can check what
//! an actor would have seen.

use std::any::Any;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use switchboard_core::{Interaction, Reply, ReplyError, ReplyResult, ReplyState};

/// Which acknowledgement method was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyChannel {
    /// Primary reply.
    Reply,
    /// Deferral.
    Defer,
    /// Edit of a deferred reply.
    Edit,
    /// Follow-up message.
    FollowUp,
}

/// One recorded acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    /// Method used.
    pub channel: ReplyChannel,
    /// Payload; `None` for deferrals.
    pub reply: Option<Reply>,
}

/// Injected delivery failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Every delivery succeeds.
    #[default]
    None,
    /// Replies that are not plain are rejected.
    RejectRich,
    /// Every delivery is rejected.
    RejectAll,
    /// The primary reply and edit paths report an expired interaction.
    ExpirePrimary,
}

/// An interaction that records what is sent to it.
#[derive(Debug)]
pub struct RecordingInteraction {
    kind: String,
    actor_id: String,
    identifier: String,
    arguments: Value,
    state: Mutex<ReplyState>,
    sent: Mutex<Vec<SentReply>>,
    failure: FailureMode,
}

impl RecordingInteraction {
    /// Creates a pending interaction.
    pub fn new(kind: impl Into<String>, actor_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            actor_id: actor_id.into(),
            identifier: identifier.into(),
            arguments: Value::Null,
            state: Mutex::new(ReplyState::Pending),
            sent: Mutex::new(Vec::new()),
            failure: FailureMode::None,
        }
    }

    /// Shorthand for a button press.
    pub fn button(actor_id: &str, identifier: &str) -> Self {
        Self::new("button", actor_id, identifier)
    }

    /// Shorthand for a command invocation.
    pub fn command(actor_id: &str, name: &str) -> Self {
        Self::new("command", actor_id, name)
    }

    /// Sets the arguments.
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    /// Starts in `state` instead of pending.
    pub fn with_state(self, state: ReplyState) -> Self {
        *self.state.lock() = state;
        self
    }

    /// Injects delivery failures.
    pub fn failing(mut self, failure: FailureMode) -> Self {
        self.failure = failure;
        self
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<SentReply> {
        self.sent.lock().clone()
    }

    /// Payloads sent so far, deferrals excluded.
    pub fn replies(&self) -> Vec<Reply> {
        self.sent
            .lock()
            .iter()
            .filter_map(|sent| sent.reply.clone())
            .collect()
    }

    /// The most recent payload.
    pub fn last_reply(&self) -> Option<Reply> {
        self.replies().pop()
    }

    fn reject(&self, reply: &Reply) -> ReplyResult<()> {
        match self.failure {
            FailureMode::RejectAll => Err(ReplyError::Transport("connection closed".into())),
            FailureMode::RejectRich if !reply.plain => Err(ReplyError::Rejected {
                code: 50035,
                message: "Invalid Form Body".into(),
            }),
            _ => Ok(()),
        }
    }

    fn record(&self, channel: ReplyChannel, reply: Option<Reply>) {
        self.sent.lock().push(SentReply { channel, reply });
    }
}

#[async_trait]
impl Interaction for RecordingInteraction {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn actor_id(&self) -> &str {
        &self.actor_id
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn arguments(&self) -> Value {
        self.arguments.clone()
    }

    fn reply_state(&self) -> ReplyState {
        *self.state.lock()
    }

    async fn reply(&self, reply: Reply) -> ReplyResult<()> {
        if self.failure == FailureMode::ExpirePrimary {
            return Err(ReplyError::Expired);
        }
        self.reject(&reply)?;
        {
            let mut state = self.state.lock();
            if *state != ReplyState::Pending {
                return Err(ReplyError::AlreadyAcknowledged);
            }
            *state = ReplyState::Responded;
        }
        self.record(ReplyChannel::Reply, Some(reply));
        Ok(())
    }

    async fn defer(&self) -> ReplyResult<()> {
        {
            let mut state = self.state.lock();
            if *state != ReplyState::Pending {
                return Err(ReplyError::AlreadyAcknowledged);
            }
            *state = ReplyState::Deferred;
        }
        self.record(ReplyChannel::Defer, None);
        Ok(())
    }

    async fn edit_reply(&self, reply: Reply) -> ReplyResult<()> {
        if self.failure == FailureMode::ExpirePrimary {
            return Err(ReplyError::Expired);
        }
        self.reject(&reply)?;
        {
            let mut state = self.state.lock();
            if *state != ReplyState::Deferred {
                return Err(ReplyError::AlreadyAcknowledged);
            }
            *state = ReplyState::Responded;
        }
        self.record(ReplyChannel::Edit, Some(reply));
        Ok(())
    }

    async fn follow_up(&self, reply: Reply) -> ReplyResult<()> {
        self.reject(&reply)?;
        self.record(ReplyChannel::FollowUp, Some(reply));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
