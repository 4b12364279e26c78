//! Per-attempt stream session state.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::ProcessingError;

/// Lifecycle of one processor stream attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    AwaitingRegistrationResponse,
    Registered,
    Processing,
    Closed,
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Idle, Connecting | Closed) => true,
            (Connecting, AwaitingRegistrationResponse) => true,
            (AwaitingRegistrationResponse, Registered) => true,
            (Registered, Processing) => true,
            (Connecting | AwaitingRegistrationResponse | Registered | Processing, Closed | Errored) => {
                true
            }
            _ => false,
        }
    }
}

/// What the runtime made of the registration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RegistrationOutcome {
    #[default]
    Pending,
    Confirmed,
    Rejected,
}

/// Broadcast whenever a session changes state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SessionTransition {
    pub attempt: u32,
    pub state: SessionState,
}

/// State of one attempt. A fresh session is created for every attempt.
#[derive(Debug)]
pub struct StreamSession {
    attempt: u32,
    state: SessionState,
    outcome: RegistrationOutcome,
    sequence: u64,
    transitions: broadcast::Sender<SessionTransition>,
}

impl StreamSession {
    pub fn new(attempt: u32, transitions: broadcast::Sender<SessionTransition>) -> Self {
        Self {
            attempt,
            state: SessionState::Idle,
            outcome: RegistrationOutcome::Pending,
            sequence: 0,
            transitions,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn outcome(&self) -> RegistrationOutcome {
        self.outcome
    }

    /// Requests received so far in this session.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn advance(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!(attempt = self.attempt, from = ?self.state, to = ?next, "unexpected session transition");
        }
        debug!(attempt = self.attempt, from = ?self.state, to = ?next, "session transition");
        self.state = next;
        // Nobody listening is fine.
        let _ = self.transitions.send(SessionTransition {
            attempt: self.attempt,
            state: next,
        });
    }

    pub(crate) fn confirm(&mut self) {
        self.outcome = RegistrationOutcome::Confirmed;
        self.advance(SessionState::Registered);
    }

    pub(crate) fn reject(&mut self) {
        self.outcome = RegistrationOutcome::Rejected;
    }

    /// Next diagnostic sequence number.
    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Move to the terminal state matching how the attempt ended.
    pub(crate) fn finish(&mut self, error: &ProcessingError) {
        if self.state.is_terminal() {
            return;
        }
        if error.is_cancelled() {
            self.advance(SessionState::Closed);
        } else {
            self.advance(SessionState::Errored);
        }
    }
}
