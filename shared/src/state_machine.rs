//! Serial Session State Machine
//!
//! Defines the connection lifecycle of one serial session and the valid
//! transitions between its states.

use std::fmt;

/// Lifecycle state of a serial session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Constructed, never connected
    #[default]
    Idle,
    /// Handshake in progress
    Connecting,
    /// Stream established, reader and writer available
    Connected,
    /// Socket released, either by close or by a failed handshake
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// connect() was called
    ConnectRequested,
    /// Handshake completed
    HandshakeSucceeded,
    /// Handshake faulted
    HandshakeFailed,
    /// close() was called
    CloseRequested,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed, for idempotent events)
    Success(SessionState),
    /// Transition was invalid from current state
    Invalid {
        from: SessionState,
        event: SessionEvent,
    },
}

/// Tracks the lifecycle state of one session
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    current_state: SessionState,
}

impl SessionStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Idle,
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.current_state
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: SessionEvent) -> TransitionResult {
        match self.next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn next_state(&self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self.current_state, event) {
            // A fresh or closed session may start a handshake
            (Idle | Closed, ConnectRequested) => Some(Connecting),

            // Handshake outcome
            (Connecting, HandshakeSucceeded) => Some(Connected),
            (Connecting, HandshakeFailed) => Some(Closed),

            // Close is idempotent from every state
            (Connected | Connecting | Closed, CloseRequested) => Some(Closed),
            (Idle, CloseRequested) => Some(Idle),

            _ => None,
        }
    }
}

/// Check if a transition from one state to another is generally valid
pub fn is_valid_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;

    match (from, to) {
        (a, b) if a == b => true,
        (Idle, Connecting) => true,
        (Connecting, Connected) => true,
        (Connecting, Closed) => true,
        (Connected, Closed) => true,
        (Closed, Connecting) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let fsm = SessionStateMachine::new();
        assert_eq!(fsm.state(), SessionState::Idle);
    }

    #[test]
    fn test_connect_close_reconnect_flow() {
        let mut fsm = SessionStateMachine::new();

        let result = fsm.process_event(SessionEvent::ConnectRequested);
        assert_eq!(result, TransitionResult::Success(SessionState::Connecting));

        let result = fsm.process_event(SessionEvent::HandshakeSucceeded);
        assert_eq!(result, TransitionResult::Success(SessionState::Connected));

        let result = fsm.process_event(SessionEvent::CloseRequested);
        assert_eq!(result, TransitionResult::Success(SessionState::Closed));

        let result = fsm.process_event(SessionEvent::ConnectRequested);
        assert_eq!(result, TransitionResult::Success(SessionState::Connecting));
    }

    #[test]
    fn test_failed_handshake_closes() {
        let mut fsm = SessionStateMachine::new();
        fsm.process_event(SessionEvent::ConnectRequested);

        let result = fsm.process_event(SessionEvent::HandshakeFailed);
        assert_eq!(result, TransitionResult::Success(SessionState::Closed));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut fsm = SessionStateMachine::new();

        // Never connected: stays idle
        let result = fsm.process_event(SessionEvent::CloseRequested);
        assert_eq!(result, TransitionResult::Success(SessionState::Idle));

        fsm.process_event(SessionEvent::ConnectRequested);
        fsm.process_event(SessionEvent::HandshakeSucceeded);
        fsm.process_event(SessionEvent::CloseRequested);
        let result = fsm.process_event(SessionEvent::CloseRequested);
        assert_eq!(result, TransitionResult::Success(SessionState::Closed));
    }

    #[test]
    fn test_invalid_transition() {
        let mut fsm = SessionStateMachine::new();

        // Can't complete a handshake that never started
        let result = fsm.process_event(SessionEvent::HandshakeSucceeded);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), SessionState::Idle);

        // Can't connect twice
        fsm.process_event(SessionEvent::ConnectRequested);
        fsm.process_event(SessionEvent::HandshakeSucceeded);
        let result = fsm.process_event(SessionEvent::ConnectRequested);
        assert!(matches!(
            result,
            TransitionResult::Invalid {
                from: SessionState::Connected,
                ..
            }
        ));
    }

    #[test]
    fn test_is_valid_transition() {
        assert!(is_valid_transition(SessionState::Idle, SessionState::Connecting));
        assert!(is_valid_transition(SessionState::Closed, SessionState::Connecting));
        assert!(!is_valid_transition(SessionState::Idle, SessionState::Connected));
        assert!(!is_valid_transition(SessionState::Connected, SessionState::Connecting));
    }
}
