//! Lifecycle states shared by queues, topics and clients
//!
//! Each entity keeps its state in an [`AtomicState`]. Transitions are a
//! single compare-and-swap, so two racing transition attempts can never
//! both succeed.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle state of a queue, topic or client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum State {
    Init = 0,
    Running = 1,
    Closing = 2,
    Closed = 3,
}

impl State {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => State::Init,
            1 => State::Running,
            2 => State::Closing,
            _ => State::Closed,
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::Init
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Init => "Init",
            State::Running => "Running",
            State::Closing => "Closing",
            State::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// Atomically updated [`State`]
#[derive(Debug, Default)]
pub struct AtomicState(AtomicU8);

impl AtomicState {
    /// Create a new cell holding `state`
    pub fn new(state: State) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Current state
    pub fn load(&self) -> State {
        State::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to` in one step.
    ///
    /// On failure nothing changes and the observed state is returned.
    pub fn transition(&self, from: State, to: State) -> Result<(), State> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(State::from_u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_succeeds_from_expected_state() {
        let state = AtomicState::default();
        assert_eq!(state.load(), State::Init);

        state.transition(State::Init, State::Running).unwrap();
        assert_eq!(state.load(), State::Running);
    }

    #[test]
    fn test_transition_reports_observed_state() {
        let state = AtomicState::new(State::Closing);

        let observed = state.transition(State::Running, State::Closing).unwrap_err();
        assert_eq!(observed, State::Closing);
        assert_eq!(state.load(), State::Closing);
    }

    #[test]
    fn test_only_one_racing_transition_wins() {
        let state = std::sync::Arc::new(AtomicState::new(State::Running));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || state.transition(State::Running, State::Closing).is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
