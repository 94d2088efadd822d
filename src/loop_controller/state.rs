//! Lifecycle state machine for the run loop
//!
//! ```text
//!            start                 pause
//!   Idle ───────────► Running ───────────► Paused
//!    ▲                 │  ▲                  │
//!    └──────stop───────┘  └──────start───────┘
//! ```
//!
//! Every transition not drawn above is a no-op. `stop` from `Paused` is one of
//! them: a paused loop keeps its paused flag until the next `start` resumes it.

/// Lifecycle state of a [`super::LoopController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Running,
    Paused,
}

/// Lifecycle requests accepted by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    Start,
    Stop,
    Pause,
}

impl LoopState {
    /// Transition table. `None` means the event is a no-op in this state.
    pub fn on(self, event: LoopEvent) -> Option<LoopState> {
        match (self, event) {
            (LoopState::Idle, LoopEvent::Start) => Some(LoopState::Running),
            (LoopState::Paused, LoopEvent::Start) => Some(LoopState::Running),
            (LoopState::Running, LoopEvent::Stop) => Some(LoopState::Idle),
            (LoopState::Running, LoopEvent::Pause) => Some(LoopState::Paused),
            _ => None,
        }
    }

    pub fn is_running(self) -> bool {
        self == LoopState::Running
    }

    pub fn is_paused(self) -> bool {
        self == LoopState::Paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use LoopEvent::*;
        use LoopState::*;

        let cases = [
            (Idle, Start, Some(Running)),
            (Idle, Stop, None),
            (Idle, Pause, None),
            (Running, Start, None),
            (Running, Stop, Some(Idle)),
            (Running, Pause, Some(Paused)),
            (Paused, Start, Some(Running)),
            (Paused, Stop, None),
            (Paused, Pause, None),
        ];

        for (from, event, expected) in cases {
            assert_eq!(from.on(event), expected, "{:?} + {:?}", from, event);
        }
    }

    #[test]
    fn running_and_paused_are_exclusive() {
        for state in [LoopState::Idle, LoopState::Running, LoopState::Paused] {
            assert!(!(state.is_running() && state.is_paused()));
        }
        assert_eq!(LoopState::default(), LoopState::Idle);
    }
}
