use std::collections::VecDeque;

use super::error::{StateError, StateResult};
use super::{event::StateTransition, CaptureEvent, CapturePhase};

const HISTORY_LIMIT: usize = 64;

#[derive(Debug)]
pub struct StateMachine {
    state: CapturePhase,
    transition_history: VecDeque<StateTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: CapturePhase::default(),
            transition_history: VecDeque::new(),
        }
    }

    pub fn state(&self) -> CapturePhase {
        self.state
    }

    pub fn can_transition(&self, event: CaptureEvent) -> bool {
        self.next_state(event).is_some()
    }

    pub fn next_state(&self, event: CaptureEvent) -> Option<CapturePhase> {
        use CaptureEvent::*;
        match (self.state, event) {
            (CapturePhase::Idle, Start) => Some(CapturePhase::Capturing),
            (CapturePhase::Capturing, FrameCaptured) => Some(CapturePhase::Encoding),
            (CapturePhase::Encoding, FrameEncoded) => Some(CapturePhase::Persisting),
            (CapturePhase::Persisting, ArtifactPersisted) => Some(CapturePhase::Registering),
            (CapturePhase::Registering, ArtifactRegistered) => Some(CapturePhase::CoolingDown),
            (CapturePhase::CoolingDown, CooldownElapsed) => Some(CapturePhase::Idle),
            (CapturePhase::Capturing | CapturePhase::Encoding | CapturePhase::Persisting, Abort) => {
                Some(CapturePhase::Idle)
            }
            _ => None,
        }
    }

    pub fn transition(&mut self, event: CaptureEvent) -> StateResult<CapturePhase> {
        tracing::debug!(from = ?self.state, event = ?event, "request capture transition");
        let next = self.next_state(event).ok_or_else(|| {
            let from = self.state;
            tracing::warn!(from = ?from, event = ?event, "invalid capture transition requested");
            StateError::InvalidStateTransition { from, event }
        })?;

        let record = StateTransition::new(self.state, event, next);
        self.state = next;
        if self.transition_history.len() == HISTORY_LIMIT {
            self.transition_history.pop_front();
        }
        self.transition_history.push_back(record);

        Ok(self.state)
    }

    /// Most recent transitions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.transition_history.iter()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CapturePhase::{:?}", self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_successful_capture(machine: &mut StateMachine) {
        for event in [
            CaptureEvent::Start,
            CaptureEvent::FrameCaptured,
            CaptureEvent::FrameEncoded,
            CaptureEvent::ArtifactPersisted,
            CaptureEvent::ArtifactRegistered,
            CaptureEvent::CooldownElapsed,
        ] {
            machine
                .transition(event)
                .expect("successful capture path should transition");
        }
    }

    #[test]
    fn successful_capture_walks_every_phase_forward() {
        let mut machine = StateMachine::new();
        run_successful_capture(&mut machine);

        let phases: Vec<_> = machine.history().map(|record| record.to).collect();
        assert_eq!(
            phases,
            vec![
                CapturePhase::Capturing,
                CapturePhase::Encoding,
                CapturePhase::Persisting,
                CapturePhase::Registering,
                CapturePhase::CoolingDown,
                CapturePhase::Idle,
            ]
        );
        assert_eq!(machine.state(), CapturePhase::Idle);
    }

    #[test]
    fn abort_is_only_allowed_before_registration() {
        let mut machine = StateMachine::new();
        assert!(!machine.can_transition(CaptureEvent::Abort));

        machine.transition(CaptureEvent::Start).unwrap();
        assert!(machine.can_transition(CaptureEvent::Abort));
        machine.transition(CaptureEvent::FrameCaptured).unwrap();
        machine.transition(CaptureEvent::FrameEncoded).unwrap();
        assert!(machine.can_transition(CaptureEvent::Abort));
        machine.transition(CaptureEvent::ArtifactPersisted).unwrap();

        assert!(!machine.can_transition(CaptureEvent::Abort));
    }

    #[test]
    fn start_is_rejected_while_busy_or_cooling_down() {
        let mut machine = StateMachine::new();
        machine.transition(CaptureEvent::Start).unwrap();

        let err = machine
            .transition(CaptureEvent::Start)
            .expect_err("second start should fail");
        assert!(matches!(
            err,
            StateError::InvalidStateTransition {
                from: CapturePhase::Capturing,
                event: CaptureEvent::Start
            }
        ));

        machine.transition(CaptureEvent::FrameCaptured).unwrap();
        machine.transition(CaptureEvent::FrameEncoded).unwrap();
        machine.transition(CaptureEvent::ArtifactPersisted).unwrap();
        machine.transition(CaptureEvent::ArtifactRegistered).unwrap();
        assert_eq!(machine.state(), CapturePhase::CoolingDown);
        assert!(!machine.can_transition(CaptureEvent::Start));
    }

    #[test]
    fn invalid_transition_does_not_mutate_history() {
        let mut machine = StateMachine::new();

        let _ = machine
            .transition(CaptureEvent::CooldownElapsed)
            .expect_err("idle cannot finish a cooldown");

        assert_eq!(machine.state(), CapturePhase::Idle);
        assert_eq!(machine.history().count(), 0);
    }

    #[test]
    fn history_is_bounded() {
        let mut machine = StateMachine::new();
        for _ in 0..HISTORY_LIMIT {
            run_successful_capture(&mut machine);
        }

        assert_eq!(machine.history().count(), HISTORY_LIMIT);
        assert_eq!(
            machine.history().last().copied(),
            Some(StateTransition::new(
                CapturePhase::CoolingDown,
                CaptureEvent::CooldownElapsed,
                CapturePhase::Idle
            ))
        );
    }
}
