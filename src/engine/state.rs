use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decay::DecayOutcome;
use crate::error::{FailureKind, JobGateError};
use crate::gate::DenialNotice;
use crate::ids::{JobId, UserId};
use crate::ports::TransitionEvent;
use crate::reconciler::AppliedOps;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    Join,
    Leave,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::Join => write!(f, "join"),
            TransitionKind::Leave => write!(f, "leave"),
        }
    }
}

/// States of a single join or leave transition.
///
/// Join: IDLE → EVALUATING → (DENIED | ALLOWED → DONE)
/// Leave: IDLE → PROCESSING → DONE
///
/// Any non-terminal state may end in FAILED when a collaborator call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionState {
    Idle,
    Evaluating,
    Allowed,
    Denied,
    Processing,
    Done,
    Failed,
}

impl fmt::Display for TransitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionState::Idle => write!(f, "IDLE"),
            TransitionState::Evaluating => write!(f, "EVALUATING"),
            TransitionState::Allowed => write!(f, "ALLOWED"),
            TransitionState::Denied => write!(f, "DENIED"),
            TransitionState::Processing => write!(f, "PROCESSING"),
            TransitionState::Done => write!(f, "DONE"),
            TransitionState::Failed => write!(f, "FAILED"),
        }
    }
}

impl TransitionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransitionState::Denied | TransitionState::Done | TransitionState::Failed
        )
    }

    /// Whether `self → next` is a legal step for a transition of `kind`.
    pub fn can_advance_to(self, next: TransitionState, kind: TransitionKind) -> bool {
        use TransitionState::*;
        match (kind, self, next) {
            (_, s, Failed) => !s.is_terminal(),
            (TransitionKind::Join, Idle, Evaluating) => true,
            (TransitionKind::Join, Evaluating, Allowed | Denied) => true,
            (TransitionKind::Join, Allowed, Done) => true,
            (TransitionKind::Leave, Idle, Processing) => true,
            (TransitionKind::Leave, Processing, Done) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Audit record of one processed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: String,
    pub user: UserId,
    pub job: JobId,
    pub kind: TransitionKind,
    pub state: TransitionState,
    pub state_history: Vec<TransitionState>,
    /// Level threshold of the bundle granted on join.
    pub resolved_level: Option<u32>,
    pub applied: AppliedOps,
    pub decay: Option<DecayOutcome>,
    pub denial: Option<DenialNotice>,
    pub failure: Option<TransitionFailure>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
}

impl TransitionRecord {
    pub fn new(event: &TransitionEvent) -> Self {
        let kind = match event {
            TransitionEvent::Join { .. } => TransitionKind::Join,
            TransitionEvent::Leave { .. } => TransitionKind::Leave,
        };
        Self {
            id: Uuid::new_v4().to_string(),
            user: event.user(),
            job: event.job().clone(),
            kind,
            state: TransitionState::Idle,
            state_history: Vec::new(),
            resolved_level: None,
            applied: AppliedOps::default(),
            decay: None,
            denial: None,
            failure: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: 0,
        }
    }

    /// Moves to `next`, keeping the previous state in the history.
    pub fn advance(&mut self, next: TransitionState) {
        debug_assert!(
            self.state.can_advance_to(next, self.kind),
            "illegal {} step {} -> {}",
            self.kind,
            self.state,
            next
        );
        self.state_history.push(self.state);
        self.state = next;
        if next.is_terminal() {
            self.finish();
        }
    }

    pub fn fail(&mut self, error: &JobGateError) {
        self.failure = Some(TransitionFailure {
            kind: error.failure_kind(),
            message: error.to_string(),
        });
        self.advance(TransitionState::Failed);
    }

    pub fn is_denied(&self) -> bool {
        self.state == TransitionState::Denied
    }

    pub fn is_failed(&self) -> bool {
        self.state == TransitionState::Failed
    }

    /// Full path including the current state.
    pub fn transitions(&self) -> Vec<TransitionState> {
        let mut path = self.state_history.clone();
        path.push(self.state);
        path
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_ms = (now - self.started_at).num_milliseconds();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join_event() -> TransitionEvent {
        TransitionEvent::Join {
            user: UserId::new_v4(),
            job: JobId::from("miner"),
        }
    }

    #[test]
    fn join_happy_path_is_legal() {
        use TransitionState::*;
        let k = TransitionKind::Join;
        assert!(Idle.can_advance_to(Evaluating, k));
        assert!(Evaluating.can_advance_to(Allowed, k));
        assert!(Evaluating.can_advance_to(Denied, k));
        assert!(Allowed.can_advance_to(Done, k));
    }

    #[test]
    fn leave_path_is_legal() {
        use TransitionState::*;
        let k = TransitionKind::Leave;
        assert!(Idle.can_advance_to(Processing, k));
        assert!(Processing.can_advance_to(Done, k));
        assert!(!Idle.can_advance_to(Evaluating, k));
    }

    #[test]
    fn terminal_states_do_not_advance() {
        use TransitionState::*;
        for terminal in [Denied, Done, Failed] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_advance_to(Failed, TransitionKind::Join));
            assert!(!terminal.can_advance_to(Done, TransitionKind::Join));
        }
        assert!(!Denied.can_advance_to(Allowed, TransitionKind::Join));
    }

    #[test]
    fn record_tracks_history_and_completion() {
        let mut record = TransitionRecord::new(&join_event());
        assert_eq!(record.kind, TransitionKind::Join);
        assert!(record.completed_at.is_none());

        record.advance(TransitionState::Evaluating);
        record.advance(TransitionState::Allowed);
        record.advance(TransitionState::Done);

        assert_eq!(
            record.transitions(),
            vec![
                TransitionState::Idle,
                TransitionState::Evaluating,
                TransitionState::Allowed,
                TransitionState::Done
            ]
        );
        assert!(record.completed_at.is_some());
        assert!(record.duration_ms >= 0);
    }

    #[test]
    fn fail_records_reason() {
        let mut record = TransitionRecord::new(&join_event());
        record.advance(TransitionState::Evaluating);
        record.fail(&JobGateError::UserOffline(record.user));

        assert!(record.is_failed());
        let failure = record.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Offline);
        assert!(failure.message.contains("offline"));
    }

    #[test]
    fn state_display() {
        assert_eq!(TransitionState::Evaluating.to_string(), "EVALUATING");
        assert_eq!(TransitionState::Denied.to_string(), "DENIED");
        assert_eq!(TransitionKind::Leave.to_string(), "leave");
    }

    #[test]
    fn record_serialization_roundtrip() {
        let record = TransitionRecord::new(&join_event());
        let json = serde_json::to_string(&record).unwrap();
        let back: TransitionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.job, JobId::from("miner"));
        assert_eq!(back.state, TransitionState::Idle);
    }
}
