//! Two-phase rekey control protocol (spec §4.3): in-band JSON control
//! frames carried over the already-encrypted data channel, and the
//! coordinator/follower state machines that drive a rekey from an
//! external request or a sender's sequence-threshold trigger through to
//! an atomic context swap.

#![forbid(unsafe_code)]

use pqtun_core::error::Error;
use pqtun_core::types::{Role, SuiteId};
use serde::{Deserialize, Serialize};

/// Leading byte distinguishing application data from control frames when
/// `ENABLE_PACKET_TYPE` is on (spec §4.3.2); mandatory for control.
pub const PACKET_TYPE_DATA: u8 = 0x01;
pub const PACKET_TYPE_CONTROL: u8 = 0x02;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    PrepareRekey { rid: String, suite: SuiteId },
    PrepareOk { rid: String },
    PrepareFail { rid: String, reason: String },
    CommitRekey { rid: String },
    RekeyStatus { rid: String, ok: bool },
}

impl ControlFrame {
    pub fn rid(&self) -> &str {
        match self {
            ControlFrame::PrepareRekey { rid, .. }
            | ControlFrame::PrepareOk { rid }
            | ControlFrame::PrepareFail { rid, .. }
            | ControlFrame::CommitRekey { rid }
            | ControlFrame::RekeyStatus { rid, .. } => rid,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(body: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(body)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlPhase {
    Idle,
    Negotiating,
    Committing,
    Swapping,
}

/// What the caller (the relay loop) should do in reaction to a state
/// transition. The state machine itself never touches sockets or spawns
/// tasks — it only decides what ought to happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// Frames to encrypt and send on the data path.
    Send(Vec<ControlFrame>),
    /// Begin a coordinator-side rekey handshake attempt using this suite.
    BeginCoordinatorHandshake(SuiteId),
    /// Begin accepting a follower-side rekey handshake.
    BeginFollowerHandshake,
    /// Nothing to do — a duplicate `rid`, an out-of-phase frame, or a
    /// frame meant for the other role (spec §4.3.6's idempotence rule).
    None,
}

/// Serializable view of [`ControlState`], consumed by the process control
/// endpoint's `status` command and the status file writer (SPEC_FULL
/// §4.3).
#[derive(Debug, Clone, Serialize)]
pub struct ControlSnapshot {
    pub role: Role,
    pub coordinator_role: Role,
    pub phase: ControlPhase,
    pub current_suite: SuiteId,
    pub pending_suite: Option<SuiteId>,
    pub request_id: Option<String>,
}

/// Per-endpoint control state (spec §3.5). One instance lives for the
/// process lifetime; `current_suite` is updated in place on every
/// successful rekey.
pub struct ControlState {
    role: Role,
    coordinator_role: Role,
    phase: ControlPhase,
    current_suite: SuiteId,
    pending_suite: Option<SuiteId>,
    request_id: Option<String>,
}

impl ControlState {
    pub fn new(role: Role, coordinator_role: Role, current_suite: SuiteId) -> Self {
        Self {
            role,
            coordinator_role,
            phase: ControlPhase::Idle,
            current_suite,
            pending_suite: None,
            request_id: None,
        }
    }

    pub fn is_coordinator(&self) -> bool {
        self.role == self.coordinator_role
    }

    pub fn phase(&self) -> ControlPhase {
        self.phase
    }

    pub fn current_suite(&self) -> &SuiteId {
        &self.current_suite
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            role: self.role,
            coordinator_role: self.coordinator_role,
            phase: self.phase,
            current_suite: self.current_suite.clone(),
            pending_suite: self.pending_suite.clone(),
            request_id: self.request_id.clone(),
        }
    }

    /// Originate a rekey (spec §4.3.1: external request, or the sender
    /// hitting `rekey_threshold`). Only the coordinator may call this;
    /// a concurrent request while not idle is rejected as `busy`.
    pub fn request_rekey(&mut self, rid: String, suite: SuiteId) -> Result<ControlAction, Error> {
        if !self.is_coordinator() {
            return Err(Error::protocol("only the coordinator role may originate a rekey"));
        }
        if self.phase != ControlPhase::Idle {
            return Err(Error::protocol("busy"));
        }
        self.pending_suite = Some(suite.clone());
        self.request_id = Some(rid.clone());
        self.phase = ControlPhase::Negotiating;
        Ok(ControlAction::Send(vec![ControlFrame::PrepareRekey { rid, suite }]))
    }

    /// React to a decrypted, parsed inbound control frame (spec §4.3.3,
    /// §4.3.4). Duplicate `rid` delivery in the same phase is a no-op.
    pub fn handle_frame(&mut self, frame: ControlFrame) -> ControlAction {
        match frame {
            ControlFrame::PrepareRekey { rid, suite } => self.on_prepare_rekey(rid, suite),
            ControlFrame::PrepareOk { rid } => self.on_prepare_ok(rid),
            ControlFrame::PrepareFail { rid, reason } => self.on_prepare_fail(rid, reason),
            ControlFrame::CommitRekey { rid } => self.on_commit_rekey(rid),
            ControlFrame::RekeyStatus { rid, ok } => self.on_rekey_status(rid, ok),
        }
    }

    fn on_prepare_rekey(&mut self, rid: String, suite: SuiteId) -> ControlAction {
        if self.is_coordinator() {
            return ControlAction::None;
        }
        if self.phase != ControlPhase::Idle {
            if self.request_id.as_deref() == Some(rid.as_str()) {
                return ControlAction::None;
            }
            return ControlAction::Send(vec![ControlFrame::PrepareFail { rid, reason: "busy".into() }]);
        }
        self.pending_suite = Some(suite);
        self.request_id = Some(rid.clone());
        self.phase = ControlPhase::Committing;
        ControlAction::Send(vec![ControlFrame::PrepareOk { rid }])
    }

    fn on_prepare_ok(&mut self, rid: String) -> ControlAction {
        if !self.is_coordinator() || self.phase != ControlPhase::Negotiating {
            return ControlAction::None;
        }
        if self.request_id.as_deref() != Some(rid.as_str()) {
            return ControlAction::None;
        }
        self.phase = ControlPhase::Committing;
        ControlAction::Send(vec![ControlFrame::CommitRekey { rid }])
    }

    fn on_prepare_fail(&mut self, rid: String, _reason: String) -> ControlAction {
        if !self.is_coordinator() || self.phase != ControlPhase::Negotiating {
            return ControlAction::None;
        }
        if self.request_id.as_deref() != Some(rid.as_str()) {
            return ControlAction::None;
        }
        self.reset_to_idle();
        ControlAction::None
    }

    fn on_commit_rekey(&mut self, rid: String) -> ControlAction {
        if self.is_coordinator() || self.phase != ControlPhase::Committing {
            return ControlAction::None;
        }
        if self.request_id.as_deref() != Some(rid.as_str()) {
            return ControlAction::None;
        }
        ControlAction::BeginFollowerHandshake
    }

    fn on_rekey_status(&mut self, rid: String, _ok: bool) -> ControlAction {
        if self.request_id.as_deref() == Some(rid.as_str()) {
            self.reset_to_idle();
        }
        ControlAction::None
    }

    /// Coordinator side of spec §4.3.3's `committing` state: called once
    /// `prepare_ok` has moved the phase to `Committing`, returning the
    /// suite to hand the background handshake task.
    pub fn begin_coordinator_handshake(&mut self) -> Option<SuiteId> {
        if self.is_coordinator() && self.phase == ControlPhase::Committing {
            self.phase = ControlPhase::Swapping;
            self.pending_suite.clone()
        } else {
            None
        }
    }

    /// Record a successful atomic context swap, updating `current_suite`
    /// and returning to `idle`. The coordinator additionally notifies the
    /// follower.
    pub fn record_rekey_success(&mut self, new_suite: SuiteId) -> ControlAction {
        let rid = self.request_id.clone().unwrap_or_default();
        self.current_suite = new_suite;
        self.reset_to_idle();
        if self.is_coordinator() {
            ControlAction::Send(vec![ControlFrame::RekeyStatus { rid, ok: true }])
        } else {
            ControlAction::None
        }
    }

    /// Record a failed rekey attempt (spec §4.3.3/§4.3.4): the existing
    /// session remains active, and the coordinator notifies the follower.
    pub fn record_rekey_failure(&mut self) -> ControlAction {
        let rid = self.request_id.clone().unwrap_or_default();
        self.reset_to_idle();
        if self.is_coordinator() {
            ControlAction::Send(vec![ControlFrame::RekeyStatus { rid, ok: false }])
        } else {
            ControlAction::None
        }
    }

    fn reset_to_idle(&mut self) {
        self.phase = ControlPhase::Idle;
        self.pending_suite = None;
        self.request_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(s: &str) -> SuiteId {
        SuiteId::from(s)
    }

    #[test]
    fn coordinator_happy_path_drives_full_rekey() {
        let mut coord = ControlState::new(Role::Gcs, Role::Gcs, suite("cs-a"));
        let action = coord.request_rekey("r1".into(), suite("cs-b")).unwrap();
        assert_eq!(action, ControlAction::Send(vec![ControlFrame::PrepareRekey { rid: "r1".into(), suite: suite("cs-b") }]));
        assert_eq!(coord.phase(), ControlPhase::Negotiating);

        let action = coord.handle_frame(ControlFrame::PrepareOk { rid: "r1".into() });
        assert_eq!(action, ControlAction::Send(vec![ControlFrame::CommitRekey { rid: "r1".into() }]));
        assert_eq!(coord.phase(), ControlPhase::Committing);

        let to_run = coord.begin_coordinator_handshake().unwrap();
        assert_eq!(to_run, suite("cs-b"));
        assert_eq!(coord.phase(), ControlPhase::Swapping);

        let action = coord.record_rekey_success(suite("cs-b"));
        assert_eq!(action, ControlAction::Send(vec![ControlFrame::RekeyStatus { rid: "r1".into(), ok: true }]));
        assert_eq!(coord.phase(), ControlPhase::Idle);
        assert_eq!(coord.current_suite(), &suite("cs-b"));
    }

    #[test]
    fn prepare_fail_returns_coordinator_to_idle() {
        let mut coord = ControlState::new(Role::Gcs, Role::Gcs, suite("cs-a"));
        coord.request_rekey("r1".into(), suite("cs-b")).unwrap();
        coord.handle_frame(ControlFrame::PrepareFail { rid: "r1".into(), reason: "unsupported".into() });
        assert_eq!(coord.phase(), ControlPhase::Idle);
        assert_eq!(coord.current_suite(), &suite("cs-a"));
    }

    #[test]
    fn non_coordinator_cannot_originate_a_rekey() {
        let mut follower = ControlState::new(Role::Drone, Role::Gcs, suite("cs-a"));
        assert!(follower.request_rekey("r1".into(), suite("cs-b")).is_err());
    }

    #[test]
    fn concurrent_request_while_busy_is_rejected() {
        let mut coord = ControlState::new(Role::Gcs, Role::Gcs, suite("cs-a"));
        coord.request_rekey("r1".into(), suite("cs-b")).unwrap();
        assert!(coord.request_rekey("r2".into(), suite("cs-c")).is_err());
    }

    #[test]
    fn follower_accepts_prepare_rekey_then_begins_handshake_on_commit() {
        let mut follower = ControlState::new(Role::Drone, Role::Gcs, suite("cs-a"));
        let action = follower.handle_frame(ControlFrame::PrepareRekey { rid: "r1".into(), suite: suite("cs-b") });
        assert_eq!(action, ControlAction::Send(vec![ControlFrame::PrepareOk { rid: "r1".into() }]));
        assert_eq!(follower.phase(), ControlPhase::Committing);

        let action = follower.handle_frame(ControlFrame::CommitRekey { rid: "r1".into() });
        assert_eq!(action, ControlAction::BeginFollowerHandshake);
    }

    #[test]
    fn duplicate_rid_prepare_rekey_in_same_phase_is_ignored() {
        let mut follower = ControlState::new(Role::Drone, Role::Gcs, suite("cs-a"));
        follower.handle_frame(ControlFrame::PrepareRekey { rid: "r1".into(), suite: suite("cs-b") });
        let action = follower.handle_frame(ControlFrame::PrepareRekey { rid: "r1".into(), suite: suite("cs-b") });
        assert_eq!(action, ControlAction::None);
    }

    #[test]
    fn a_second_distinct_rekey_request_while_busy_gets_prepare_fail() {
        let mut follower = ControlState::new(Role::Drone, Role::Gcs, suite("cs-a"));
        follower.handle_frame(ControlFrame::PrepareRekey { rid: "r1".into(), suite: suite("cs-b") });
        let action = follower.handle_frame(ControlFrame::PrepareRekey { rid: "r2".into(), suite: suite("cs-c") });
        assert_eq!(action, ControlAction::Send(vec![ControlFrame::PrepareFail { rid: "r2".into(), reason: "busy".into() }]));
    }

    #[test]
    fn control_frame_round_trips_through_json() {
        let frame = ControlFrame::PrepareRekey { rid: "abc".into(), suite: suite("cs-x") };
        let encoded = frame.encode().unwrap();
        assert_eq!(ControlFrame::decode(&encoded).unwrap(), frame);
    }
}
