//! AEAD framing, anti-replay, and the in-band rekey control state machine
//! for the pqtun data plane (spec §4.1, §4.3).

#![forbid(unsafe_code)]

pub mod control;
pub mod header;
pub mod receiver;
pub mod replay;
pub mod sender;

pub use control::{ControlAction, ControlFrame, ControlPhase, ControlSnapshot, ControlState};
pub use header::{build_nonce, Header, HEADER_LEN};
pub use receiver::Receiver;
pub use replay::ReplayWindow;
pub use sender::Sender;
