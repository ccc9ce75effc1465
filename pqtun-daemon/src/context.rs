//! The "active context" (spec §4.3.5, §5): the `(Sender, Receiver,
//! session_id, peer_addr, suite)` tuple a rekey swaps out atomically.
//! Held behind a single `tokio::sync::Mutex`, matching spec §5's "single
//! reentrant lock" — never held across network I/O. Rekey workers build
//! the replacement context outside the lock and acquire it only for the
//! swap itself.

use pqtun_core::suites::Suite;
use pqtun_stream::{Receiver, Sender};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct ActiveContext {
    pub sender: Sender,
    pub receiver: Receiver,
    pub session_id: [u8; 8],
    pub enc_peer: SocketAddr,
    pub suite: Suite,
}

/// Cheaply cloneable handle shared between the relay loop and any
/// in-flight rekey task.
#[derive(Clone)]
pub struct SharedContext(Arc<Mutex<ActiveContext>>);

impl SharedContext {
    pub fn new(initial: ActiveContext) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ActiveContext> {
        self.0.lock().await
    }

    /// Replace the context wholesale. Called once a rekey's new
    /// `Sender`/`Receiver` pair has been built outside the lock.
    pub async fn swap(&self, new_ctx: ActiveContext) {
        let mut guard = self.0.lock().await;
        *guard = new_ctx;
    }

    pub async fn session_id(&self) -> [u8; 8] {
        self.0.lock().await.session_id
    }

    pub async fn suite_id(&self) -> pqtun_core::types::SuiteId {
        self.0.lock().await.suite.suite_id.clone()
    }
}
