//! Supervisor ↔ worker control channel.
//!
//! # Data Flow
//! ```text
//! Supervisor ──ControlMessage──▶ Worker   (broadcast, FIFO per worker, no ack)
//! Supervisor ◀──WorkerSignal──── Worker   (readiness, exactly once)
//! ```
//!
//! The channel is an mpsc queue in-process; across processes the same
//! schema travels as JSON lines over the worker's stdin/stdout (stdio.rs).

pub mod message;
pub mod stdio;

use tokio::sync::{mpsc, oneshot};

pub use message::{ControlMessage, WorkerSignal};

/// Worker-side receiving end of the control channel.
pub type ControlReceiver = mpsc::UnboundedReceiver<ControlMessage>;

/// Supervisor-side sending end of the control channel.
pub type ControlSender = mpsc::UnboundedSender<ControlMessage>;

/// One-shot readiness handshake.
///
/// Consumed by [`ReadinessSignal::send`], so a worker can report ready at
/// most once per lifetime.
#[derive(Debug)]
pub struct ReadinessSignal {
    tx: oneshot::Sender<()>,
}

impl ReadinessSignal {
    /// Create a signal and the receiver that observes it.
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Report readiness upstream.
    pub fn send(self) {
        let _ = self.tx.send(());
    }
}
