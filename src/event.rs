//! Server event system.

use tokio::sync::broadcast;

/// Events emitted by a running server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Server is listening.
    Started {
        /// Bound address.
        addr: std::net::SocketAddr,
    },

    /// Server is shutting down.
    ShuttingDown,

    /// A request without proof received a 402 challenge.
    ChallengeIssued {
        /// Route path.
        path: String,
        /// Quoted atomic amount.
        amount: String,
    },

    /// A proof verified and the resource was released.
    PaymentAccepted {
        /// Route path.
        path: String,
        /// Transaction signature.
        signature: String,
        /// Amount observed on the ledger.
        amount: String,
    },

    /// A proof failed verification.
    PaymentRejected {
        /// Route path.
        path: String,
        /// Verdict reason.
        reason: String,
    },

    /// The proof header could not be parsed.
    MalformedProof {
        /// Route path.
        path: String,
    },
}

/// Channel for receiving server events.
pub type ServerEventsChannel = broadcast::Receiver<ServerEvent>;

/// Sender for server events.
pub type ServerEventsSender = broadcast::Sender<ServerEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (ServerEventsSender, ServerEventsChannel) {
    broadcast::channel(256)
}
