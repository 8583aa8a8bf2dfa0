//! Events raised by the engines.
//!
//! The core never decides how events reach the UI. It calls an
//! [`EventSink`]; [`tokio::sync::mpsc`] senders implement it directly.

use std::net::IpAddr;
use std::path::PathBuf;
use tether_discovery::DiscoveredDevice;
use tokio::sync::mpsc;

/// Something the user or host application may want to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A discovery reply arrived
    DeviceFound(DiscoveredDevice),

    /// A valid pairing request arrived and awaits a decision
    PairingRequested {
        /// Requesting device id
        peer_id: String,
        /// Requesting device name
        peer_name: String,
        /// Source address
        ip: IpAddr,
    },

    /// Pairing finished and the record was persisted
    PairingSucceeded {
        /// Peer id
        peer_id: String,
        /// Peer name
        peer_name: String,
    },

    /// Pairing was rejected or failed verification
    PairingFailed {
        /// Peer id
        peer_id: String,
        /// Why
        reason: String,
    },

    /// Pairing was canceled by either side
    PairingCanceled {
        /// Peer id
        peer_id: String,
    },

    /// A chat message from a peer was stored
    MessageReceived {
        /// Sender id
        peer_id: String,
        /// Message id
        message_id: String,
    },

    /// Throughput sample for a running download
    TransferProgress {
        /// Transfer (file) id
        id: String,
        /// Bytes received so far
        bytes: u64,
        /// Expected total
        total: u64,
        /// Instantaneous speed in bytes/s
        speed: u64,
    },

    /// A download completed
    TransferCompleted {
        /// Transfer (file) id
        id: String,
        /// Final local path
        path: PathBuf,
    },

    /// A download failed
    TransferFailed {
        /// Transfer (file) id
        id: String,
        /// Error string retained on the task
        error: String,
    },
}

/// Receiver of core events.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Must not block.
    fn emit(&self, event: Event);
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn emit(&self, event: Event) {
        if self.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Logs every event with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        tracing::info!(?event, "event");
    }
}
