//! Pairing handshake
//!
//! Two devices establish trust by exchanging ephemeral X25519 keys inside
//! Ed25519-signed, timestamped messages:
//!
//! ```text
//!   Initiator                              Responder
//!   ─────────                              ─────────
//!   PAIR_REQUEST {ecdh_i, sigpk_i, ts, sig}  ──►  verify ts + sig
//!                                                 ask PairingPolicy
//!                                                 K = SHA-256(X25519(r, ecdh_i))
//!                                                 store peer (paired)
//!   verify ts + sig  ◄──  PAIR_RESPONSE {ecdh_r, sigpk_r, accepted, ts, sig}
//!   K = SHA-256(X25519(i, ecdh_r))
//!   store peer (paired)
//! ```
//!
//! Either side may send `PAIR_CANCEL` before completion. Signer keys are
//! trusted on first use.

mod engine;
pub mod messages;
pub mod policy;
mod session;

pub use engine::{PairingEngine, PairingTarget, RequestOutcome, ResponseOutcome};
pub use messages::{PairingCancel, PairingRequest, PairingResponse, SignedMessage};
pub use policy::{AutoAccept, AutoReject, ChannelPolicy, PairingPolicy, PairingPrompt, PendingDecision};
pub use session::{PairingSession, Role, SessionInfo};
