//! Secure messaging channel
//!
//! Encrypted, signed request/response calls between paired peers, and chat
//! delivery built on top of them.

pub mod chat;
mod client;
pub mod envelope;
mod responder;

pub use chat::{
    Attachment, ChatContent, ChatMessage, ChatReceiver, ChatSender, MemoryMessageStore,
    MessageStore,
};
pub use client::{PeerRpcClient, ensure_lan, peer_http_client};
pub use envelope::{RpcRequest, RpcResponse, peer_endpoint};
pub use responder::{PeerRpcResponder, RpcHandler};
