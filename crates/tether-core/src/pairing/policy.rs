//! Accept/decline decisions for incoming pairing requests.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// What the user is asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingPrompt {
    /// Requesting device id
    pub peer_id: String,
    /// Requesting device name
    pub peer_name: String,
    /// Requesting device type
    pub device_type: String,
    /// Source of the request
    pub address: SocketAddr,
}

/// Decides whether a verified pairing request is accepted.
#[async_trait]
pub trait PairingPolicy: Send + Sync {
    /// Return `true` to accept. May wait for user input.
    async fn decide(&self, prompt: &PairingPrompt) -> bool;
}

/// Accepts every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoAccept;

#[async_trait]
impl PairingPolicy for AutoAccept {
    async fn decide(&self, _prompt: &PairingPrompt) -> bool {
        true
    }
}

/// Declines every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoReject;

#[async_trait]
impl PairingPolicy for AutoReject {
    async fn decide(&self, _prompt: &PairingPrompt) -> bool {
        false
    }
}

/// A prompt waiting for an answer from the UI.
#[derive(Debug)]
pub struct PendingDecision {
    /// The request being decided
    pub prompt: PairingPrompt,
    reply: oneshot::Sender<bool>,
}

impl PendingDecision {
    /// Accept the request.
    pub fn accept(self) {
        let _ = self.reply.send(true);
    }

    /// Decline the request.
    pub fn decline(self) {
        let _ = self.reply.send(false);
    }
}

/// Forwards prompts over a channel and waits for the answer.
///
/// No answer within `timeout`, or a dropped [`PendingDecision`], declines.
#[derive(Debug, Clone)]
pub struct ChannelPolicy {
    prompts: mpsc::Sender<PendingDecision>,
    timeout: Duration,
}

impl ChannelPolicy {
    /// Create a policy and the receiver the UI reads prompts from.
    #[must_use]
    pub fn new(capacity: usize, timeout: Duration) -> (Self, mpsc::Receiver<PendingDecision>) {
        let (prompts, rx) = mpsc::channel(capacity.max(1));
        (Self { prompts, timeout }, rx)
    }
}

#[async_trait]
impl PairingPolicy for ChannelPolicy {
    async fn decide(&self, prompt: &PairingPrompt) -> bool {
        let (reply, answer) = oneshot::channel();
        let pending = PendingDecision {
            prompt: prompt.clone(),
            reply,
        };
        if self.prompts.send(pending).await.is_err() {
            tracing::debug!(peer_id = %prompt.peer_id, "no pairing prompt receiver");
            return false;
        }
        match tokio::time::timeout(self.timeout, answer).await {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::info!(peer_id = %prompt.peer_id, "pairing prompt timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> PairingPrompt {
        PairingPrompt {
            peer_id: "peer".into(),
            peer_name: "Phone".into(),
            device_type: "phone".into(),
            address: "192.168.1.5:52353".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_fixed_policies() {
        assert!(AutoAccept.decide(&prompt()).await);
        assert!(!AutoReject.decide(&prompt()).await);
    }

    #[tokio::test]
    async fn test_channel_policy_forwards_answer() {
        let (policy, mut rx) = ChannelPolicy::new(4, Duration::from_secs(5));
        let ui = tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            assert_eq!(pending.prompt.peer_name, "Phone");
            pending.accept();
        });
        assert!(policy.decide(&prompt()).await);
        ui.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_policy_declines_on_drop() {
        let (policy, mut rx) = ChannelPolicy::new(4, Duration::from_secs(5));
        tokio::spawn(async move {
            drop(rx.recv().await);
        });
        assert!(!policy.decide(&prompt()).await);
    }

    #[tokio::test]
    async fn test_channel_policy_times_out() {
        let (policy, _rx) = ChannelPolicy::new(4, Duration::from_millis(50));
        assert!(!policy.decide(&prompt()).await);
    }
}
