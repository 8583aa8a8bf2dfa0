//! The pairing state machine.

use super::messages::{PairingCancel, PairingRequest, PairingResponse, SignedMessage};
use super::policy::{PairingPolicy, PairingPrompt};
use super::session::{PairingSession, Role, SessionInfo};
use crate::config::PairingConfig;
use crate::context::DeviceContext;
use crate::error::Result;
use crate::events::{Event, EventSink};
use crate::store::{PairingState, PeerRecord, PeerStore};
use dashmap::DashMap;
use rand_core::OsRng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tether_crypto::agreement::{self, PrivateKey, PublicKey};
use tether_crypto::signatures::VerifyingKey;
use tether_crypto::verify::now_millis;
use tether_discovery::DiscoveredDevice;
use tether_transport::{Packet, PacketType, Transport, packet};
use tracing::{debug, info, warn};

/// A device to pair with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingTarget {
    /// Device id
    pub id: String,
    /// Device name
    pub name: String,
    /// Unicast address the request is sent to
    pub address: SocketAddr,
}

impl From<&DiscoveredDevice> for PairingTarget {
    fn from(device: &DiscoveredDevice) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
            address: device.address,
        }
    }
}

/// What happened to an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Failed timestamp or signature checks; nothing was stored or sent
    Rejected,
    /// Canceled while the decision was pending; nothing was sent
    Canceled,
    /// Declined by policy; a signed refusal was sent
    Declined,
    /// Accepted; the peer was stored and a signed acceptance was sent
    Accepted,
}

/// What happened to an incoming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Not for us, or no matching session
    Ignored,
    /// Failed verification
    Rejected,
    /// The peer declined
    Declined,
    /// The peer accepted and was stored
    Paired,
}

/// Runs both sides of the pairing handshake.
pub struct PairingEngine {
    ctx: Arc<DeviceContext>,
    config: PairingConfig,
    store: Arc<dyn PeerStore>,
    events: Arc<dyn EventSink>,
    policy: Arc<dyn PairingPolicy>,
    transport: Arc<dyn Transport>,
    sessions: DashMap<String, PairingSession>,
    next_serial: AtomicU64,
}

impl PairingEngine {
    /// Create an engine sending through `transport`.
    #[must_use]
    pub fn new(
        ctx: Arc<DeviceContext>,
        config: PairingConfig,
        store: Arc<dyn PeerStore>,
        events: Arc<dyn EventSink>,
        policy: Arc<dyn PairingPolicy>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            ctx,
            config,
            store,
            events,
            policy,
            transport,
            sessions: DashMap::new(),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Sessions currently in flight.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(|s| SessionInfo::from(s.value())).collect()
    }

    /// Whether a session exists for `device_id`.
    #[must_use]
    pub fn has_session(&self, device_id: &str) -> bool {
        self.sessions.contains_key(device_id)
    }

    fn start_session(&self, session: PairingSession) {
        if let Some(previous) = self.sessions.insert(session.device_id.clone(), session) {
            warn!(
                peer_id = %previous.device_id,
                role = ?previous.role,
                "replacing in-flight pairing session"
            );
        }
    }

    fn serial(&self) -> u64 {
        self.next_serial.fetch_add(1, Ordering::Relaxed)
    }

    async fn send<T: serde::Serialize>(
        &self,
        kind: PacketType,
        message: &T,
        to: SocketAddr,
    ) -> Result<()> {
        let bytes = packet::encode(kind, message)?;
        self.transport.send_to(&bytes, to).await?;
        Ok(())
    }

    fn fail(&self, peer_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(peer_id, %reason, "pairing failed");
        self.events.emit(Event::PairingFailed {
            peer_id: peer_id.to_owned(),
            reason,
        });
    }

    /// Derive the pairing key and store `record` as paired.
    fn persist_paired(
        &self,
        mut record: PeerRecord,
        local: &PrivateKey,
        remote_ecdh: &PublicKey,
        signature_public_key: VerifyingKey,
    ) -> Result<()> {
        let symmetric_key = agreement::agree(local, remote_ecdh)?;
        record.pairing = PairingState::Paired {
            symmetric_key,
            signature_public_key,
        };
        let (peer_id, peer_name) = (record.id.clone(), record.name.clone());
        self.store.upsert(record)?;

        info!(%peer_id, name = %peer_name, "paired");
        self.events.emit(Event::PairingSucceeded { peer_id, peer_name });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Initiator
    // ------------------------------------------------------------------

    /// Send a signed pairing request to `target`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request cannot be sent; the session is
    /// discarded in that case.
    pub async fn initiate(&self, target: PairingTarget) -> Result<()> {
        let private_key = PrivateKey::generate(&mut OsRng);
        let request = PairingRequest::new(&self.ctx, &private_key.public_key(), now_millis());

        self.start_session(PairingSession::new(
            target.id.clone(),
            target.name.clone(),
            target.address,
            private_key,
            Role::Initiator,
            self.serial(),
        ));

        if let Err(e) = self
            .send(PacketType::PairRequest, &request, target.address)
            .await
        {
            self.sessions.remove(&target.id);
            return Err(e);
        }
        info!(peer_id = %target.id, address = %target.address, "pairing request sent");
        Ok(())
    }

    /// Complete a handshake we initiated.
    ///
    /// # Errors
    ///
    /// Returns an error if the paired record cannot be stored.
    pub async fn handle_response(
        &self,
        response: &PairingResponse,
        from: SocketAddr,
    ) -> Result<ResponseOutcome> {
        if response.to_id != self.ctx.id() {
            debug!(%from, to_id = %response.to_id, "pairing response for another device");
            return Ok(ResponseOutcome::Ignored);
        }
        let expected = self
            .sessions
            .get(&response.from_id)
            .is_some_and(|s| s.role == Role::Initiator);
        if !expected {
            debug!(%from, peer_id = %response.from_id, "pairing response without session");
            return Ok(ResponseOutcome::Ignored);
        }

        let verification = response.verify(now_millis(), self.config.timestamp_tolerance);
        if !verification.is_valid() {
            self.fail(&response.from_id, verification.reason());
            return Ok(ResponseOutcome::Rejected);
        }

        let Some((_, session)) = self
            .sessions
            .remove_if(&response.from_id, |_, s| s.role == Role::Initiator)
        else {
            return Ok(ResponseOutcome::Ignored);
        };

        if !response.accepted {
            self.fail(&response.from_id, "declined by peer");
            return Ok(ResponseOutcome::Declined);
        }

        let keys = PublicKey::from_base64(&response.ecdh_public_key).and_then(|ecdh| {
            VerifyingKey::from_base64(&response.signature_public_key).map(|sig| (ecdh, sig))
        });
        let (remote_ecdh, signature_key) = match keys {
            Ok(keys) => keys,
            Err(e) => {
                self.fail(&response.from_id, e.to_string());
                return Ok(ResponseOutcome::Rejected);
            }
        };

        let record = unpaired_record(
            &response.from_id,
            &session.device_name,
            from,
            response.port,
            &response.device_type,
        );
        if let Err(e) =
            self.persist_paired(record, &session.private_key, &remote_ecdh, signature_key)
        {
            self.fail(&response.from_id, e.to_string());
            return Err(e);
        }
        Ok(ResponseOutcome::Paired)
    }

    // ------------------------------------------------------------------
    // Responder
    // ------------------------------------------------------------------

    /// Verify, decide and answer an incoming request.
    ///
    /// Awaits the [`PairingPolicy`], so callers should run this on its own task.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored or the reply cannot be sent.
    pub async fn handle_request(
        &self,
        request: &PairingRequest,
        from: SocketAddr,
    ) -> Result<RequestOutcome> {
        let verification = request.verify(now_millis(), self.config.timestamp_tolerance);
        if !verification.is_valid() {
            self.fail(&request.from_id, verification.reason());
            return Ok(RequestOutcome::Rejected);
        }
        let remote_ecdh = match PublicKey::from_base64(&request.ecdh_public_key) {
            Ok(key) => key,
            Err(e) => {
                self.fail(&request.from_id, e.to_string());
                return Ok(RequestOutcome::Rejected);
            }
        };
        let signature_key = VerifyingKey::from_base64(&request.signature_public_key)?;

        let serial = self.serial();
        self.start_session(PairingSession::new(
            request.from_id.clone(),
            request.from_name.clone(),
            from,
            PrivateKey::generate(&mut OsRng),
            Role::Responder,
            serial,
        ));
        self.events.emit(Event::PairingRequested {
            peer_id: request.from_id.clone(),
            peer_name: request.from_name.clone(),
            ip: from.ip(),
        });

        let prompt = PairingPrompt {
            peer_id: request.from_id.clone(),
            peer_name: request.from_name.clone(),
            device_type: request.device_type.clone(),
            address: from,
        };
        let accepted = self.policy.decide(&prompt).await;

        let Some((_, session)) = self
            .sessions
            .remove_if(&request.from_id, |_, s| s.serial == serial)
        else {
            debug!(peer_id = %request.from_id, "pairing canceled before decision");
            return Ok(RequestOutcome::Canceled);
        };

        if !accepted {
            let response = PairingResponse::decline(&self.ctx, &request.from_id, now_millis());
            self.send(PacketType::PairResponse, &response, from).await?;
            self.fail(&request.from_id, "declined");
            return Ok(RequestOutcome::Declined);
        }

        let record = unpaired_record(
            &request.from_id,
            &request.from_name,
            from,
            request.port,
            &request.device_type,
        );
        self.persist_paired(record, &session.private_key, &remote_ecdh, signature_key)?;

        let response = PairingResponse::accept(
            &self.ctx,
            &request.from_id,
            &session.private_key.public_key(),
            now_millis(),
        );
        self.send(PacketType::PairResponse, &response, from).await?;
        Ok(RequestOutcome::Accepted)
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// Abort the handshake with `peer_id` and tell the peer.
    ///
    /// Returns whether a session existed.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the cancel message cannot be sent.
    pub async fn cancel(&self, peer_id: &str) -> Result<bool> {
        let Some((_, session)) = self.sessions.remove(peer_id) else {
            return Ok(false);
        };
        self.events.emit(Event::PairingCanceled {
            peer_id: peer_id.to_owned(),
        });
        let cancel = PairingCancel {
            from_id: self.ctx.id().to_owned(),
            to_id: peer_id.to_owned(),
        };
        self.send(PacketType::PairCancel, &cancel, session.address)
            .await?;
        info!(peer_id, "pairing canceled");
        Ok(true)
    }

    /// Drop the session a peer canceled. Returns whether one existed.
    pub fn handle_cancel(&self, cancel: &PairingCancel, from: SocketAddr) -> bool {
        if cancel.to_id != self.ctx.id() {
            return false;
        }
        if self.sessions.remove(&cancel.from_id).is_none() {
            debug!(%from, peer_id = %cancel.from_id, "cancel without session");
            return false;
        }
        info!(peer_id = %cancel.from_id, "pairing canceled by peer");
        self.events.emit(Event::PairingCanceled {
            peer_id: cancel.from_id.clone(),
        });
        true
    }

    /// Dispatch a decoded pairing packet.
    ///
    /// Non-pairing packets and malformed bodies are dropped.
    pub async fn handle_packet(&self, packet: &Packet, from: SocketAddr) {
        let result = match packet.kind {
            PacketType::PairRequest => match packet.parse::<PairingRequest>() {
                Ok(request) => self.handle_request(&request, from).await.map(|o| {
                    debug!(?o, "pairing request handled");
                }),
                Err(e) => {
                    debug!(%from, "dropping pairing request: {e}");
                    Ok(())
                }
            },
            PacketType::PairResponse => match packet.parse::<PairingResponse>() {
                Ok(response) => self.handle_response(&response, from).await.map(|o| {
                    debug!(?o, "pairing response handled");
                }),
                Err(e) => {
                    debug!(%from, "dropping pairing response: {e}");
                    Ok(())
                }
            },
            PacketType::PairCancel => {
                match packet.parse::<PairingCancel>() {
                    Ok(cancel) => {
                        self.handle_cancel(&cancel, from);
                    }
                    Err(e) => debug!(%from, "dropping pairing cancel: {e}"),
                }
                Ok(())
            }
            other => {
                debug!(%from, kind = %other, "not a pairing packet");
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(%from, "pairing packet handling failed: {e}");
        }
    }
}

fn unpaired_record(
    id: &str,
    name: &str,
    from: SocketAddr,
    port: u16,
    device_type: &str,
) -> PeerRecord {
    let now = now_millis();
    PeerRecord {
        id: id.to_owned(),
        name: name.to_owned(),
        ip: from.ip(),
        port,
        device_type: device_type.to_owned(),
        pairing: PairingState::Unpaired,
        created_at: now,
        updated_at: now,
    }
}

impl std::fmt::Debug for PairingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingEngine")
            .field("device_id", &self.ctx.id())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DeviceIdentity;
    use crate::pairing::policy::{AutoAccept, AutoReject, ChannelPolicy};
    use crate::store::MemoryPeerStore;
    use std::time::Duration;
    use tether_transport::MAX_DATAGRAM_SIZE;
    use tether_transport::udp_async::AsyncUdpTransport;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    struct Side {
        engine: Arc<PairingEngine>,
        ctx: Arc<DeviceContext>,
        store: Arc<MemoryPeerStore>,
        events: mpsc::UnboundedReceiver<Event>,
        addr: SocketAddr,
    }

    async fn side(name: &str, policy: Arc<dyn PairingPolicy>) -> Side {
        let transport = Arc::new(
            AsyncUdpTransport::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap())
                .await
                .unwrap(),
        );
        let addr = transport.local_addr().unwrap();
        let ctx = Arc::new(DeviceContext::new(DeviceIdentity::generate(), name, 8443));
        let store = Arc::new(MemoryPeerStore::new());
        let (tx, events) = mpsc::unbounded_channel();
        let engine = Arc::new(PairingEngine::new(
            ctx.clone(),
            PairingConfig::default(),
            store.clone(),
            Arc::new(tx),
            policy,
            transport.clone(),
        ));

        let pump = engine.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            while let Ok((n, from)) = transport.recv_from(&mut buf).await {
                if let Ok(packet) = Packet::decode(&buf[..n]) {
                    let engine = pump.clone();
                    tokio::spawn(async move { engine.handle_packet(&packet, from).await });
                }
            }
        });

        Side {
            engine,
            ctx,
            store,
            events,
            addr,
        }
    }

    fn target(side: &Side) -> PairingTarget {
        PairingTarget {
            id: side.ctx.id().to_owned(),
            name: side.ctx.name().to_owned(),
            address: side.addr,
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn next_outcome(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        loop {
            let event = next_event(rx).await;
            if !matches!(event, Event::PairingRequested { .. }) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_both_sides_derive_same_key() {
        let mut a = side("A", Arc::new(AutoAccept)).await;
        let mut b = side("B", Arc::new(AutoAccept)).await;

        a.engine.initiate(target(&b)).await.unwrap();

        assert!(matches!(
            next_event(&mut b.events).await,
            Event::PairingRequested { ref peer_name, .. } if peer_name == "A"
        ));
        assert!(matches!(next_event(&mut b.events).await, Event::PairingSucceeded { .. }));
        assert!(matches!(next_event(&mut a.events).await, Event::PairingSucceeded { .. }));

        let on_a = a.store.get(b.ctx.id()).unwrap();
        let on_b = b.store.get(a.ctx.id()).unwrap();
        let (key_a, sig_b) = on_a.paired_keys().unwrap();
        let (key_b, sig_a) = on_b.paired_keys().unwrap();
        assert!(key_a.ct_eq(key_b));
        assert_eq!(*sig_b, b.ctx.verifying_key());
        assert_eq!(*sig_a, a.ctx.verifying_key());
        assert_eq!(on_a.name, "B");
        assert_eq!(on_b.name, "A");
        assert!(!a.engine.has_session(b.ctx.id()));
        assert!(!b.engine.has_session(a.ctx.id()));
    }

    #[tokio::test]
    async fn test_declined_request_reports_failure() {
        let mut a = side("A", Arc::new(AutoAccept)).await;
        let b = side("B", Arc::new(AutoReject)).await;

        a.engine.initiate(target(&b)).await.unwrap();

        assert!(matches!(
            next_outcome(&mut a.events).await,
            Event::PairingFailed { ref reason, .. } if reason == "declined by peer"
        ));
        assert!(a.store.is_empty());
        assert!(b.store.is_empty());
        assert!(!a.engine.has_session(b.ctx.id()));
    }

    #[tokio::test]
    async fn test_stale_request_rejected_without_state() {
        let mut b = side("B", Arc::new(AutoAccept)).await;
        let ctx = DeviceContext::new(DeviceIdentity::generate(), "Old", 1);
        let ecdh = PrivateKey::generate(&mut OsRng).public_key();
        let request = PairingRequest::new(&ctx, &ecdh, now_millis() - 6 * 60 * 1000);

        let outcome = b
            .engine
            .handle_request(&request, "127.0.0.1:9".parse().unwrap())
            .await
            .unwrap();

        assert_eq!(outcome, RequestOutcome::Rejected);
        assert!(b.store.is_empty());
        assert!(b.engine.sessions().is_empty());
        assert!(matches!(
            next_event(&mut b.events).await,
            Event::PairingFailed { ref reason, .. } if reason == "timestamp outside tolerance"
        ));
    }

    #[tokio::test]
    async fn test_forged_request_rejected() {
        let b = side("B", Arc::new(AutoAccept)).await;
        let ctx = DeviceContext::new(DeviceIdentity::generate(), "Honest", 1);
        let ecdh = PrivateKey::generate(&mut OsRng).public_key();
        let mut request = PairingRequest::new(&ctx, &ecdh, now_millis());
        request.port = 9999;

        let outcome = b
            .engine
            .handle_request(&request, "127.0.0.1:9".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, RequestOutcome::Rejected);
        assert!(b.store.is_empty());
    }

    #[tokio::test]
    async fn test_response_without_session_is_ignored() {
        let mut a = side("A", Arc::new(AutoAccept)).await;
        let stranger = DeviceContext::new(DeviceIdentity::generate(), "Stranger", 1);
        let ecdh = PrivateKey::generate(&mut OsRng).public_key();
        let response = PairingResponse::accept(&stranger, a.ctx.id(), &ecdh, now_millis());

        let outcome = a
            .engine
            .handle_response(&response, "127.0.0.1:9".parse().unwrap())
            .await
            .unwrap();

        assert_eq!(outcome, ResponseOutcome::Ignored);
        assert!(a.store.is_empty());
        assert!(timeout(Duration::from_millis(100), a.events.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_response_for_other_device_is_ignored() {
        let a = side("A", Arc::new(AutoAccept)).await;
        let b = side("B", Arc::new(AutoAccept)).await;
        // session exists but the response names someone else
        a.engine.start_session(PairingSession::new(
            b.ctx.id(),
            "B",
            b.addr,
            PrivateKey::generate(&mut OsRng),
            Role::Initiator,
            0,
        ));
        let ecdh = PrivateKey::generate(&mut OsRng).public_key();
        let response = PairingResponse::accept(&b.ctx, "someone-else", &ecdh, now_millis());

        let outcome = a.engine.handle_response(&response, b.addr).await.unwrap();
        assert_eq!(outcome, ResponseOutcome::Ignored);
        assert!(a.engine.has_session(b.ctx.id()));
    }

    #[tokio::test]
    async fn test_forged_response_keeps_session() {
        let mut a = side("A", Arc::new(AutoAccept)).await;
        let b = side("B", Arc::new(AutoAccept)).await;
        a.engine.start_session(PairingSession::new(
            b.ctx.id(),
            "B",
            b.addr,
            PrivateKey::generate(&mut OsRng),
            Role::Initiator,
            0,
        ));
        let ecdh = PrivateKey::generate(&mut OsRng).public_key();
        let mut response = PairingResponse::accept(&b.ctx, a.ctx.id(), &ecdh, now_millis());
        response.port = 1;

        let outcome = a.engine.handle_response(&response, b.addr).await.unwrap();
        assert_eq!(outcome, ResponseOutcome::Rejected);
        assert!(a.engine.has_session(b.ctx.id()));
        assert!(a.store.is_empty());
        assert!(matches!(next_event(&mut a.events).await, Event::PairingFailed { .. }));
    }

    #[tokio::test]
    async fn test_stale_response_rejected() {
        let mut a = side("A", Arc::new(AutoAccept)).await;
        let b = side("B", Arc::new(AutoAccept)).await;
        a.engine.start_session(PairingSession::new(
            b.ctx.id(),
            "B",
            b.addr,
            PrivateKey::generate(&mut OsRng),
            Role::Initiator,
            0,
        ));
        let ecdh = PrivateKey::generate(&mut OsRng).public_key();
        let response =
            PairingResponse::accept(&b.ctx, a.ctx.id(), &ecdh, now_millis() - 6 * 60 * 1000);
        // well signed, only the clock is off
        let tolerance = PairingConfig::default().timestamp_tolerance;
        assert!(response.verify(response.timestamp, tolerance).is_valid());

        let outcome = a.engine.handle_response(&response, b.addr).await.unwrap();
        assert_eq!(outcome, ResponseOutcome::Rejected);
        assert!(a.store.is_empty());
        assert!(matches!(
            next_event(&mut a.events).await,
            Event::PairingFailed { ref reason, .. } if reason == "timestamp outside tolerance"
        ));
    }

    #[tokio::test]
    async fn test_cancel_during_decision_sends_nothing() {
        let (policy, mut prompts) = ChannelPolicy::new(1, Duration::from_secs(5));
        let b = side("B", Arc::new(policy)).await;
        let mut a = side("A", Arc::new(AutoAccept)).await;

        a.engine.initiate(target(&b)).await.unwrap();
        let pending = timeout(Duration::from_secs(2), prompts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.prompt.peer_id, a.ctx.id());

        assert!(a.engine.cancel(b.ctx.id()).await.unwrap());
        assert!(matches!(next_event(&mut a.events).await, Event::PairingCanceled { .. }));

        // wait for the cancel to land on B before answering
        for _ in 0..50 {
            if !b.engine.has_session(a.ctx.id()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!b.engine.has_session(a.ctx.id()));
        pending.accept();

        assert!(timeout(Duration::from_millis(300), a.events.recv()).await.is_err());
        assert!(b.store.is_empty());
        assert!(a.store.is_empty());
    }

    #[tokio::test]
    async fn test_second_initiate_replaces_session() {
        let a = side("A", Arc::new(AutoAccept)).await;
        let unreachable = PairingTarget {
            id: "ghost".into(),
            name: "Ghost".into(),
            address: "127.0.0.1:9".parse().unwrap(),
        };
        a.engine.initiate(unreachable.clone()).await.unwrap();
        a.engine.initiate(unreachable).await.unwrap();
        assert_eq!(a.engine.sessions().len(), 1);
        assert_eq!(a.engine.sessions()[0].role, Role::Initiator);
    }

    #[tokio::test]
    async fn test_cancel_without_session() {
        let a = side("A", Arc::new(AutoAccept)).await;
        assert!(!a.engine.cancel("nobody").await.unwrap());
        let cancel = PairingCancel {
            from_id: "nobody".into(),
            to_id: a.ctx.id().to_owned(),
        };
        assert!(!a.engine.handle_cancel(&cancel, a.addr));
    }
}
