//! Nullable transports.
//!
//! - [`NullTransport`] records every outbound message instead of sending it.
//! - [`LoopbackNetwork`] connects several in-process nodes through channels,
//!   one delivery thread per attached node. Messages are serialised with the
//!   real wire envelope on the way through, so codec errors surface here too.

use cinder_consensus::{InboundHandler, PeerTransport, TransportError};
use cinder_messages::{ProposalMessage, WireMessage};
use cinder_types::NodeId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// A transport that records messages instead of sending them.
#[derive(Default)]
pub struct NullTransport {
    /// `(None, msg)` for broadcasts, `(Some(peer), msg)` for direct sends.
    sent: Mutex<Vec<(Option<NodeId>, WireMessage)>>,
    peer_count: AtomicUsize,
    fail_sends: AtomicBool,
}

impl NullTransport {
    pub fn new(peer_count: usize) -> Self {
        Self {
            peer_count: AtomicUsize::new(peer_count),
            ..Self::default()
        }
    }

    pub fn set_peer_count(&self, count: usize) {
        self.peer_count.store(count, Ordering::SeqCst);
    }

    /// Make every subsequent send or broadcast fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// All messages "sent" so far (for assertions).
    pub fn sent(&self) -> Vec<(Option<NodeId>, WireMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Only the proposal phase messages, in send order.
    pub fn sent_proposals(&self) -> Vec<(Option<NodeId>, ProposalMessage)> {
        self.sent()
            .into_iter()
            .filter_map(|(to, msg)| match msg {
                WireMessage::Proposal(p) => Some((to, p)),
                _ => None,
            })
            .collect()
    }

    pub fn reset(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl PeerTransport for NullTransport {
    fn broadcast(&self, message: &WireMessage) -> Result<usize, TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("sends disabled".to_string()));
        }
        self.sent.lock().unwrap().push((None, message.clone()));
        Ok(self.peer_count.load(Ordering::SeqCst))
    }

    fn send(&self, peer: &NodeId, message: &WireMessage) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("sends disabled".to_string()));
        }
        self.sent.lock().unwrap().push((Some(*peer), message.clone()));
        Ok(())
    }

    fn connected_peer_count(&self) -> usize {
        self.peer_count.load(Ordering::SeqCst)
    }
}

/// Decides whether a message from the first id to the second is dropped.
pub type DropFilter = dyn Fn(&NodeId, &NodeId, &WireMessage) -> bool + Send + Sync;

type Envelope = (NodeId, Vec<u8>);

#[derive(Default)]
struct Shared {
    mailboxes: Mutex<HashMap<NodeId, Sender<Envelope>>>,
    disconnected: Mutex<HashSet<NodeId>>,
    filter: Mutex<Option<Arc<DropFilter>>>,
    delivered: AtomicUsize,
    dropped: AtomicUsize,
}

impl Shared {
    fn reachable(&self, id: &NodeId) -> bool {
        !self.disconnected.lock().unwrap().contains(id)
    }

    fn is_filtered(&self, from: &NodeId, to: &NodeId, message: &WireMessage) -> bool {
        let filter = self.filter.lock().unwrap().clone();
        filter.is_some_and(|f| f(from, to, message))
    }

    /// Queue `message` for `to`. Returns whether it was queued.
    fn deliver(&self, from: &NodeId, to: &NodeId, message: &WireMessage) -> Result<bool, TransportError> {
        if !self.reachable(from) || !self.reachable(to) {
            return Err(TransportError::NotConnected(*to));
        }
        if self.is_filtered(from, to, message) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(%from, %to, kind = message.label(), "loopback dropped message");
            return Ok(false);
        }
        let bytes = message
            .to_bytes()
            .map_err(|e| TransportError::Send(e.to_string()))?;
        let mailboxes = self.mailboxes.lock().unwrap();
        let mailbox = mailboxes
            .get(to)
            .ok_or(TransportError::NotConnected(*to))?;
        mailbox
            .send((*from, bytes))
            .map_err(|_| TransportError::Closed)?;
        Ok(true)
    }
}

/// An in-process network of nodes connected by channels.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    shared: Arc<Shared>,
    threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// The outbound transport for node `id`. It only reaches peers once
    /// they are [attached](LoopbackNetwork::attach).
    pub fn endpoint(&self, id: NodeId) -> Arc<LoopbackEndpoint> {
        Arc::new(LoopbackEndpoint {
            id,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Start delivering messages addressed to `id` into `handler`, on a
    /// dedicated thread.
    pub fn attach(&self, id: NodeId, handler: Arc<dyn InboundHandler>) {
        let (tx, rx) = mpsc::channel::<Envelope>();
        self.shared.mailboxes.lock().unwrap().insert(id, tx);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("loopback-{id}"))
            .spawn(move || {
                for (from, bytes) in rx {
                    match WireMessage::from_bytes(&bytes) {
                        Ok(message) => {
                            shared.delivered.fetch_add(1, Ordering::Relaxed);
                            handler.handle(from, message);
                        }
                        Err(e) => warn!(%from, to = %id, error = %e, "undecodable loopback message"),
                    }
                }
            });
        match spawned {
            Ok(handle) => self.threads.lock().unwrap().push(handle),
            Err(e) => {
                warn!(node = %id, error = %e, "failed to spawn loopback delivery thread");
                self.shared.mailboxes.lock().unwrap().remove(&id);
            }
        }
    }

    /// Cut `id` off: nothing reaches it and nothing it sends gets through.
    pub fn disconnect(&self, id: NodeId) {
        self.shared.disconnected.lock().unwrap().insert(id);
    }

    pub fn reconnect(&self, id: NodeId) {
        self.shared.disconnected.lock().unwrap().remove(&id);
    }

    /// Install a filter that silently drops matching messages.
    pub fn set_drop_filter<F>(&self, filter: F)
    where
        F: Fn(&NodeId, &NodeId, &WireMessage) -> bool + Send + Sync + 'static,
    {
        *self.shared.filter.lock().unwrap() = Some(Arc::new(filter));
    }

    pub fn clear_drop_filter(&self) {
        *self.shared.filter.lock().unwrap() = None;
    }

    pub fn delivered_count(&self) -> usize {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> usize {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Close every mailbox and join the delivery threads.
    pub fn shutdown(&self) {
        self.shared.mailboxes.lock().unwrap().clear();
        let threads: Vec<JoinHandle<()>> = self.threads.lock().unwrap().drain(..).collect();
        for handle in threads {
            if handle.join().is_err() {
                warn!("loopback delivery thread panicked");
            }
        }
    }
}

/// One node's view of a [`LoopbackNetwork`].
pub struct LoopbackEndpoint {
    id: NodeId,
    shared: Arc<Shared>,
}

impl LoopbackEndpoint {
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn peers(&self) -> Vec<NodeId> {
        if !self.shared.reachable(&self.id) {
            return Vec::new();
        }
        let disconnected = self.shared.disconnected.lock().unwrap().clone();
        self.shared
            .mailboxes
            .lock()
            .unwrap()
            .keys()
            .filter(|peer| **peer != self.id && !disconnected.contains(peer))
            .copied()
            .collect()
    }
}

impl PeerTransport for LoopbackEndpoint {
    fn broadcast(&self, message: &WireMessage) -> Result<usize, TransportError> {
        let mut queued = 0;
        for peer in self.peers() {
            match self.shared.deliver(&self.id, &peer, message) {
                Ok(true) => queued += 1,
                Ok(false) => {}
                Err(e) => debug!(from = %self.id, to = %peer, error = %e, "broadcast skipped peer"),
            }
        }
        Ok(queued)
    }

    fn send(&self, peer: &NodeId, message: &WireMessage) -> Result<(), TransportError> {
        self.shared.deliver(&self.id, peer, message).map(|_| ())
    }

    fn connected_peer_count(&self) -> usize {
        self.peers().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_types::BlockHash;
    use std::sync::mpsc::Receiver;
    use std::time::Duration;

    struct Capture(Mutex<Sender<(NodeId, WireMessage)>>);

    impl InboundHandler for Capture {
        fn handle(&self, from: NodeId, message: WireMessage) {
            let _ = self.0.lock().unwrap().send((from, message));
        }
    }

    fn capture() -> (Arc<Capture>, Receiver<(NodeId, WireMessage)>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Capture(Mutex::new(tx))), rx)
    }

    fn id(n: u8) -> NodeId {
        NodeId::new([n; 16])
    }

    fn get_block() -> WireMessage {
        WireMessage::GetBlock(BlockHash::new([3; 32]))
    }

    #[test]
    fn test_null_transport_records() {
        let transport = NullTransport::new(3);
        assert_eq!(transport.broadcast(&get_block()).unwrap(), 3);
        transport.send(&id(1), &get_block()).unwrap();
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, None);
        assert_eq!(sent[1].0, Some(id(1)));

        transport.set_fail_sends(true);
        assert!(transport.broadcast(&get_block()).is_err());
    }

    #[test]
    fn test_loopback_broadcast_reaches_peers_only() {
        let net = LoopbackNetwork::new();
        let (h1, _rx1) = capture();
        let (h2, rx2) = capture();
        let (h3, rx3) = capture();
        net.attach(id(1), h1);
        net.attach(id(2), h2);
        net.attach(id(3), h3);

        let a = net.endpoint(id(1));
        assert_eq!(a.connected_peer_count(), 2);
        assert_eq!(a.broadcast(&get_block()).unwrap(), 2);

        let (from, msg) = rx2.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(from, id(1));
        assert_eq!(msg, get_block());
        assert!(rx3.recv_timeout(Duration::from_secs(2)).is_ok());
        net.shutdown();
    }

    #[test]
    fn test_loopback_disconnect_and_filter() {
        let net = LoopbackNetwork::new();
        let (h1, _rx1) = capture();
        let (h2, rx2) = capture();
        net.attach(id(1), h1);
        net.attach(id(2), h2);
        let a = net.endpoint(id(1));

        net.disconnect(id(2));
        assert_eq!(a.connected_peer_count(), 0);
        assert!(matches!(
            a.send(&id(2), &get_block()),
            Err(TransportError::NotConnected(_))
        ));

        net.reconnect(id(2));
        net.set_drop_filter(|_, to, _| *to == NodeId::new([2; 16]));
        a.send(&id(2), &get_block()).unwrap();
        assert_eq!(net.dropped_count(), 1);
        assert!(rx2.recv_timeout(Duration::from_millis(200)).is_err());

        net.clear_drop_filter();
        a.send(&id(2), &get_block()).unwrap();
        assert!(rx2.recv_timeout(Duration::from_secs(2)).is_ok());
        net.shutdown();
    }
}
