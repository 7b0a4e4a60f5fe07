//! Publishing endpoint
//!
//! Binds a TCP listener synchronously so an unavailable address fails fast,
//! then accepts WebSocket subscribers in the background. Each subscriber is a
//! `Peer` with its own filter set, updated by the subscribe/unsubscribe
//! control messages it sends. `send` never blocks: frames are queued on each
//! matching peer's channel and written by that peer's task. A peer that falls
//! `HIGH_WATER_MARK` frames behind loses new frames until it catches up.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_async;
use tracing::{debug, trace, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::transport::endpoint::Endpoint;
use crate::transport::matches_filter;
use crate::transport::message::{PublisherMessage, SubscriberMessage};
use crate::utils::error::{ConnectorError, Result};
use crate::utils::lock;

/// Frames queued for one peer before further frames to it are dropped.
pub const HIGH_WATER_MARK: usize = 1024;

type PeerId = String;

#[derive(Debug)]
struct Peer {
    filters: HashSet<String>,
    sender: mpsc::Sender<WsMessage>,
}

/// Queues `msg` for a peer without waiting. Returns false when the frame was
/// dropped because the queue is full or the peer is gone.
pub(crate) fn offer(peer_id: &str, sender: &mpsc::Sender<WsMessage>, msg: WsMessage) -> bool {
    match sender.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("{peer_id} is {HIGH_WATER_MARK} frames behind, dropping frame");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("{peer_id} is gone, dropping frame");
            false
        }
    }
}

type Peers = Arc<Mutex<HashMap<PeerId, Peer>>>;

#[derive(Debug)]
pub struct Publisher {
    endpoint: Endpoint,
    local_addr: SocketAddr,
    peers: Peers,
    shutdown: watch::Sender<bool>,
}

impl Publisher {
    /// Binds `endpoint` and starts accepting subscribers. Must be called from
    /// within a tokio runtime.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        let bind_err = |source| ConnectorError::Bind {
            address: endpoint.to_string(),
            source,
        };

        let std_listener = std::net::TcpListener::bind(endpoint.bind_addr()).map_err(bind_err)?;
        std_listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = std_listener.local_addr().map_err(bind_err)?;
        let listener = TcpListener::from_std(std_listener).map_err(bind_err)?;

        let peers: Peers = Arc::new(Mutex::new(HashMap::new()));
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(accept_loop(listener, peers.clone(), shutdown_rx));
        debug!("publisher bound to {endpoint} ({local_addr})");

        Ok(Self {
            endpoint: endpoint.clone(),
            local_addr,
            peers,
            shutdown,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of subscribers currently connected.
    pub fn peer_count(&self) -> usize {
        lock(&self.peers).len()
    }

    /// Queues one frame for every connected subscriber interested in `topic`.
    /// Returns the number of peers the frame was queued for.
    pub fn send(&self, topic: &str, payload: String) -> usize {
        let frame = PublisherMessage::Frame {
            topic: topic.to_string(),
            payload,
        };
        let text = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode frame for {topic}: {e}");
                return 0;
            }
        };
        let ws_msg = WsMessage::text(text);

        let peers = lock(&self.peers);
        let mut queued = 0;
        for (peer_id, peer) in peers.iter() {
            if !matches_filter(peer.filters.iter(), topic) {
                continue;
            }
            if offer(peer_id, &peer.sender, ws_msg.clone()) {
                queued += 1;
            }
        }
        trace!("frame on {topic} queued for {queued} peer(s)");
        queued
    }

    /// Stops accepting subscribers and disconnects the existing ones. The
    /// listener is released once the accept task observes the signal.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
        lock(&self.peers).clear();
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.close();
    }
}

async fn accept_loop(listener: TcpListener, peers: Peers, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    tokio::spawn(serve_peer(stream, remote, peers.clone(), shutdown.clone()));
                }
                Err(e) => warn!("Failed to accept subscriber: {e}"),
            }
        }
    }
    debug!("publisher accept loop closed");
}

async fn serve_peer(
    stream: TcpStream,
    remote: SocketAddr,
    peers: Peers,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("WebSocket handshake error from {remote}: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(HIGH_WATER_MARK);
    let peer_id = format!("peer-{}", Uuid::new_v4());

    if *shutdown.borrow() {
        return;
    }
    lock(&peers).insert(
        peer_id.clone(),
        Peer {
            filters: HashSet::new(),
            sender: tx,
        },
    );
    debug!("{peer_id} connected from {remote}");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            outbound = rx.recv() => match outbound {
                Some(msg) => {
                    if let Err(e) = ws_sender.send(msg).await {
                        debug!("Failed to send frame to {peer_id}: {e}");
                        break;
                    }
                }
                // the peer entry was dropped by `close`
                None => break,
            },
            inbound = ws_receiver.next() => match inbound {
                Some(Ok(msg)) if msg.is_text() => match msg.to_text() {
                    Ok(text) => apply_control(&peers, &peer_id, text),
                    Err(e) => warn!("Unreadable control message from {peer_id}: {e}"),
                },
                Some(Ok(msg)) if msg.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Connection error from {peer_id}: {e}");
                    break;
                }
                None => break,
            }
        }
    }

    lock(&peers).remove(&peer_id);
    let _ = ws_sender.close().await;
    debug!("{peer_id} disconnected");
}

fn apply_control(peers: &Peers, peer_id: &str, text: &str) {
    let control = match serde_json::from_str::<SubscriberMessage>(text) {
        Ok(control) => control,
        Err(err) => {
            warn!(
                "Invalid subscriber message from {peer_id}: {err} | {}",
                text.chars().take(100).collect::<String>()
            );
            return;
        }
    };

    let mut peers = lock(peers);
    let Some(peer) = peers.get_mut(peer_id) else {
        return;
    };
    match control {
        SubscriberMessage::Subscribe { topic } => {
            trace!("{peer_id} subscribed to {topic}");
            peer.filters.insert(topic);
        }
        SubscriberMessage::Unsubscribe { topic } => {
            trace!("{peer_id} unsubscribed from {topic}");
            peer.filters.remove(&topic);
        }
    }
}
