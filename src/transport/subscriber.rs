//! Subscribing endpoint
//!
//! One `Subscriber` holds the filter set shared by all of its connections.
//! `connect` starts a background task per publisher address that dials the
//! peer, replays the current filters, forwards later filter changes, and
//! pushes every matching frame into the inbound channel handed to `new`.
//! Connecting never fails: an absent peer is retried every
//! `RECONNECT_INTERVAL` until it appears or the subscriber is closed.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::transport::endpoint::Endpoint;
use crate::transport::matches_filter;
use crate::transport::message::{PublisherMessage, SubscriberMessage};
use crate::utils::lock;

pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(100);

/// A frame received from any connected publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Default)]
struct SubscriberState {
    filters: BTreeSet<String>,
    connections: HashMap<u64, mpsc::UnboundedSender<SubscriberMessage>>,
    next_connection: u64,
}

impl SubscriberState {
    fn broadcast(&self, control: SubscriberMessage) {
        for tx in self.connections.values() {
            let _ = tx.send(control.clone());
        }
    }
}

type SharedState = Arc<Mutex<SubscriberState>>;
type Connection = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
pub struct Subscriber {
    state: SharedState,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    shutdown: watch::Sender<bool>,
}

impl Subscriber {
    pub fn new(inbound: mpsc::UnboundedSender<InboundFrame>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(SubscriberState::default())),
            inbound,
            shutdown,
        }
    }

    /// Starts maintaining a connection to the publisher at `endpoint`. Must be
    /// called from within a tokio runtime.
    pub fn connect(&self, endpoint: &Endpoint) {
        tokio::spawn(connection_loop(
            endpoint.ws_url(),
            self.state.clone(),
            self.inbound.clone(),
            self.shutdown.subscribe(),
        ));
    }

    /// Adds a prefix filter. Adding a filter twice is a no-op.
    pub fn subscribe(&self, topic: &str) {
        let mut state = lock(&self.state);
        if state.filters.insert(topic.to_string()) {
            state.broadcast(SubscriberMessage::Subscribe {
                topic: topic.to_string(),
            });
        }
    }

    /// Removes a prefix filter. Removing an absent filter is a no-op.
    pub fn unsubscribe(&self, topic: &str) {
        let mut state = lock(&self.state);
        if state.filters.remove(topic) {
            state.broadcast(SubscriberMessage::Unsubscribe {
                topic: topic.to_string(),
            });
        }
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        lock(&self.state).filters.contains(topic)
    }

    pub fn filters(&self) -> Vec<String> {
        lock(&self.state).filters.iter().cloned().collect()
    }

    /// Number of publishers currently connected.
    pub fn connection_count(&self) -> usize {
        lock(&self.state).connections.len()
    }

    /// Drops every connection and stops reconnecting.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
        let mut state = lock(&self.state);
        state.filters.clear();
        state.connections.clear();
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.close();
    }
}

async fn connection_loop(
    url: String,
    state: SharedState,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            result = connect_async(url.as_str()) => match result {
                Ok((ws_stream, _response)) => {
                    debug!("connected to publisher {url}");
                    run_connection(ws_stream, &state, &inbound, &mut shutdown).await;
                    debug!("disconnected from publisher {url}");
                }
                Err(e) => trace!("publisher {url} unavailable: {e}"),
            }
        }

        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(RECONNECT_INTERVAL) => {}
        }
    }
}

async fn run_connection(
    ws_stream: Connection,
    state: &SharedState,
    inbound: &mpsc::UnboundedSender<InboundFrame>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SubscriberMessage>();

    // Replay and registration happen under one lock so no filter change can
    // slip between the snapshot and the first broadcast.
    let connection_id = {
        let mut state = lock(state);
        for topic in &state.filters {
            let _ = tx.send(SubscriberMessage::Subscribe {
                topic: topic.clone(),
            });
        }
        let id = state.next_connection;
        state.next_connection += 1;
        state.connections.insert(id, tx);
        id
    };

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            control = rx.recv() => match control {
                Some(control) => {
                    let text = match serde_json::to_string(&control) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to encode control message: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = ws_sender.send(WsMessage::text(text)).await {
                        debug!("Failed to send control message: {e}");
                        break;
                    }
                }
                None => break,
            },
            received = ws_receiver.next() => match received {
                Some(Ok(msg)) if msg.is_text() => match msg.to_text() {
                    Ok(text) => forward_frame(state, inbound, text),
                    Err(e) => warn!("Unreadable frame: {e}"),
                },
                Some(Ok(msg)) if msg.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Connection error: {e}");
                    break;
                }
                None => break,
            }
        }
    }

    lock(state).connections.remove(&connection_id);
    let _ = ws_sender.close().await;
}

fn forward_frame(state: &SharedState, inbound: &mpsc::UnboundedSender<InboundFrame>, text: &str) {
    let PublisherMessage::Frame { topic, payload } =
        match serde_json::from_str::<PublisherMessage>(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(
                    "Invalid publisher message: {err} | {}",
                    text.chars().take(100).collect::<String>()
                );
                return;
            }
        };

    // frames can still be in flight after an unsubscribe reached the peer
    if !matches_filter(lock(state).filters.iter(), &topic) {
        trace!("dropping frame on unsubscribed topic {topic}");
        return;
    }

    if inbound.send(InboundFrame { topic, payload }).is_err() {
        debug!("inbound channel closed, dropping frame");
    }
}
