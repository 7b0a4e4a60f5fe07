//! Connector engine
//!
//! The `Connector` ties one `Publisher` and one `Subscriber` together and
//! layers the application contract on top of them:
//! - every local handler for a topic shares a single transport subscription,
//!   opened by the first `subscribe` and closed by the last `unsubscribe`;
//! - every published message is stamped with this connector's sender id, and
//!   inbound messages carrying that id are dropped, since the transport
//!   echoes publications back to their sender;
//! - malformed payloads and unserializable messages are reported as
//!   `ConnectorEvent::Error` and dropped, never returned to the caller.
//!
//! Concurrency and usage notes:
//! - A new connector is not ready. Attach observers (`take_events`), then
//!   call `start` or await `ready` to make the transition; `subscribe`,
//!   `publish` and `unsubscribe` do not wait for it.
//! - `new` must be called from within a tokio runtime. All inbound frames are
//!   routed by one task, so two dispatches never interleave and handlers for
//!   a message run in registration order before the next frame is handled.
//! - The registry lock is released before handlers run. Handlers may call
//!   back into the connector.

use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::ConnectorSettings;
use crate::connector::envelope::{self, Decoded, Envelope};
use crate::connector::registry::{Handler, Removal, TopicRegistry};
use crate::transport::{Endpoint, InboundFrame, Publisher, Subscriber};
use crate::utils::error::{ConnectorError, Result};
use crate::utils::lock;

/// Events buffered for the reader of `take_events`. Once full, further
/// events are dropped (they are still logged).
pub const EVENT_CAPACITY: usize = 1024;

/// Notifications emitted by a connector.
#[derive(Debug)]
pub enum ConnectorEvent {
    /// Emitted once, by the first `start`.
    Ready,
    /// A per-message failure. The message was dropped.
    Error(ConnectorError),
}

/// State shared between the connector handle and its receive task.
#[derive(Debug)]
struct Shared {
    sender_id: String,
    registry: Mutex<TopicRegistry>,
    events: mpsc::Sender<ConnectorEvent>,
}

impl Shared {
    fn emit(&self, event: ConnectorEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            warn!("event buffer full, dropping {event:?}");
        }
    }

    fn report(&self, err: ConnectorError) {
        warn!("{err}");
        self.emit(ConnectorEvent::Error(err));
    }

    /// Decodes one inbound frame and dispatches it unless it is malformed,
    /// anonymous, or our own echo.
    fn route(&self, frame: InboundFrame) {
        let InboundFrame { topic, payload } = frame;
        match envelope::decode(&self.sender_id, &payload) {
            Ok(Decoded::Accepted(envelope)) => self.dispatch(&topic, &envelope),
            Ok(Decoded::Echo) => trace!("dropping echo on {topic}"),
            Ok(Decoded::Anonymous) => debug!("dropping message without sender on {topic}"),
            Err(source) => self.report(ConnectorError::Deserialize { topic, source }),
        }
    }

    /// Invokes the handlers registered for `topic` in registration order. A
    /// handler unsubscribed by an earlier handler in the same dispatch is
    /// skipped. A panicking handler is reported and does not stop the rest.
    fn dispatch(&self, topic: &str, envelope: &Envelope) {
        let handlers = lock(&self.registry).handlers(topic);
        for handler in handlers {
            if !lock(&self.registry).contains(topic, &handler) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| handler(envelope))).is_err() {
                self.report(ConnectorError::HandlerPanicked {
                    topic: topic.to_string(),
                });
            }
        }
    }
}

#[derive(Debug)]
pub struct Connector {
    shared: Arc<Shared>,
    publisher: Publisher,
    subscriber: Subscriber,
    ready: watch::Sender<bool>,
    events: Mutex<Option<mpsc::Receiver<ConnectorEvent>>>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
}

impl Connector {
    /// Creates a connector: validates the addressing, binds the publish
    /// endpoint and starts connecting to every peer. The connector is not
    /// ready until `start` is called.
    ///
    /// Fails with `ConnectorError::Config` on missing or malformed addresses
    /// or when called outside a tokio runtime, and with
    /// `ConnectorError::Bind` when the publish address is unavailable.
    pub fn new(settings: ConnectorSettings) -> Result<Self> {
        let pub_endpoint: Endpoint = settings.pub_address.parse()?;
        let peers = settings
            .sub_address
            .addresses()
            .into_iter()
            .map(str::parse::<Endpoint>)
            .collect::<Result<Vec<_>>>()?;
        if peers.is_empty() {
            return Err(ConnectorError::Config(
                "sub_address must list at least one peer".to_string(),
            ));
        }

        let runtime = Handle::try_current().map_err(|e| {
            ConnectorError::Config(format!("connector must be created inside a tokio runtime: {e}"))
        })?;

        let sender_id = settings
            .server_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        let publisher = Publisher::bind(&pub_endpoint)?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let subscriber = Subscriber::new(inbound_tx);
        for peer in &peers {
            subscriber.connect(peer);
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let (ready, _) = watch::channel(false);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            sender_id,
            registry: Mutex::new(TopicRegistry::new()),
            events: events_tx,
        });

        runtime.spawn(receive_loop(inbound_rx, shared.clone(), shutdown_rx));

        info!(
            "connector {} publishing on {} ({}), subscribed to {} peer(s)",
            shared.sender_id,
            pub_endpoint,
            publisher.local_addr(),
            peers.len()
        );

        Ok(Self {
            shared,
            publisher,
            subscriber,
            ready,
            events: Mutex::new(Some(events_rx)),
            shutdown,
            closed: AtomicBool::new(false),
        })
    }

    /// Package name of this connector implementation.
    pub fn name(&self) -> &'static str {
        crate::NAME
    }

    /// Package version of this connector implementation.
    pub fn version(&self) -> &'static str {
        crate::VERSION
    }

    /// Identity stamped on every outgoing message.
    pub fn sender_id(&self) -> &str {
        &self.shared.sender_id
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Makes the connector ready and emits `ConnectorEvent::Ready`. Only the
    /// first call has any effect.
    pub fn start(&self) {
        if !self.ready.send_replace(true) {
            debug!("connector {} ready", self.shared.sender_id);
            self.shared.emit(ConnectorEvent::Ready);
        }
    }

    /// Starts the connector if needed and resolves once it is ready.
    pub async fn ready(&self) {
        self.start();
        let mut ready = self.ready.subscribe();
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Takes the event receiver. Events are buffered from construction (up
    /// to `EVENT_CAPACITY`); only the first call returns `Some`.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ConnectorEvent>> {
        lock(&self.events).take()
    }

    /// Address the publish endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.publisher.local_addr()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Registers `handler` for `topic`, opening the transport subscription if
    /// it is the topic's first handler.
    pub fn subscribe(&self, topic: &str, handler: Handler) {
        if self.is_closed() {
            warn!("subscribe to {topic} ignored: connector is closed");
            return;
        }
        let mut registry = lock(&self.shared.registry);
        if registry.register(topic, handler) {
            self.subscriber.subscribe(topic);
            debug!("opened transport subscription for {topic}");
        }
    }

    /// Removes `handler` from `topic`, closing the transport subscription if
    /// no handlers remain. Unknown handlers are ignored.
    pub fn unsubscribe(&self, topic: &str, handler: &Handler) {
        let mut registry = lock(&self.shared.registry);
        match registry.deregister(topic, handler) {
            Removal::LastRemoved => {
                self.subscriber.unsubscribe(topic);
                debug!("closed transport subscription for {topic}");
            }
            Removal::Removed => {}
            Removal::NotRegistered => trace!("unsubscribe from {topic}: handler not registered"),
        }
    }

    /// Number of handlers registered for `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        lock(&self.shared.registry).handler_count(topic)
    }

    /// Whether the transport currently holds a subscription for `topic`.
    pub fn has_transport_subscription(&self, topic: &str) -> bool {
        self.subscriber.is_subscribed(topic)
    }

    /// Stamps a copy of `message` with the sender id and broadcasts it on
    /// `topic`. Serialization failures are reported as events and nothing
    /// is sent.
    pub fn publish<T: Serialize + ?Sized>(&self, topic: &str, message: &T) {
        if self.is_closed() {
            warn!("publish to {topic} ignored: connector is closed");
            return;
        }

        let payload = Envelope::stamp(&self.shared.sender_id, message)
            .and_then(|envelope| envelope.encode().map_err(|e| e.to_string()));
        match payload {
            Ok(payload) => {
                self.publisher.send(topic, payload);
            }
            Err(reason) => self.shared.report(ConnectorError::Serialize {
                topic: topic.to_string(),
                reason,
            }),
        }
    }

    /// Stops all background tasks, disconnects from every peer, releases the
    /// publish address and drops all handlers. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        self.publisher.close();
        self.subscriber.close();
        let topics = lock(&self.shared.registry).clear();
        info!(
            "connector {} closed, dropped {} topic(s)",
            self.shared.sender_id,
            topics.len()
        );
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.close();
    }
}

async fn receive_loop(
    mut inbound: mpsc::UnboundedReceiver<InboundFrame>,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            frame = inbound.recv() => match frame {
                Some(frame) => shared.route(frame),
                None => break,
            }
        }
    }
    if *shutdown.borrow() {
        debug!("receive loop for {} closed", shared.sender_id);
    } else {
        error!(
            "receive loop for {} stopped unexpectedly, no further messages will be delivered",
            shared.sender_id
        );
    }
}
