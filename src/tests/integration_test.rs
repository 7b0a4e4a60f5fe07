//! Three connectors on loopback, each publishing on its own port and
//! subscribed to the other two.

use crate::{Connector, ConnectorEvent, ConnectorSettings, Handler, handler};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

const MESSAGE_TIME: Duration = Duration::from_millis(500);

fn addr(port: u16) -> String {
    format!("tcp://127.0.0.1:{port}")
}

struct Recorder {
    handler: Handler,
    seen: Arc<Mutex<Vec<Value>>>,
}

impl Recorder {
    fn new() -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        Self {
            handler: handler(move |envelope| sink.lock().unwrap().push(envelope.clone().into_value())),
            seen,
        }
    }

    fn calls(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }

    fn called_with(&self, expected: &Value) -> bool {
        self.calls().contains(expected)
    }
}

/// Connectors on `base`, `base + 1` and `base + 2`, fully meshed and ready.
async fn cluster(base: u16) -> (Connector, Connector, Connector) {
    let ports = [base, base + 1, base + 2];
    let mut connectors = Vec::new();
    for (i, port) in ports.iter().enumerate() {
        let peers: Vec<String> = ports
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, p)| addr(*p))
            .collect();
        let connector = Connector::new(ConnectorSettings::new(addr(*port), peers))
            .expect("create connector");
        assert!(!connector.is_ready());
        connectors.push(connector);
    }
    for connector in &connectors {
        connector.ready().await;
        assert!(connector.is_ready());
    }
    let c = connectors.pop().unwrap();
    let b = connectors.pop().unwrap();
    let a = connectors.pop().unwrap();
    (a, b, c)
}

#[tokio::test]
async fn messages_are_sent_between_multiple_instances() {
    let (a, b, c) = cluster(38300).await;
    let mut errors_a = a.take_events().unwrap();
    let (ra, rb, rc) = (Recorder::new(), Recorder::new(), Recorder::new());

    a.subscribe("topic1", ra.handler.clone());
    b.subscribe("topic1", rb.handler.clone());
    c.subscribe("topic1", rc.handler.clone());
    assert!(ra.calls().is_empty());
    sleep(MESSAGE_TIME).await;

    // B publishes: A and C receive exactly once, B never does
    b.publish("topic1", &json!({ "some": "data" }));
    sleep(MESSAGE_TIME).await;
    let from_b = json!({ "sender": b.sender_id(), "some": "data" });
    assert_eq!(ra.calls(), vec![from_b.clone()]);
    assert_eq!(rc.calls(), vec![from_b.clone()]);
    assert!(rb.calls().is_empty());

    // C publishes
    c.publish("topic1", &json!({ "other": "value" }));
    sleep(MESSAGE_TIME).await;
    let from_c = json!({ "sender": c.sender_id(), "other": "value" });
    assert!(ra.called_with(&from_c));
    assert!(rb.called_with(&from_c));
    assert!(!rc.called_with(&from_c));

    // A and C at the same time: no cross-loss
    a.publish("topic1", &json!({ "val": "x" }));
    c.publish("topic1", &json!({ "val": "y" }));
    sleep(MESSAGE_TIME).await;
    let x = json!({ "sender": a.sender_id(), "val": "x" });
    let y = json!({ "sender": c.sender_id(), "val": "y" });
    assert!(ra.called_with(&y));
    assert!(rb.called_with(&x));
    assert!(rb.called_with(&y));
    assert!(rc.called_with(&x));
    assert!(!ra.called_with(&x));
    assert!(!rc.called_with(&y));

    // B unsubscribes: only C hears A
    b.unsubscribe("topic1", &rb.handler);
    sleep(MESSAGE_TIME).await;
    a.publish("topic1", &json!({ "notFor": "B" }));
    sleep(MESSAGE_TIME).await;
    let not_for_b = json!({ "sender": a.sender_id(), "notFor": "B" });
    assert!(!ra.called_with(&not_for_b));
    assert!(!rb.called_with(&not_for_b));
    assert!(rc.called_with(&not_for_b));

    // nothing went wrong along the way
    while let Ok(event) = errors_a.try_recv() {
        assert!(matches!(event, ConnectorEvent::Ready), "unexpected event {event:?}");
    }
}

#[tokio::test]
async fn refcounted_subscription_keeps_delivering_until_last_handler_leaves() {
    let (a, b, _c) = cluster(38310).await;
    let (first, second) = (Recorder::new(), Recorder::new());

    a.subscribe("topic1", first.handler.clone());
    a.subscribe("topic1", second.handler.clone());
    sleep(MESSAGE_TIME).await;

    a.unsubscribe("topic1", &second.handler);
    assert!(a.has_transport_subscription("topic1"));
    sleep(MESSAGE_TIME).await;

    b.publish("topic1", &json!({ "n": 1 }));
    sleep(MESSAGE_TIME).await;
    let one = json!({ "sender": b.sender_id(), "n": 1 });
    assert_eq!(first.calls(), vec![one]);
    assert!(second.calls().is_empty());

    a.unsubscribe("topic1", &first.handler);
    assert!(!a.has_transport_subscription("topic1"));
    sleep(MESSAGE_TIME).await;

    b.publish("topic1", &json!({ "n": 2 }));
    sleep(MESSAGE_TIME).await;
    assert_eq!(first.calls().len(), 1);
    assert!(second.calls().is_empty());
}

#[tokio::test]
async fn handlers_run_in_registration_order() {
    let (a, b, _c) = cluster(38320).await;
    let order = Arc::new(Mutex::new(Vec::new()));
    for label in ["first", "second", "third"] {
        let order = order.clone();
        a.subscribe("topic1", handler(move |_| order.lock().unwrap().push(label)));
    }
    sleep(MESSAGE_TIME).await;

    b.publish("topic1", &json!({ "ping": true }));
    sleep(MESSAGE_TIME).await;
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn topics_are_isolated() {
    let (a, b, _c) = cluster(38330).await;
    let (records, rpcs) = (Recorder::new(), Recorder::new());
    a.subscribe("R", records.handler.clone());
    a.subscribe("P", rpcs.handler.clone());
    sleep(MESSAGE_TIME).await;

    b.publish("R", &json!({ "action": "P", "data": ["user-54jcvew34", 32] }));
    sleep(MESSAGE_TIME).await;

    assert_eq!(
        records.calls(),
        vec![json!({ "sender": b.sender_id(), "action": "P", "data": ["user-54jcvew34", 32] })]
    );
    assert!(rpcs.calls().is_empty());
}

#[tokio::test]
async fn explicit_server_names_are_stamped() {
    let ports = [38340u16, 38341];
    let a = Connector::new(
        ConnectorSettings::new(addr(ports[0]), addr(ports[1])).with_server_name("server-a"),
    )
    .unwrap();
    let b = Connector::new(
        ConnectorSettings::new(addr(ports[1]), addr(ports[0])).with_server_name("server-b"),
    )
    .unwrap();
    let received = Recorder::new();
    b.subscribe("topic1", received.handler.clone());
    sleep(MESSAGE_TIME).await;

    a.publish("topic1", &json!({ "sender": "forged", "some": "data" }));
    sleep(MESSAGE_TIME).await;

    assert_eq!(
        received.calls(),
        vec![json!({ "sender": "server-a", "some": "data" })]
    );
}
