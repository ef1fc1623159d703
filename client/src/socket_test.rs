//! Actor lifecycle tests with a scripted transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use events::{Envelope, EventBody, LeadRef};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use super::{Connection, Connector, Socket, SocketConfig, SocketError, SocketStatus};

const WAIT: Duration = Duration::from_secs(1);

enum Step {
    Fail,
    Open(Connection),
}

/// Replays a scripted sequence of connection outcomes. An exhausted script
/// fails every further attempt.
struct ScriptedConnector {
    steps: Mutex<VecDeque<Step>>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self { steps: Mutex::new(steps.into()), connects: AtomicUsize::new(0) })
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Connection, SocketError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Open(connection)) => Ok(connection),
            Some(Step::Fail) | None => Err(SocketError::Connect("scripted failure".to_owned())),
        }
    }
}

/// One scripted open connection plus the test-side handles that drive it.
/// Dropping `in_tx` closes the connection from the actor's point of view.
fn open_step() -> (Step, mpsc::Sender<String>, mpsc::Receiver<String>) {
    let (in_tx, in_rx) = mpsc::channel(8);
    let (out_tx, out_rx) = mpsc::channel(8);
    (Step::Open(Connection { outbound: out_tx, inbound: in_rx }), in_tx, out_rx)
}

fn fast_config() -> SocketConfig {
    let mut config = SocketConfig::new("ws://test.invalid/ws");
    config.retry_delay = Duration::from_millis(10);
    config.max_attempts = 3;
    config
}

fn lead_updated_json(lead_id: Uuid) -> String {
    Envelope::now(EventBody::LeadUpdated(LeadRef { lead_id })).to_json().unwrap()
}

async fn wait_for_status(socket: &Socket, want: SocketStatus) {
    timeout(WAIT, async {
        while socket.status() != want {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {want:?}, at {:?}", socket.status()));
}

#[tokio::test]
async fn parses_inbound_text_and_dispatches_to_handlers() {
    let (step, in_tx, _out_rx) = open_step();
    let connector = ScriptedConnector::new(vec![step]);
    let socket = Socket::with_connector(fast_config(), connector);
    wait_for_status(&socket, SocketStatus::Connected).await;

    let (seen_tx, mut seen_rx) = mpsc::channel::<String>(8);
    socket.on_event(move |envelope| {
        let _ = seen_tx.try_send(envelope.body.type_name().to_owned());
    });

    let lead_id = Uuid::new_v4();
    in_tx.send(lead_updated_json(lead_id)).await.unwrap();

    let seen = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
    assert_eq!(seen, "lead:updated");

    let last = socket.last_event().expect("last_event recorded");
    assert_eq!(last.body, EventBody::LeadUpdated(LeadRef { lead_id }));
}

#[tokio::test]
async fn handler_registered_mid_session_sees_subsequent_events() {
    let (step, in_tx, _out_rx) = open_step();
    let connector = ScriptedConnector::new(vec![step]);
    let socket = Socket::with_connector(fast_config(), connector);
    wait_for_status(&socket, SocketStatus::Connected).await;

    // First event flows with no handler registered at all.
    let first = Uuid::new_v4();
    in_tx.send(lead_updated_json(first)).await.unwrap();
    timeout(WAIT, async {
        while socket.last_event().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first event dispatched");

    let (seen_tx, mut seen_rx) = mpsc::channel::<Uuid>(8);
    socket.on_event(move |envelope| {
        if let EventBody::LeadUpdated(payload) = &envelope.body {
            let _ = seen_tx.try_send(payload.lead_id);
        }
    });

    let second = Uuid::new_v4();
    in_tx.send(lead_updated_json(second)).await.unwrap();

    let seen = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
    assert_eq!(seen, second, "late handler sees only events after registration");
}

#[tokio::test]
async fn unparseable_text_is_dropped_without_killing_the_session() {
    let (step, in_tx, _out_rx) = open_step();
    let connector = ScriptedConnector::new(vec![step]);
    let socket = Socket::with_connector(fast_config(), connector);
    wait_for_status(&socket, SocketStatus::Connected).await;

    let (seen_tx, mut seen_rx) = mpsc::channel::<String>(8);
    socket.on_event(move |envelope| {
        let _ = seen_tx.try_send(envelope.body.type_name().to_owned());
    });

    in_tx.send("{broken".to_owned()).await.unwrap();
    in_tx.send(lead_updated_json(Uuid::new_v4())).await.unwrap();

    let seen = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
    assert_eq!(seen, "lead:updated");
    assert!(socket.is_connected());
}

#[tokio::test]
async fn reconnects_after_the_connection_closes() {
    let (first, first_in_tx, _first_out) = open_step();
    let (second, _second_in_tx, _second_out) = open_step();
    let connector = ScriptedConnector::new(vec![first, second]);
    let socket = Socket::with_connector(fast_config(), Arc::clone(&connector) as Arc<dyn Connector>);
    wait_for_status(&socket, SocketStatus::Connected).await;

    drop(first_in_tx);

    timeout(WAIT, async {
        while connector.connects() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("second connect attempted");
    wait_for_status(&socket, SocketStatus::Connected).await;
    assert_eq!(connector.connects(), 2);
}

#[tokio::test]
async fn gives_up_after_max_attempts_and_reconnect_revives() {
    let connector = ScriptedConnector::new(vec![Step::Fail, Step::Fail]);
    let mut config = fast_config();
    config.max_attempts = 1;
    let socket = Socket::with_connector(config, Arc::clone(&connector) as Arc<dyn Connector>);

    wait_for_status(&socket, SocketStatus::GivenUp).await;
    // Initial attempt plus one retry.
    assert_eq!(connector.connects(), 2);

    let (step, _in_tx, _out_rx) = open_step();
    connector.push(step);
    socket.reconnect();

    wait_for_status(&socket, SocketStatus::Connected).await;
    assert_eq!(connector.connects(), 3);
}

#[tokio::test]
async fn reconnect_is_a_noop_while_connected() {
    let (step, _in_tx, _out_rx) = open_step();
    let connector = ScriptedConnector::new(vec![step]);
    let socket = Socket::with_connector(fast_config(), Arc::clone(&connector) as Arc<dyn Connector>);
    wait_for_status(&socket, SocketStatus::Connected).await;

    socket.reconnect();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(socket.is_connected());
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn send_forwards_to_the_transport_only_while_connected() {
    let (step, _in_tx, mut out_rx) = open_step();
    let connector = ScriptedConnector::new(vec![step]);
    let socket = Socket::with_connector(fast_config(), connector);
    wait_for_status(&socket, SocketStatus::Connected).await;

    let envelope = Envelope::now(EventBody::LeadUpdated(LeadRef { lead_id: Uuid::new_v4() }));
    assert!(socket.send(&envelope));

    let text = timeout(WAIT, out_rx.recv()).await.unwrap().unwrap();
    assert_eq!(Envelope::parse(&text).unwrap().body, envelope.body);
}

#[tokio::test]
async fn send_returns_false_with_no_connection() {
    let connector = ScriptedConnector::new(vec![]);
    let mut config = fast_config();
    config.max_attempts = 0;
    let socket = Socket::with_connector(config, connector);
    wait_for_status(&socket, SocketStatus::GivenUp).await;

    let envelope = Envelope::now(EventBody::LeadUpdated(LeadRef { lead_id: Uuid::new_v4() }));
    assert!(!socket.send(&envelope));
}
