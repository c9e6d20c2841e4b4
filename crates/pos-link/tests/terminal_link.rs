//! End-to-end tests against a mock terminal listening on loopback.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use pos_crypto::EcPrivateKey;
use pos_link::{
    CanonicalTemplate, ConnectionState, InboundEvent, InboundEvents, InboundOutcome, LinkConfig,
    LinkError, PaymentOrder, PaymentTerminalApi, TcpPosLink, TerminalEndpoint,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_stream::StreamExt;

const CLIENT_PRIVATE_KEY: &str = "MIGHAgEAMBMGByqGSM49AgEGCCqGSM49AwEHBG0wawIBAQQgecauuASSa4zrQ7q7OtVOjtVZVsfxPr5Yx/TggDdW0HWhRANCAARKn+TtijxV9FvGGWSzQua9tLXIQ/MX97X6G/EWQaso0seq4lkmkLkAD4dtWptUaUCe/lxdfiDlmct3Ydq80wRq";
const CLIENT_PUBLIC_KEY: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAESp/k7Yo8VfRbxhlks0LmvbS1yEPzF/e1+hvxFkGrKNLHquJZJpC5AA+HbVqbVGlAnv5cXX4g5ZnLd2HavNMEag==";

const WAIT: Duration = Duration::from_secs(5);

/// Mock terminal with its own signing key.
struct Terminal {
    listener: TcpListener,
    key: EcPrivateKey,
}

/// Server side of one accepted connection.
struct TerminalSession {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Terminal {
    async fn start() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            key: EcPrivateKey::generate(),
        }
    }

    fn public_key(&self) -> String {
        self.key.public_key().to_spki_base64().unwrap()
    }

    fn config(&self) -> LinkConfig {
        LinkConfig {
            endpoint: TerminalEndpoint {
                host: "127.0.0.1".to_string(),
                port: self.listener.local_addr().unwrap().port(),
            },
            client_private_key: Some(CLIENT_PRIVATE_KEY.to_string()),
            ..LinkConfig::default()
        }
    }

    fn link(&self) -> TcpPosLink {
        TcpPosLink::over_tcp(self.config()).unwrap()
    }

    fn order(&self, amount: &str, payload: &str) -> PaymentOrder {
        PaymentOrder::new(amount, payload, self.public_key())
    }

    async fn accept(&self) -> TerminalSession {
        let (stream, _) = timeout(WAIT, self.listener.accept()).await.unwrap().unwrap();
        let (reader, writer) = stream.into_split();
        TerminalSession {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    fn sign(&self, fields: &[&str]) -> String {
        let template = CanonicalTemplate::build(fields);
        STANDARD.encode(pos_crypto::sign(&self.key, template.as_bytes()).unwrap())
    }

    fn failed_line(&self, error: &str, stan_id: &str, payload: &str) -> String {
        json!({
            "type": "payment_failed",
            "data": {
                "error": error,
                "stan_id": stan_id,
                "payload": payload,
                "sign": self.sign(&[error, stan_id, payload]),
            }
        })
        .to_string()
    }

    fn success_line(&self, amount: i64, stan_id: &str, payload: &str) -> String {
        let amount_text = amount.to_string();
        let fields = [
            amount_text.as_str(),
            "123456789012",
            "SN-0042",
            "000123",
            "603799******1234",
            "2024-05-01T10:15:30",
            stan_id,
            payload,
        ];
        json!({
            "type": "payment_success",
            "data": {
                "amount": amount,
                "rrn": fields[1],
                "serial": fields[2],
                "trace": fields[3],
                "card_number": fields[4],
                "datetime": fields[5],
                "stan_id": stan_id,
                "payload": payload,
                "sign": self.sign(&fields),
            }
        })
        .to_string()
    }
}

impl TerminalSession {
    async fn read_request(&mut self) -> Value {
        let line = timeout(WAIT, self.lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .expect("request line");
        serde_json::from_str(&line).unwrap()
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }
}

async fn next_outcome(events: &mut InboundEvents) -> InboundOutcome {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for outcome")
        .expect("event channel closed")
}

fn verify_client_signature(data: &Value) -> bool {
    let amount = data["amount"].as_u64().unwrap().to_string();
    let template = CanonicalTemplate::build([
        amount.as_str(),
        data["stan_id"].as_str().unwrap(),
        data["payload"].as_str().unwrap(),
    ]);
    let key = pos_crypto::load_public_key(CLIENT_PUBLIC_KEY).unwrap();
    let signature = STANDARD.decode(data["sign"].as_str().unwrap()).unwrap();
    pos_crypto::verify(&key, &signature, template.as_bytes()).unwrap()
}

// =============================================================================
// Outbound
// =============================================================================

#[tokio::test]
async fn test_request_line_is_signed_and_well_formed() {
    let terminal = Terminal::start().await;
    let link = terminal.link();

    let stan_id = link
        .send_payment_request(terminal.order("2000", "id=1"))
        .await
        .unwrap();
    let mut session = terminal.accept().await;
    let request = session.read_request().await;

    assert_eq!(request["type"], "payment_request");
    let data = &request["data"];
    assert_eq!(data["amount"], 2000);
    assert_eq!(data["stan_id"], stan_id.as_str());
    assert_eq!(data["payload"], "id=1");
    assert_eq!(data["entity_type"], "payment_request");
    assert!(verify_client_signature(data));
    assert_eq!(link.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_sends_share_one_connection() {
    let terminal = Terminal::start().await;
    let link = terminal.link();

    let first = link
        .send_payment_request(terminal.order("100", "a"))
        .await
        .unwrap();
    let second = link
        .send_payment_request(terminal.order("200", "b"))
        .await
        .unwrap();
    assert_ne!(first, second);

    let mut session = terminal.accept().await;
    assert_eq!(session.read_request().await["data"]["stan_id"], first.as_str());
    assert_eq!(session.read_request().await["data"]["stan_id"], second.as_str());

    // No second connection was opened.
    assert!(timeout(Duration::from_millis(200), terminal.listener.accept())
        .await
        .is_err());
}

#[tokio::test]
async fn test_concurrent_first_sends_connect_once() {
    let terminal = Terminal::start().await;
    let link = terminal.link();

    let (a, b) = tokio::join!(
        link.send_payment_request(terminal.order("1", "a")),
        link.send_payment_request(terminal.order("2", "b")),
    );
    a.unwrap();
    b.unwrap();

    let mut session = terminal.accept().await;
    session.read_request().await;
    session.read_request().await;
    assert!(timeout(Duration::from_millis(200), terminal.listener.accept())
        .await
        .is_err());
}

#[tokio::test]
async fn test_bad_client_key_leaves_connection_untouched() {
    let terminal = Terminal::start().await;
    let mut config = terminal.config();
    config.client_private_key = Some("bm90IGEga2V5".to_string());
    let link = TcpPosLink::over_tcp(config).unwrap();

    let err = link
        .send_payment_request(terminal.order("10", ""))
        .await
        .unwrap_err();

    assert!(matches!(err, LinkError::KeyFormat(_)));
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert!(timeout(Duration::from_millis(200), terminal.listener.accept())
        .await
        .is_err());
}

#[tokio::test]
async fn test_invalid_amount_is_rejected_before_connecting() {
    let terminal = Terminal::start().await;
    let link = terminal.link();

    let err = link
        .send_payment_request(terminal.order("-5", ""))
        .await
        .unwrap_err();

    assert!(matches!(err, LinkError::InvalidRequest(_)));
    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let config = {
        let terminal = Terminal::start().await;
        terminal.config()
    };
    let link = TcpPosLink::over_tcp(config).unwrap();

    let err = link
        .send_payment_request(PaymentOrder::new("10", "", CLIENT_PUBLIC_KEY))
        .await
        .unwrap_err();

    assert!(matches!(err, LinkError::Connect { .. }));
    assert!(err.is_transport());
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert!(!link.state().is_open());
}

// =============================================================================
// Inbound
// =============================================================================

#[tokio::test]
async fn test_verified_success_event() {
    let terminal = Terminal::start().await;
    let link = terminal.link();
    let mut events = link.subscribe();

    let stan_id = link
        .send_payment_request(terminal.order("2000", "id=1"))
        .await
        .unwrap();
    let mut session = terminal.accept().await;
    session.read_request().await;
    session
        .send(&terminal.success_line(2000, &stan_id, "id=1"))
        .await;

    match next_outcome(&mut events).await {
        InboundOutcome::Verified(InboundEvent::Success(success)) => {
            assert_eq!(success.stan_id, stan_id);
            assert_eq!(success.amount, 2000);
            assert_eq!(success.rrn, "123456789012");
            assert_eq!(success.serial, "SN-0042");
            assert_eq!(success.trace, "000123");
            assert_eq!(success.card_number, "603799******1234");
            assert_eq!(success.datetime, "2024-05-01T10:15:30");
            assert_eq!(success.payload, "id=1");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_failure_event_without_payload_verifies() {
    let terminal = Terminal::start().await;
    let link = terminal.link();
    let mut events = link.subscribe();

    let stan_id = link
        .send_payment_request(terminal.order("2000", ""))
        .await
        .unwrap();
    let mut session = terminal.accept().await;
    session.read_request().await;

    let error = "Insufficient funds";
    let line = json!({
        "type": "payment_failed",
        "data": {
            "error": error,
            "stan_id": stan_id,
            "sign": terminal.sign(&[error, stan_id.as_str(), ""]),
        }
    })
    .to_string();
    session.send(&line).await;

    match next_outcome(&mut events).await {
        InboundOutcome::Verified(InboundEvent::Failure(failed)) => {
            assert_eq!(failed.error, error);
            assert_eq!(failed.payload, "");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_corrupted_signature_byte_is_never_trusted() {
    let terminal = Terminal::start().await;
    let link = terminal.link();
    let mut events = link.subscribe();

    let stan_id = link
        .send_payment_request(terminal.order("2000", "id=1"))
        .await
        .unwrap();
    let mut session = terminal.accept().await;
    session.read_request().await;

    let mut line: Value =
        serde_json::from_str(&terminal.success_line(2000, &stan_id, "id=1")).unwrap();
    let mut signature = STANDARD
        .decode(line["data"]["sign"].as_str().unwrap())
        .unwrap();
    let last = signature.len() - 1;
    signature[last] ^= 0x01;
    line["data"]["sign"] = Value::String(STANDARD.encode(&signature));
    session.send(&line.to_string()).await;

    match next_outcome(&mut events).await {
        InboundOutcome::Rejected {
            event_type, error, ..
        } => {
            assert_eq!(event_type, "payment_success");
            assert!(matches!(
                error,
                LinkError::Verification { .. } | LinkError::SignatureFormat(_)
            ));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_forged_event_is_rejected_and_loop_continues() {
    let terminal = Terminal::start().await;
    let link = terminal.link();
    let mut events = link.subscribe();

    let stan_id = link
        .send_payment_request(terminal.order("2000", "id=1"))
        .await
        .unwrap();
    let mut session = terminal.accept().await;
    session.read_request().await;

    // Signed by someone other than the terminal.
    let impostor = Terminal {
        listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
        key: EcPrivateKey::generate(),
    };
    session
        .send(&impostor.success_line(2000, &stan_id, "id=1"))
        .await;
    session
        .send(&terminal.failed_line("Card declined", &stan_id, "id=1"))
        .await;

    match next_outcome(&mut events).await {
        InboundOutcome::Rejected {
            event_type,
            stan_id: rejected,
            error,
        } => {
            assert_eq!(event_type, "payment_success");
            assert_eq!(rejected, stan_id);
            assert!(matches!(error, LinkError::Verification { .. }));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(matches!(
        next_outcome(&mut events).await,
        InboundOutcome::Verified(InboundEvent::Failure(_))
    ));
}

#[tokio::test]
async fn test_garbage_and_unknown_lines_do_not_stop_the_loop() {
    let terminal = Terminal::start().await;
    let link = terminal.link();
    let mut events = link.subscribe();

    let stan_id = link
        .send_payment_request(terminal.order("5", "x"))
        .await
        .unwrap();
    let mut session = terminal.accept().await;
    session.read_request().await;

    session.send(r#"{"type":"status","data":{"ready":true}}"#).await;
    session.send("").await;
    session.send("{not json").await;
    session
        .send(r#"{"type":"payment_failed","data":{"error":"x"}}"#)
        .await;
    session
        .send(&terminal.failed_line("Timeout", &stan_id, "x"))
        .await;

    assert!(matches!(
        next_outcome(&mut events).await,
        InboundOutcome::Malformed(LinkError::Protocol(_))
    ));
    assert!(matches!(
        next_outcome(&mut events).await,
        InboundOutcome::Malformed(LinkError::Protocol(_))
    ));
    let verified = next_outcome(&mut events).await;
    assert_eq!(verified.stan_id(), Some(stan_id.as_str()));
    assert!(matches!(verified, InboundOutcome::Verified(_)));
    assert_eq!(link.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_outcomes_as_stream() {
    let terminal = Terminal::start().await;
    let link = terminal.link();
    let stream = link.subscribe().into_stream();
    tokio::pin!(stream);

    let stan_id = link
        .send_payment_request(terminal.order("7", ""))
        .await
        .unwrap();
    let mut session = terminal.accept().await;
    session.read_request().await;
    session
        .send(&terminal.failed_line("Cancelled", &stan_id, ""))
        .await;

    let outcome = timeout(WAIT, stream.next()).await.unwrap().unwrap();
    assert!(matches!(outcome, InboundOutcome::Verified(_)));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_terminal_close_tears_down() {
    let terminal = Terminal::start().await;
    let link = terminal.link();
    let mut events = link.subscribe();

    link.send_payment_request(terminal.order("1", ""))
        .await
        .unwrap();
    let mut session = terminal.accept().await;
    session.read_request().await;
    drop(session);

    assert_eq!(
        next_outcome(&mut events).await,
        InboundOutcome::Terminated { error: None }
    );
    assert_eq!(link.state(), ConnectionState::Disconnected);

    // The next send opens a fresh connection.
    link.send_payment_request(terminal.order("2", ""))
        .await
        .unwrap();
    let mut session = terminal.accept().await;
    assert_eq!(session.read_request().await["data"]["amount"], 2);
    assert_eq!(link.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_disconnect_interrupts_blocked_read() {
    let terminal = Terminal::start().await;
    let link = terminal.link();
    let mut events = link.subscribe();

    link.send_payment_request(terminal.order("1", ""))
        .await
        .unwrap();
    // Keep the server side open so the reader stays blocked.
    let _session = terminal.accept().await;

    link.disconnect().await;

    assert_eq!(
        next_outcome(&mut events).await,
        InboundOutcome::Terminated { error: None }
    );
    assert_eq!(link.state(), ConnectionState::Disconnected);

    link.disconnect().await;
    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_when_never_connected() {
    let terminal = Terminal::start().await;
    let link = terminal.link();

    link.disconnect().await;
    link.disconnect().await;

    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_idle_timeout_terminates_with_io_error() {
    let terminal = Terminal::start().await;
    let mut config = terminal.config();
    config.read_idle_timeout = Some(Duration::from_millis(100));
    let link = TcpPosLink::over_tcp(config).unwrap();
    let mut events = link.subscribe();

    link.send_payment_request(terminal.order("1", ""))
        .await
        .unwrap();
    let _session = terminal.accept().await;

    match next_outcome(&mut events).await {
        InboundOutcome::Terminated {
            error: Some(LinkError::Io(_)),
        } => {}
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_state_changes_are_observable() {
    let terminal = Terminal::start().await;
    let link = terminal.link();
    let mut state = link.watch_state();
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);

    link.send_payment_request(terminal.order("1", ""))
        .await
        .unwrap();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();

    link.disconnect().await;
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();
}
