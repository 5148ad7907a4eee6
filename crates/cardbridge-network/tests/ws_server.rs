//! Integration tests for the real-time server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rstest::rstest;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use cardbridge_core::{Amount, ApiResponse, CardId};
use cardbridge_network::server::start;
use cardbridge_network::{BridgeControl, Broadcaster, ServerConfig, ServerHandle, ServiceStatus};
use cardbridge_protocol::{Notification, NotificationKind};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Control stub that records payment requests and broadcasts a result.
#[derive(Clone)]
struct RecordingControl {
    broadcaster: Arc<Broadcaster>,
    payments: Arc<Mutex<Vec<(u64, Option<String>)>>>,
}

impl BridgeControl for RecordingControl {
    async fn request_payment(&self, amount: Amount, description: Option<String>) -> ApiResponse {
        self.payments
            .lock()
            .unwrap()
            .push((amount.value(), description));
        let response = ApiResponse::ok(json!({"newBalance": 9000}));
        self.broadcaster
            .publish(&Notification::new(NotificationKind::PaymentProcessed {
                success: true,
                data: response.data_or_empty(),
                message: String::new(),
            }));
        response
    }

    async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            device: "/dev/ttyACM0".to_string(),
            device_connected: true,
            session: None,
        }
    }
}

struct Fixture {
    broadcaster: Arc<Broadcaster>,
    control: RecordingControl,
    server: ServerHandle,
}

async fn fixture() -> Fixture {
    let broadcaster = Arc::new(Broadcaster::new());
    let control = RecordingControl {
        broadcaster: Arc::clone(&broadcaster),
        payments: Arc::new(Mutex::new(Vec::new())),
    };
    let server = start(
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            max_send_queue: 32,
        },
        Arc::clone(&broadcaster),
        control.clone(),
    )
    .await
    .unwrap();
    Fixture {
        broadcaster,
        control,
        server,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn connect(fixture: &Fixture, expected_subscribers: usize) -> Client {
    let url = format!("ws://{}/ws", fixture.server.local_addr());
    let (client, _) = connect_async(url).await.unwrap();
    let broadcaster = Arc::clone(&fixture.broadcaster);
    wait_until(move || broadcaster.len() >= expected_subscribers).await;
    client
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_published_notifications_reach_every_client() {
    let fixture = fixture().await;
    let mut a = connect(&fixture, 1).await;
    let mut b = connect(&fixture, 2).await;

    fixture
        .broadcaster
        .publish(&Notification::new(NotificationKind::CardScanned {
            card_id: CardId::new("RF001234"),
        }));

    for client in [&mut a, &mut b] {
        let value = next_json(client).await;
        assert_eq!(value["type"], "card_scanned");
        assert_eq!(value["cardId"], "RF001234");
        assert!(value["timestamp"].is_string());
    }
}

#[tokio::test]
async fn test_client_notifications_are_relayed() {
    let fixture = fixture().await;
    let mut sender = connect(&fixture, 1).await;
    let mut listener = connect(&fixture, 2).await;

    sender
        .send(Message::Text(
            r#"{"type":"pin_cleared","cardId":null}"#.to_string().into(),
        ))
        .await
        .unwrap();

    let value = next_json(&mut listener).await;
    assert_eq!(value["type"], "pin_cleared");
    assert!(value["cardId"].is_null());
}

#[tokio::test]
async fn test_process_payment_command_runs_payment() {
    let fixture = fixture().await;
    let mut client = connect(&fixture, 1).await;

    client
        .send(Message::Text(
            r#"{"type":"process_payment","amount":1500,"description":"Coffee"}"#
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    let value = next_json(&mut client).await;
    assert_eq!(value["type"], "payment_processed");
    assert_eq!(value["success"], true);
    assert_eq!(
        fixture.control.payments.lock().unwrap().as_slice(),
        &[(1500, Some("Coffee".to_string()))]
    );
}

#[tokio::test]
async fn test_zero_amount_command_is_reported_as_failed_payment() {
    let fixture = fixture().await;
    let mut client = connect(&fixture, 1).await;

    client
        .send(Message::Text(
            r#"{"type":"process_payment","amount":0}"#.to_string().into(),
        ))
        .await
        .unwrap();

    let value = next_json(&mut client).await;
    assert_eq!(value["type"], "payment_processed");
    assert_eq!(value["success"], false);
    assert!(fixture.control.payments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_disconnected_client_is_unsubscribed() {
    let fixture = fixture().await;
    let mut client = connect(&fixture, 1).await;
    client.close(None).await.unwrap();

    let broadcaster = Arc::clone(&fixture.broadcaster);
    wait_until(move || broadcaster.is_empty()).await;
}

#[tokio::test]
async fn test_status_reports_device_and_subscribers() {
    let fixture = fixture().await;
    let _client = connect(&fixture, 1).await;

    let url = format!("http://{}/status", fixture.server.local_addr());
    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();

    assert_eq!(body["device"], "/dev/ttyACM0");
    assert_eq!(body["deviceConnected"], true);
    assert_eq!(body["subscribers"], 1);
    assert!(body["session"].is_null());
}

#[tokio::test]
async fn test_payment_endpoint_validates_amount() {
    let fixture = fixture().await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/payment", fixture.server.local_addr());

    let rejected = client
        .post(&url)
        .json(&json!({"amount": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 400);
    let body: Value = rejected.json().await.unwrap();
    assert_eq!(body["success"], false);

    let accepted = client
        .post(&url)
        .json(&json!({"amount": 2500}))
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), 200);
    let body: Value = accepted.json().await.unwrap();
    assert_eq!(body["data"]["newBalance"], 9000);
    assert_eq!(
        fixture.control.payments.lock().unwrap().as_slice(),
        &[(2500, None)]
    );
}

#[rstest]
#[case(json!({"amount": 0}), 400)]
#[case(json!({"amount": -5}), 422)]
#[case(json!({"amount": "ten"}), 422)]
#[case(json!({"description": "Coffee"}), 422)]
#[tokio::test]
async fn test_payment_endpoint_rejects_bad_body(#[case] body: Value, #[case] expected: u16) {
    let fixture = fixture().await;
    let url = format!("http://{}/payment", fixture.server.local_addr());

    let response = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), expected);
    assert!(fixture.control.payments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let fixture = fixture().await;
    let url = format!("http://{}/status", fixture.server.local_addr());
    let response = reqwest::Client::new()
        .get(&url)
        .header("Origin", "http://pos.example")
        .send()
        .await
        .unwrap();
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}
