//! The bridge actor.
//!
//! # Architecture
//!
//! ```text
//! LineSource --reader task--> Input::Line ─┐
//! BridgeHandle --Input::Payment/Snapshot───┤
//! backend tasks --Input::*Completed────────┴──> actor (owns SessionStateMachine)
//!                                                   │
//!                                                   ├──> Broadcaster::publish
//!                                                   └──> ReadingRecorder (optional)
//! ```
//!
//! Only the actor touches the session. Backend calls run on spawned tasks
//! and come back as completion inputs, so a slow backend never stalls line
//! ingestion and the session keeps a single writer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use cardbridge_backend::{BackendClient, PaymentRequest};
use cardbridge_core::constants::DEFAULT_PAYMENT_DESCRIPTION;
use cardbridge_core::{Amount, ApiResponse, CardId};
use cardbridge_hardware::{AnyLineSource, LineSource};
use cardbridge_network::Broadcaster;
use cardbridge_protocol::{Notification, NotificationKind, parse};
use cardbridge_session::{
    BackendRequest, PaymentTicket, SessionSnapshot, SessionStateMachine,
};
use cardbridge_storage::{NewPayment, NewReading, SqliteReadingLogRepository};

use crate::handle::BridgeHandle;
use crate::recorder::ReadingRecorder;

const INPUT_CHANNEL_CAPACITY: usize = 64;

/// Messages consumed by the actor.
#[derive(Debug)]
pub(crate) enum Input {
    Line(String),
    CheckCompleted {
        card_id: CardId,
        response: ApiResponse,
    },
    VerifyCompleted {
        card_id: CardId,
        response: ApiResponse,
    },
    Payment {
        amount: Amount,
        description: Option<String>,
        reply: oneshot::Sender<ApiResponse>,
    },
    PaymentCompleted {
        ticket: PaymentTicket,
        response: ApiResponse,
        reply: oneshot::Sender<ApiResponse>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Card bridge service: session owner, backend dispatcher and publisher.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use cardbridge_backend::MockBackend;
/// use cardbridge_hardware::MockLineSource;
/// use cardbridge_network::Broadcaster;
/// use cardbridge_service::BridgeService;
///
/// # #[tokio::main]
/// # async fn main() {
/// let (source, device) = MockLineSource::new();
/// let broadcaster = Arc::new(Broadcaster::new());
/// let (handle, _task) = BridgeService::new(MockBackend::new(), broadcaster).spawn(source);
///
/// device.send_line("SYSTEM READY").await.unwrap();
/// let snapshot = handle.snapshot().await.unwrap();
/// assert!(!snapshot.verified);
/// # }
/// ```
pub struct BridgeService<B> {
    machine: SessionStateMachine,
    backend: Arc<B>,
    broadcaster: Arc<Broadcaster>,
    recorder: Option<ReadingRecorder>,
}

impl<B: BackendClient> BridgeService<B> {
    pub fn new(backend: B, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            machine: SessionStateMachine::new(),
            backend: Arc::new(backend),
            broadcaster,
            recorder: None,
        }
    }

    /// Override the verified-session TTL.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.machine = SessionStateMachine::builder().with_ttl(ttl).build();
        self
    }

    /// Append readings and payment outcomes to a reading log.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_reading_log(mut self, repo: SqliteReadingLogRepository) -> Self {
        let (recorder, _task) = ReadingRecorder::spawn(repo);
        self.recorder = Some(recorder);
        self
    }

    /// Start the reader and actor tasks.
    ///
    /// Returns a handle for payments and status, and the actor task. The
    /// actor runs until the line source ends and every handle is dropped.
    pub fn spawn(self, source: impl Into<AnyLineSource>) -> (BridgeHandle, JoinHandle<()>) {
        let source = source.into();
        let device = source.status();
        let (tx, rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);

        tokio::spawn(read_lines(source, tx.clone()));

        let weak = tx.downgrade();
        let actor = tokio::spawn(self.run(rx, weak));

        (BridgeHandle::new(tx, device), actor)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Input>, tx: mpsc::WeakSender<Input>) {
        info!(ttl_secs = self.machine.ttl().as_secs(), "Bridge service started");

        while let Some(input) = rx.recv().await {
            match input {
                Input::Line(line) => self.on_line(&line, &tx),
                Input::CheckCompleted { card_id, response } => {
                    if let Some(notification) = self.machine.complete_check(&card_id, response) {
                        self.emit(notification);
                    }
                }
                Input::VerifyCompleted { card_id, response } => {
                    if let Some(notification) =
                        self.machine
                            .complete_verify(&card_id, response, Instant::now())
                    {
                        self.emit(notification);
                    }
                }
                Input::Payment {
                    amount,
                    description,
                    reply,
                } => self.on_payment(amount, description, reply, &tx),
                Input::PaymentCompleted {
                    ticket,
                    response,
                    reply,
                } => {
                    let notification = self.machine.finish_payment(&ticket, &response, Instant::now());
                    self.record_payment(
                        Some(ticket.card_id.clone()),
                        ticket.amount,
                        ticket.description.clone(),
                        &response,
                    );
                    self.emit(notification);
                    let _ = reply.send(response);
                }
                Input::Snapshot { reply } => {
                    let _ = reply.send(self.machine.snapshot(Instant::now()));
                }
            }
        }

        info!("Bridge service stopped");
    }

    fn on_line(&mut self, line: &str, tx: &mpsc::WeakSender<Input>) {
        let event = parse(line);
        trace!(kind = event.kind(), "Device event");

        if let Some(recorder) = &self.recorder {
            recorder.reading(NewReading::from_event(
                &event,
                self.machine.card_id(),
                Utc::now(),
            ));
        }

        for step in self.machine.apply(event, Instant::now()) {
            self.emit(step.notification);
            if let Some(request) = step.request {
                self.dispatch(request, tx);
            }
        }
    }

    fn on_payment(
        &mut self,
        amount: Amount,
        description: Option<String>,
        reply: oneshot::Sender<ApiResponse>,
        tx: &mpsc::WeakSender<Input>,
    ) {
        let description = description.unwrap_or_else(|| DEFAULT_PAYMENT_DESCRIPTION.to_string());

        let ticket = match self
            .machine
            .prepare_payment(amount, description.clone(), Instant::now())
        {
            Ok(ticket) => ticket,
            Err(e) => {
                info!(amount = %amount, reason = %e, "Payment refused");
                let response = ApiResponse::failure(e.to_string());
                self.record_payment(None, amount, description, &response);
                self.emit(e.to_notification());
                let _ = reply.send(response);
                return;
            }
        };

        let Some(tx) = tx.upgrade() else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        debug!(card_id = %ticket.card_id, amount = %amount, "Sending payment to backend");

        tokio::spawn(async move {
            let request = PaymentRequest {
                card_id: ticket.card_id.clone(),
                pin: ticket.pin.clone(),
                amount: ticket.amount,
                description: ticket.description.clone(),
            };
            let response = backend.pay(&request).await;
            let _ = tx
                .send(Input::PaymentCompleted {
                    ticket,
                    response,
                    reply,
                })
                .await;
        });
    }

    /// Run a backend call off the actor and feed the result back.
    fn dispatch(&self, request: BackendRequest, tx: &mpsc::WeakSender<Input>) {
        let Some(tx) = tx.upgrade() else {
            return;
        };
        let backend = Arc::clone(&self.backend);

        tokio::spawn(async move {
            let card_id = request.card_id().clone();
            let response = backend.verify(&card_id, &request.pin()).await;
            let input = match request {
                BackendRequest::CheckCard { .. } => Input::CheckCompleted { card_id, response },
                BackendRequest::Verify { .. } => Input::VerifyCompleted { card_id, response },
            };
            if tx.send(input).await.is_err() {
                debug!("Service stopped before backend result arrived");
            }
        });
    }

    fn emit(&self, notification: Notification) {
        match &notification.kind {
            NotificationKind::Warning { message } => {
                warn!(message = %message, "Session warning");
            }
            NotificationKind::Diagnostic { raw } => {
                warn!(line = %raw, "Unknown device message");
            }
            _ => {
                let delivered = self.broadcaster.publish(&notification);
                debug!(kind = notification.type_name(), delivered, "Notification sent");
            }
        }
    }

    fn record_payment(
        &self,
        card_id: Option<CardId>,
        amount: Amount,
        description: String,
        response: &ApiResponse,
    ) {
        if let Some(recorder) = &self.recorder {
            recorder.payment(NewPayment {
                card_id,
                amount,
                description,
                success: response.success,
                message: response.message.clone(),
                processed_at: Utc::now(),
            });
        }
    }
}

async fn read_lines(mut source: AnyLineSource, tx: mpsc::Sender<Input>) {
    loop {
        match source.next_line().await {
            Ok(line) => {
                if tx.send(Input::Line(line)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                error!(device = source.status().device(), error = %e, "Line source ended");
                return;
            }
        }
    }
}
