//! Best-effort writer for the reading log.
//!
//! Records are queued without waiting and written in order by one task.
//! A full queue or a failed write is logged and dropped.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use cardbridge_storage::{NewPayment, NewReading, ReadingLogRepository, SqliteReadingLogRepository};

const RECORD_QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
enum Record {
    Reading(NewReading),
    Payment(NewPayment),
}

/// Queue in front of the SQLite reading log.
#[derive(Debug, Clone)]
pub struct ReadingRecorder {
    tx: mpsc::Sender<Record>,
}

impl ReadingRecorder {
    /// Start the writer task.
    pub fn spawn(repo: SqliteReadingLogRepository) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(RECORD_QUEUE_CAPACITY);
        let task = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let result = match &record {
                    Record::Reading(reading) => repo.record_reading(reading).await,
                    Record::Payment(payment) => repo.record_payment(payment).await,
                };
                if let Err(e) = result {
                    warn!(error = %e, "Failed to write reading log");
                }
            }
        });
        (Self { tx }, task)
    }

    pub fn reading(&self, reading: NewReading) {
        self.enqueue(Record::Reading(reading));
    }

    pub fn payment(&self, payment: NewPayment) {
        self.enqueue(Record::Payment(payment));
    }

    fn enqueue(&self, record: Record) {
        if let Err(e) = self.tx.try_send(record) {
            warn!(error = %e, "Reading log queue unavailable, record dropped");
        }
    }
}
