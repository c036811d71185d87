use tokio::sync::mpsc;

use crate::engine::TelemetryValue;
use crate::errors::SubscribeError;
use crate::Result;

/// The subscription output queue: a bounded multi-producer single-consumer
/// channel. Producers block when the consumer (the wire) lags, which is the
/// intended flow control. Within one producer, ordering is FIFO and
/// timestamps are taken at enqueue, so the dequeue sequence is weakly
/// timestamp-ascending.
pub fn value_queue(capacity: usize) -> (ValueSender, ValueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (ValueSender { tx }, ValueReceiver { rx })
}

#[derive(Clone)]
pub struct ValueSender {
    tx: mpsc::Sender<TelemetryValue>,
}

impl ValueSender {
    pub async fn put(&self, value: TelemetryValue) -> Result<()> {
        self.tx
            .send(value)
            .await
            .map_err(|_| SubscribeError::QueueClosed.into())
    }

    pub async fn put_sync(&self) -> Result<()> {
        self.put(TelemetryValue::sync()).await
    }

    pub async fn put_fatal(&self, message: impl Into<String>) {
        // The receiver going away first is fine; there is no one left to
        // tell.
        let _ = self.put(TelemetryValue::fatal(message)).await;
    }
}

pub struct ValueReceiver {
    rx: mpsc::Receiver<TelemetryValue>,
}

impl ValueReceiver {
    /// Next value; `None` once every sender is gone and the queue drained.
    pub async fn get(&mut self) -> Option<TelemetryValue> {
        self.rx.recv().await
    }

    pub fn try_get(&mut self) -> Option<TelemetryValue> {
        self.rx.try_recv().ok()
    }
}
