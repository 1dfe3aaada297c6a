use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::payloads::Heartbeat;
use super::shard::ConnectionEnd;
use super::{OutboundMessage, Session};

/// Per-connection liveness timer. Two states: `Idle` (no tick task) and
/// `Armed` (tick task running). Armed by the Hello handler once the server
/// announces its interval, disarmed on every connection teardown.
///
/// The first tick is delayed by a uniform jitter in `[0, interval)` so a
/// process running many shards doesn't beat on every connection at once.
pub struct HeartbeatMonitor {
    shard_id: u16,
    ack_pending: Arc<AtomicBool>,
    last_sent: Arc<RwLock<Option<Instant>>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl HeartbeatMonitor {
    pub fn new(shard_id: u16) -> HeartbeatMonitor {
        HeartbeatMonitor {
            shard_id,
            ack_pending: Arc::new(AtomicBool::new(false)),
            last_sent: Arc::new(RwLock::new(None)),
            cancel: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn last_sent(&self) -> Option<Instant> {
        *self.last_sent.read()
    }

    /// Clears the pending flag; called on receipt of a heartbeat ack frame.
    pub fn ack(&self) {
        self.ack_pending.store(false, Ordering::SeqCst);
    }

    /// Cancels the tick task. Callable from any state, any number of times.
    pub fn disarm(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn arm(
        &mut self,
        interval: Duration,
        writer: mpsc::Sender<OutboundMessage>,
        session: Arc<RwLock<Session>>,
        interrupt_tx: mpsc::Sender<ConnectionEnd>,
    ) {
        self.disarm();
        self.ack_pending.store(false, Ordering::SeqCst);

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        self.cancel = Some(cancel_tx);

        let shard_id = self.shard_id;
        let ack_pending = Arc::clone(&self.ack_pending);
        let last_sent = Arc::clone(&self.last_sent);

        tokio::spawn(async move {
            let interval_millis = interval.as_millis().max(1) as u64;
            let first = Duration::from_millis(rand::thread_rng().gen_range(0..interval_millis));

            tokio::select! {
                _ = &mut cancel_rx => return,
                _ = sleep(first) => {}
            }

            loop {
                // Still waiting on the previous tick's ack: the connection
                // looks open but the other end has stopped talking.
                if ack_pending.swap(true, Ordering::SeqCst) {
                    warn!(shard_id, "heartbeat ack missed, signalling zombied connection");
                    let _ = interrupt_tx.send(ConnectionEnd::Zombied).await;
                    return;
                }

                let seq = session.read().seq();
                if !beat(&writer, seq).await {
                    warn!(shard_id, "failed to write heartbeat, signalling zombied connection");
                    let _ = interrupt_tx.send(ConnectionEnd::Zombied).await;
                    return;
                }

                *last_sent.write() = Some(Instant::now());
                debug!(shard_id, ?seq, "heartbeat sent");

                tokio::select! {
                    _ = &mut cancel_rx => return,
                    _ = sleep(interval) => {}
                }
            }
        });
    }
}

async fn beat(writer: &mpsc::Sender<OutboundMessage>, seq: Option<u64>) -> bool {
    let (tx, rx) = oneshot::channel();

    let msg = match OutboundMessage::new(Heartbeat::new(seq), tx) {
        Ok(msg) => msg,
        Err(_) => return false,
    };

    if msg.send(writer.clone()).await.is_err() {
        return false;
    }

    matches!(rx.await, Ok(Ok(())))
}

#[cfg(test)]
mod test {
    use super::*;

    struct Fixture {
        monitor: HeartbeatMonitor,
        writer_rx: mpsc::Receiver<OutboundMessage>,
        interrupt_rx: mpsc::Receiver<ConnectionEnd>,
        session: Arc<RwLock<Session>>,
    }

    fn armed(interval: Duration) -> Fixture {
        let (writer_tx, writer_rx) = mpsc::channel(16);
        let (interrupt_tx, interrupt_rx) = mpsc::channel(4);
        let session = Arc::new(RwLock::new(Session::default()));

        let mut monitor = HeartbeatMonitor::new(0);
        monitor.arm(interval, writer_tx, Arc::clone(&session), interrupt_tx);

        Fixture {
            monitor,
            writer_rx,
            interrupt_rx,
            session,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_jittered_within_interval() {
        let interval = Duration::from_millis(41250);
        let start = Instant::now();
        let mut fixture = armed(interval);

        let msg = fixture.writer_rx.recv().await.unwrap();
        assert!(msg.message.contains(r#""op":1"#));
        assert!(Instant::now() - start < interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acked_heartbeats_keep_ticking() {
        let mut fixture = armed(Duration::from_millis(1000));
        fixture.session.write().observe_seq(7);

        for _ in 0..3 {
            let msg = fixture.writer_rx.recv().await.unwrap();
            assert!(msg.message.contains(r#""d":7"#));
            msg.tx.send(Ok(())).unwrap();
            fixture.monitor.ack();
        }

        assert!(fixture.interrupt_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_ack_signals_zombied_once() {
        let mut fixture = armed(Duration::from_millis(1000));

        let msg = fixture.writer_rx.recv().await.unwrap();
        msg.tx.send(Ok(())).unwrap();
        // no ack before the next tick

        let end = fixture.interrupt_rx.recv().await.unwrap();
        assert!(matches!(end, ConnectionEnd::Zombied));

        // the tick task is gone; exactly one signal, no further heartbeats
        assert!(fixture.interrupt_rx.recv().await.is_none());
        assert!(fixture.writer_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_is_idempotent() {
        let mut fixture = armed(Duration::from_millis(1000));

        fixture.monitor.disarm();
        assert!(!fixture.monitor.is_armed());
        fixture.monitor.disarm();

        let mut idle = HeartbeatMonitor::new(1);
        idle.disarm();
    }
}
