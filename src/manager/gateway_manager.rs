use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use crate::gateway::{
    Dispatcher, EventForwarder, GatewayError, Identify, Opcode, Phase, Quota, Ratelimiter, Shard,
    ShardInfo,
};
use crate::Result;

use super::{FatalError, Options};

/// Owns one [`Shard`] per id in the configured range, all sharing a single
/// identify budget. Shards run independently; one shard dying does not take
/// the others with it.
pub struct GatewayManager {
    options: Arc<Options>,
    shards: HashMap<u16, Arc<Shard>>,
    error_rx: Mutex<mpsc::Receiver<FatalError>>,
}

impl GatewayManager {
    pub fn new(options: Options, forwarder: Arc<dyn EventForwarder>) -> GatewayManager {
        let options = Arc::new(options);

        let ratelimiter = Arc::new(Ratelimiter::new(Quota {
            max: options.identify_budget_per_window,
            window: Duration::from_millis(options.identify_window_millis),
        }));

        let (error_tx, error_rx) = mpsc::channel(16);

        let mut shards = HashMap::new();
        for shard_id in options.shard_count.ids() {
            let identify = Identify::new(
                options.token.clone(),
                options.large_threshold,
                ShardInfo::new(shard_id, options.shard_count.total),
                options.intents,
            );

            let shard = Shard::new(
                identify,
                Arc::clone(&options),
                Arc::clone(&ratelimiter),
                Dispatcher::with_defaults(),
                Arc::clone(&forwarder),
                error_tx.clone(),
            );

            shards.insert(shard_id, shard);
        }

        GatewayManager {
            options,
            shards,
            error_rx: Mutex::new(error_rx),
        }
    }

    pub fn shard_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.options.shard_count.ids()
    }

    /// Spawns the supervision loop of every shard. Returns immediately;
    /// connections establish in the background, serialized by the identify
    /// budget.
    pub fn connect(&self) {
        for (shard_id, shard) in &self.shards {
            info!(shard_id, "starting shard");
            tokio::spawn(Arc::clone(shard).run());
        }
    }

    /// Sends a command frame on one shard's connection. Fails with
    /// [`GatewayError::ShardUnavailable`] if the shard id is outside this
    /// manager's range or the shard is not in `Ready`.
    pub async fn send<T: Serialize>(&self, shard_id: u16, opcode: Opcode, payload: &T) -> Result<()> {
        let shard = self
            .shards
            .get(&shard_id)
            .ok_or(GatewayError::ShardUnavailable {
                shard_id,
                phase: Phase::Closed,
            })?;

        shard.send_command(opcode, payload).await
    }

    pub fn phase(&self, shard_id: u16) -> Option<Phase> {
        self.shards.get(&shard_id).map(|shard| shard.phase())
    }

    /// Drains the fatal error channel, logging each report. Runs until every
    /// shard's sender half is gone.
    pub async fn run_error_loop(&self) {
        let mut error_rx = self.error_rx.lock().await;

        while let Some(fatal) = error_rx.recv().await {
            error!(shard_id = fatal.shard_id, close_code = ?fatal.close_code, "{fatal}");
        }
    }

    /// Asks every shard to shut down. Idempotent.
    pub fn shutdown(&self) {
        for shard in self.shards.values() {
            shard.kill();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gateway::NoopEventForwarder;
    use crate::manager::{ShardCount, ZombieAction};
    use serde_json::json;

    fn manager() -> GatewayManager {
        GatewayManager::new(
            Options {
                token: "test-token".to_owned(),
                shard_count: ShardCount {
                    total: 2,
                    lowest: 0,
                    highest: 2,
                },
                intents: 0,
                large_threshold: None,
                gateway_url: "wss://gateway.example.com".to_owned(),
                identify_budget_per_window: 1,
                identify_window_millis: 5000,
                max_reconnect_backoff_millis: 30_000,
                max_reconnect_attempts: 3,
                heartbeat_zombie_action: ZombieAction::ForceReconnect,
            },
            Arc::new(NoopEventForwarder),
        )
    }

    #[tokio::test]
    async fn test_send_to_unknown_shard() {
        let manager = manager();

        let err = manager
            .send(7, Opcode::PresenceUpdate, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ShardUnavailable { shard_id: 7, .. }
        ));
    }

    #[tokio::test]
    async fn test_send_to_unready_shard() {
        let manager = manager();
        assert_eq!(manager.phase(0), Some(Phase::Connecting));

        let err = manager
            .send(0, Opcode::PresenceUpdate, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ShardUnavailable {
                shard_id: 0,
                phase: Phase::Connecting,
            }
        ));
    }

    #[test]
    fn test_manages_configured_range() {
        let manager = manager();
        assert_eq!(manager.shard_ids().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(manager.phase(2), None);
    }
}
