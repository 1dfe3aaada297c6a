use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// A rate-limited resource. `Identify` is shared by every shard of one
/// manager; `Commands` is one bucket per shard connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Bucket {
    Identify,
    Commands(u16),
}

#[derive(Clone, Copy, Debug)]
pub struct Quota {
    pub max: u32,
    pub window: Duration,
}

struct BucketState {
    remaining: u32,
    reset_at: Instant,
}

/// Windowed call budgets, contended across shard tasks. This is the only
/// state shared between otherwise-independent shard state machines.
///
/// `acquire` suspends until the bucket has budget. Fairness matters here:
/// five shards waiting on the one-slot identify bucket must be granted in
/// arrival order, which rides on `tokio::sync::Mutex` queueing waiters FIFO.
pub struct Ratelimiter {
    identify: Quota,
    commands: Quota,
    buckets: parking_lot::Mutex<HashMap<Bucket, Arc<Mutex<BucketState>>>>,
}

// The remote service allows 120 gateway commands per connection per minute.
const COMMANDS_PER_MINUTE: u32 = 120;

impl Ratelimiter {
    pub fn new(identify: Quota) -> Ratelimiter {
        Ratelimiter {
            identify: Quota {
                max: identify.max.max(1),
                window: identify.window,
            },
            commands: Quota {
                max: COMMANDS_PER_MINUTE,
                window: Duration::from_secs(60),
            },
            buckets: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Suspends until the bucket grants a slot, then consumes it. Infallible;
    /// the only way out without a permit is cancellation.
    pub async fn acquire(&self, bucket: Bucket) {
        let quota = self.quota(&bucket);

        let state = {
            let mut buckets = self.buckets.lock();
            Arc::clone(buckets.entry(bucket).or_insert_with(|| {
                Arc::new(Mutex::new(BucketState {
                    remaining: quota.max,
                    reset_at: Instant::now() + quota.window,
                }))
            }))
        };

        // Held across the sleep on purpose: later arrivals queue on the lock
        // and are granted in the order they suspended.
        let mut state = state.lock().await;

        // Budget is per fixed window anchored at the refill, not rolling:
        // grants made late in one window and early in the next can cluster
        // at the seam.

        let now = Instant::now();
        if now >= state.reset_at {
            state.remaining = quota.max;
            state.reset_at = now + quota.window;
        }

        if state.remaining == 0 {
            sleep_until(state.reset_at).await;
            state.remaining = quota.max;
            state.reset_at = Instant::now() + quota.window;
        }

        state.remaining -= 1;
    }

    fn quota(&self, bucket: &Bucket) -> Quota {
        match bucket {
            Bucket::Identify => self.identify,
            Bucket::Commands(_) => self.commands,
        }
    }
}
