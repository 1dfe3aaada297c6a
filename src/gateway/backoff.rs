use std::time::Duration;

use rand::Rng;

/// Exponential backoff with full jitter: each delay is drawn uniformly from
/// `[0, min(base * 2^attempt, max)]`.
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

// Past this the ceiling has long since saturated; stop shifting.
const MAX_EXPONENT: u32 = 16;

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Backoff {
        Backoff {
            base,
            max,
            attempt: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn next(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.attempt = (self.attempt + 1).min(MAX_EXPONENT);

        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64))
    }

    fn ceiling(&self) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(self.max)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ceiling_doubles_then_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));

        let mut ceilings = Vec::new();
        for _ in 0..8 {
            ceilings.push(backoff.ceiling());
            backoff.next();
        }

        assert_eq!(ceilings[0], Duration::from_secs(1));
        assert_eq!(ceilings[1], Duration::from_secs(2));
        assert_eq!(ceilings[4], Duration::from_secs(16));
        assert_eq!(ceilings[5], Duration::from_secs(30));
        assert_eq!(ceilings[7], Duration::from_secs(30));
    }

    #[test]
    fn test_next_is_bounded() {
        let max = Duration::from_secs(5);
        let mut backoff = Backoff::new(Duration::from_secs(1), max);

        for _ in 0..50 {
            assert!(backoff.next() <= max);
        }
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        for _ in 0..5 {
            backoff.next();
        }

        backoff.reset();
        assert_eq!(backoff.ceiling(), Duration::from_secs(1));
    }
}
