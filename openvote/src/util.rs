use crate::*;
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::Keypair;
use ed25519_dalek::PublicKey;
use ed25519_dalek::SecretKey;
use rand_core::OsRng;
use std::future::Future;
use std::time::Duration;

pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let mut csprng = rand::rngs::OsRng {};
    let Keypair { public, secret } = Keypair::generate(&mut csprng);
    (secret, public)
}

/// A uniformly random, non-zero scalar
pub fn random_scalar() -> Scalar {
    loop {
        let scalar = Scalar::random(&mut OsRng);
        if scalar != Scalar::zero() {
            return scalar;
        }
    }
}

/// Bounded exponential backoff for transient ledger failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt bound is reached.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation, attempt, self.max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn random_scalars_are_fresh() {
        let a = random_scalar();
        let b = random_scalar();
        assert_ne!(a, Scalar::zero());
        assert_ne!(a, b);

        let (secret, public) = generate_keypair();
        assert_eq!(PublicKey::from(&secret), public);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_secs(1));
        assert_eq!(policy.backoff(40), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_only_transient_errors() {
        let policy = RetryPolicy::default();

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32> = policy
            .run("state", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(Error::Connectivity {
                        operation: "state",
                        cause: "connection refused".into(),
                    })
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = policy
            .run("computeTally", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::LedgerRejected {
                    operation: "computeTally",
                    reason: "not owner".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bound() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = policy
            .run("state", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Connectivity {
                    operation: "state",
                    cause: "timeout".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(Error::Connectivity { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
