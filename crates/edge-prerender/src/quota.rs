//! Tier-based admission control.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use edge_core::TierLimits;

/// The run's total request cap has been reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("total request cap of {cap} reached")]
pub struct QuotaExceeded {
    /// The cap that was hit.
    pub cap: usize,
}

/// Why a request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmitError {
    #[error(transparent)]
    Exceeded(#[from] QuotaExceeded),

    #[error("quota gate closed")]
    Closed,
}

/// Bounded-semaphore admission.
///
/// At most `concurrency` permits are outstanding at once and at most
/// `total_request_cap` are ever handed out. This is an in-flight ceiling plus
/// a lifetime counter, not a rate limiter.
#[derive(Debug)]
pub struct QuotaGate {
    limits: TierLimits,
    semaphore: Arc<Semaphore>,
    admitted: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Proof of admission. Dropping it frees the concurrency slot.
#[derive(Debug)]
pub struct QuotaPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for QuotaPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl QuotaGate {
    /// Create a gate for the given limits.
    pub fn new(limits: TierLimits) -> Self {
        let limits = TierLimits::new(limits.concurrency, limits.total_request_cap);
        Self {
            limits,
            semaphore: Arc::new(Semaphore::new(limits.concurrency)),
            admitted: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Request admission.
    ///
    /// The lifetime slot is claimed first, so a request over the cap is
    /// rejected immediately instead of waiting for a concurrency slot.
    pub async fn admit(&self) -> Result<QuotaPermit, AdmitError> {
        let cap = self.limits.total_request_cap;
        self.admitted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < cap).then_some(n + 1)
            })
            .map_err(|_| QuotaExceeded { cap })?;

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AdmitError::Closed)?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(QuotaPermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Stop admitting. Pending and future `admit` calls fail with `Closed`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Effective limits.
    pub fn limits(&self) -> TierLimits {
        self.limits
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of permits held at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Lifetime slots claimed so far.
    pub fn admitted(&self) -> usize {
        self.admitted.load(Ordering::SeqCst)
    }

    /// Lifetime slots still available.
    pub fn remaining(&self) -> usize {
        self.limits.total_request_cap.saturating_sub(self.admitted())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_total_cap() {
        let gate = QuotaGate::new(TierLimits::new(10, 3));

        let mut permits = Vec::new();
        for _ in 0..3 {
            permits.push(gate.admit().await.unwrap());
        }

        assert_eq!(
            gate.admit().await.unwrap_err(),
            AdmitError::Exceeded(QuotaExceeded { cap: 3 })
        );
        drop(permits);

        // Releasing permits frees concurrency, not lifetime quota.
        assert!(gate.admit().await.is_err());
        assert_eq!(gate.admitted(), 3);
        assert_eq!(gate.remaining(), 0);
    }

    #[tokio::test]
    async fn test_release_frees_slot() {
        let gate = QuotaGate::new(TierLimits::new(1, 10));

        let first = gate.admit().await.unwrap();
        assert_eq!(gate.in_flight(), 1);

        let blocked = tokio::time::timeout(Duration::from_millis(20), gate.admit()).await;
        assert!(blocked.is_err());

        drop(first);
        assert_eq!(gate.in_flight(), 0);

        let second = tokio::time::timeout(Duration::from_millis(20), gate.admit()).await;
        assert!(second.is_ok());
        assert_eq!(gate.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_close_rejects() {
        let gate = QuotaGate::new(TierLimits::new(1, 10));
        gate.close();
        assert_eq!(gate.admit().await.unwrap_err(), AdmitError::Closed);
    }

    #[test]
    fn test_zero_limits_raised() {
        let gate = QuotaGate::new(TierLimits {
            concurrency: 0,
            total_request_cap: 0,
        });
        assert_eq!(gate.limits(), TierLimits::new(1, 1));
    }
}
