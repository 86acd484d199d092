//! Bounded token pool for bootstrap executions.
//!
//! A counting semaphore with a little instrumentation on top. A token is an
//! owned permit: it travels with the unit of work and goes back to the pool
//! when dropped, whether the unit succeeded, failed, panicked or was
//! cancelled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::AgentError;

/// Fixed-size pool of concurrency tokens.
#[derive(Debug, Clone)]
pub struct TokenPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

/// One acquired token. Returned to the pool on drop.
#[derive(Debug)]
pub struct Token {
    _permit: OwnedSemaphorePermit,
    pool: Arc<PoolInner>,
}

impl TokenPool {
    /// Create a pool holding `capacity` tokens (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                in_flight: AtomicUsize::new(0),
                high_water: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a token.
    pub async fn acquire(&self) -> Result<Token, AgentError> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| AgentError::PoolClosed)?;

        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.high_water.fetch_max(now, Ordering::SeqCst);

        Ok(Token {
            _permit: permit,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Close the pool. Waiting and future `acquire` calls fail with
    /// [`AgentError::PoolClosed`]; tokens already held are unaffected.
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.semaphore.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Tokens currently free.
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Tokens currently held.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Largest number of tokens ever held at once.
    pub fn high_water(&self) -> usize {
        self.inner.high_water.load(Ordering::SeqCst)
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.pool.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
