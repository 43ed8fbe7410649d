//! Explicitly owned worker-pool handle for parallel partition work.
//!
//! The pool is deliberately not process-global: it is created by whoever owns
//! the partition subsystem, passed by handle to everything that needs it, and
//! torn down with an explicit [`WorkerPool::shutdown`]. Using a pool after
//! shutdown is an error, never a silent no-op.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Error, Result};

/// A resizable handle over a rayon thread pool.
pub struct WorkerPool {
    inner: RwLock<Option<Arc<rayon::ThreadPool>>>,
}

impl WorkerPool {
    /// Builds a pool with `threads` workers. `threads == 0` picks rayon's
    /// default (one per available core).
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(WorkerPool {
            inner: RwLock::new(Some(Arc::new(pool))),
        })
    }

    /// Replaces the pool with one of `threads` workers. In-flight work on the
    /// old pool finishes on the old threads.
    pub fn resize(&self, threads: usize) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        let mut guard = self.inner.write();
        if guard.is_none() {
            return Err(Error::PoolShutdown);
        }
        *guard = Some(Arc::new(pool));
        log::debug!("worker pool resized to {threads} threads");
        Ok(())
    }

    /// The current worker count.
    pub fn threads(&self) -> Result<usize> {
        self.inner
            .read()
            .as_ref()
            .map(|pool| pool.current_num_threads())
            .ok_or(Error::PoolShutdown)
    }

    /// Runs `op` inside the pool, so rayon parallel iterators used by `op`
    /// execute on the pool's workers.
    pub fn install<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        let pool = {
            let guard = self.inner.read();
            guard.as_ref().cloned().ok_or(Error::PoolShutdown)?
            // The handle is cloned out so the lock is not held while working.
        };
        Ok(pool.install(op))
    }

    /// Releases the pool. Every later [`install`](Self::install),
    /// [`resize`](Self::resize), or [`threads`](Self::threads) call fails
    /// with [`Error::PoolShutdown`].
    pub fn shutdown(&self) {
        if self.inner.write().take().is_some() {
            log::debug!("worker pool shut down");
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.read().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_runs_on_the_pool() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.threads().unwrap(), 2);
        let sum: usize = pool.install(|| (0..100).sum()).unwrap();
        assert_eq!(sum, 4950);
    }

    #[test]
    fn resize_swaps_the_pool() {
        let pool = WorkerPool::new(1).unwrap();
        pool.resize(3).unwrap();
        assert_eq!(pool.threads().unwrap(), 3);
    }

    #[test]
    fn shutdown_is_not_silent() {
        let pool = WorkerPool::new(1).unwrap();
        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(matches!(pool.install(|| 1), Err(Error::PoolShutdown)));
        assert!(matches!(pool.resize(2), Err(Error::PoolShutdown)));
        assert!(matches!(pool.threads(), Err(Error::PoolShutdown)));
    }
}
