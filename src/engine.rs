//! Caller-owned execution handle for one stage run.
//!
//! The engine owns a dedicated worker pool. It is acquired at stage entry and
//! released when dropped, which covers early returns, errors and unwinding.

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::PipelineError;

pub struct Engine {
    pool: ThreadPool,
    partitions: usize,
}

impl Engine {
    pub fn acquire(config: &EngineConfig) -> Result<Self, PipelineError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("rent-engine-{}", i));
        if let Some(threads) = config.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;
        debug!(
            threads = pool.current_num_threads(),
            partitions = config.partitions,
            "engine acquired"
        );
        Ok(Self {
            pool,
            partitions: config.partitions.max(1),
        })
    }

    /// Runs `op` inside the engine's worker pool.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Minimum rows per parallel task so a table pass splits into roughly
    /// `partitions` pieces.
    pub fn min_rows_per_task(&self, rows: usize) -> usize {
        rows.div_ceil(self.partitions).max(1)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        debug!(threads = self.pool.current_num_threads(), "engine released");
    }
}
