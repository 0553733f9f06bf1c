use std::fmt;
use std::sync::{Arc, LazyLock};

use floe_error::{DbError, Result};
use rayon::{ThreadPoolBuilder, prelude::*};
use tracing::{debug, warn};

use crate::config::ExecutionConfig;

/// Thread pool for running parallel stages of an operation.
#[derive(Clone)]
pub struct ThreadPool {
    pool: Arc<rayon::ThreadPool>,
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("num_threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl ThreadPool {
    pub fn try_new(num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|idx| format!("floe-thread-{idx}"))
            .build()
            .map_err(|e| DbError::with_source("Failed to build thread pool", Box::new(e)))?;
        debug!(num_threads, "built thread pool");

        Ok(ThreadPool {
            pool: Arc::new(pool),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run a closure inside the pool so rayon parallel iterators use it.
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }

    pub fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        self.pool.install(|| rayon::join(a, b))
    }

    /// Map over items in parallel, keeping input order in the output. The
    /// first error encountered is returned.
    pub fn try_map<T, R, F>(&self, items: Vec<T>, f: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R> + Send + Sync,
    {
        if items.len() <= 1 || self.num_threads() == 1 {
            return items.into_iter().map(f).collect();
        }
        self.pool
            .install(|| items.into_par_iter().map(f).collect::<Result<Vec<_>>>())
    }
}

/// Config and thread pool used when executing table operations.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub config: ExecutionConfig,
    pub pool: ThreadPool,
}

static GLOBAL_CONTEXT: LazyLock<Result<ExecutionContext>> =
    LazyLock::new(|| ExecutionContext::try_new(ExecutionConfig::from_env()));

impl ExecutionContext {
    pub fn try_new(config: ExecutionConfig) -> Result<Self> {
        let pool = ThreadPool::try_new(config.thread_pool_size)?;
        Ok(ExecutionContext { config, pool })
    }

    /// Process wide default context, built on first use.
    pub fn global() -> Result<&'static ExecutionContext> {
        GLOBAL_CONTEXT.as_ref().map_err(|e| {
            warn!(%e, "global execution context unavailable");
            DbError::new("Failed to initialize the global execution context")
                .with_field("error", e.to_string())
        })
    }

    /// Context sharing this pool with a different config.
    pub fn with_config(&self, config: ExecutionConfig) -> Self {
        ExecutionContext {
            config,
            pool: self.pool.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_map_keeps_order() {
        let pool = ThreadPool::try_new(4).unwrap();
        let out = pool
            .try_map((0..100).collect(), |v: i32| Ok(v * 2))
            .unwrap();
        assert_eq!((0..100).map(|v| v * 2).collect::<Vec<_>>(), out);
    }

    #[test]
    fn try_map_returns_error() {
        let pool = ThreadPool::try_new(2).unwrap();
        let res = pool.try_map(vec![1, 2, 3], |v: i32| {
            if v == 2 {
                Err(DbError::new("bad"))
            } else {
                Ok(v)
            }
        });
        assert!(res.is_err());
    }

    #[test]
    fn global_context_builds() {
        let ctx = ExecutionContext::global().unwrap();
        assert!(ctx.pool.num_threads() >= 1);
    }
}
