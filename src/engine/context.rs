//! Engine context
//!
//! Everything a run shares between the workers, the refill thread and the
//! coordinator, constructed once and handed around behind an `Arc`.

use crate::config::CacheMode;
use crate::device::{DeviceBackend, FeatureDescriptor};
use crate::engine::SubmitMode;
use crate::limiter::{RateLimiter, RateLimits};
use crate::pattern::{Command, Pattern};
use crate::stats::PoolCounters;
use crate::util::buffer::SharedBuffer;
use anyhow::Context;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared state of one run
pub struct EngineContext {
    pub features: FeatureDescriptor,
    pub device: Arc<dyn DeviceBackend>,
    pub buffer: SharedBuffer,
    pub limiter: Option<Arc<RateLimiter>>,
    pub counters: PoolCounters,
    pub cache_mode: CacheMode,
    pub submit_mode: SubmitMode,
    pub debug: bool,
    pattern: Mutex<Box<dyn Pattern>>,
    description: &'static str,
    stop: AtomicBool,
}

impl EngineContext {
    /// Build the context for `workers` workers
    ///
    /// Allocates the shared buffer at the size the (already configured)
    /// pattern asks for. Defaults: no limits, no priming, direct submission.
    pub fn new(
        features: FeatureDescriptor,
        device: Arc<dyn DeviceBackend>,
        pattern: Box<dyn Pattern>,
        workers: usize,
    ) -> crate::Result<Self> {
        let blocks = pattern.buffer_blocks();
        let buffer = SharedBuffer::allocate(blocks, features.lba_shift)
            .with_context(|| format!("Failed to allocate the {}-block command buffer", blocks))?;

        Ok(Self {
            features,
            device,
            buffer,
            limiter: None,
            counters: PoolCounters::new(workers),
            cache_mode: CacheMode::None,
            submit_mode: SubmitMode::Direct,
            debug: false,
            description: pattern.description(),
            pattern: Mutex::new(pattern),
            stop: AtomicBool::new(false),
        })
    }

    /// Install the rate limiter; unlimited runs get none
    pub fn with_limits(mut self, limits: RateLimits) -> crate::Result<Self> {
        self.limiter = if limits.is_unlimited() {
            None
        } else {
            Some(Arc::new(RateLimiter::new(limits)?))
        };
        Ok(self)
    }

    /// Set the cache priming mode, priming the buffer now for `Once`
    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        if cache_mode == CacheMode::Once {
            self.buffer.prime();
        }
        self.cache_mode = cache_mode;
        self
    }

    pub fn with_submit_mode(mut self, submit_mode: SubmitMode) -> Self {
        self.submit_mode = submit_mode;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Number of worker slots
    pub fn workers(&self) -> usize {
        self.counters.len()
    }

    pub fn pattern_description(&self) -> &'static str {
        self.description
    }

    /// Take the next command from the pattern
    ///
    /// The pattern lock is held only for the duration of the call.
    pub fn next_command(&self) -> Command {
        let mut pattern = self.pattern.lock().unwrap_or_else(PoisonError::into_inner);
        pattern.next_command(&self.features)
    }

    /// Ask every worker to stop and release any worker blocked on the limiter
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(limiter) = &self.limiter {
            limiter.shutdown();
        }
    }

    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}
