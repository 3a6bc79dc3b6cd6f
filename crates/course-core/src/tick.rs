//! Render tick guard for out-of-order async results.
//!
//! Each recompute takes a [`Tick`] when it starts. When its result arrives,
//! the result is applied only if no newer recompute has started since. The
//! guard suppresses the stale result, not the work that produced it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ticket handed out by [`RenderTick::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(u64);

impl Tick {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Shared, monotonically increasing counter. Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct RenderTick {
    counter: Arc<AtomicU64>,
}

impl RenderTick {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new cycle; every earlier tick becomes stale.
    pub fn begin(&self) -> Tick {
        Tick(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> Tick {
        Tick(self.counter.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, tick: Tick) -> bool {
        self.current() == tick
    }
}
