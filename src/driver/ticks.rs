//! Tick sources. The driver runs one cycle per tick and stops when the source
//! is exhausted.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

#[async_trait::async_trait]
pub trait TickSource: Send {
    /// Wait for the next tick. `None` ends the loop.
    async fn next_tick(&mut self) -> Option<()>;
}

/// Wall-clock ticks at a fixed period. The first tick fires immediately.
pub struct IntervalTicks {
    interval: Interval,
}

impl IntervalTicks {
    /// Must be called from within a tokio runtime.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        // A slow cycle pushes the schedule back instead of bursting to catch up
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait::async_trait]
impl TickSource for IntervalTicks {
    async fn next_tick(&mut self) -> Option<()> {
        self.interval.tick().await;
        Some(())
    }
}

/// Ticks delivered over a channel; ends when every sender is dropped.
pub struct ChannelTicks {
    rx: mpsc::Receiver<()>,
}

impl ChannelTicks {
    pub fn new(rx: mpsc::Receiver<()>) -> Self {
        Self { rx }
    }

    /// A source that yields exactly `count` ticks, then ends.
    pub fn finite(count: usize) -> Self {
        let (tx, rx) = mpsc::channel(count.max(1));
        for _ in 0..count {
            // Capacity covers every send
            let _ = tx.try_send(());
        }
        Self { rx }
    }
}

#[async_trait::async_trait]
impl TickSource for ChannelTicks {
    async fn next_tick(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

/// Caps another source at a fixed number of ticks.
pub struct LimitedTicks<T> {
    inner: T,
    remaining: usize,
}

impl<T: TickSource> LimitedTicks<T> {
    pub fn new(inner: T, limit: usize) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

#[async_trait::async_trait]
impl<T: TickSource> TickSource for LimitedTicks<T> {
    async fn next_tick(&mut self) -> Option<()> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.inner.next_tick().await
    }
}
