//! Cooperative event pump.
//!
//! Signal callbacks only run when the controller asks for them. A measurement
//! loop calls [`Pump::tick`] between steps (or [`Pump::poll`] when it does not
//! want to wait), so callbacks never interleave with its own remote calls.

use tokio::time::Interval;
use tokio::time::MissedTickBehavior;

use crate::context::Context;
use crate::error::Result;

pub struct Pump {
    ctx: Context,
    interval: Interval,
}

impl Pump {
    /// Must be created inside a tokio runtime. The first tick completes at once.
    pub fn new(ctx: Context) -> Self {
        let mut interval = tokio::time::interval(ctx.settings().pump_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { ctx, interval }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Runs whatever is queued right now.
    pub async fn poll(&self) -> Result<usize> {
        self.ctx.process_events().await
    }

    /// Waits for the next tick, then polls.
    pub async fn tick(&mut self) -> Result<usize> {
        self.interval.tick().await;
        self.poll().await
    }
}
