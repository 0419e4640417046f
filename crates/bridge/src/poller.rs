//! Background loop serving engine callbacks while connected

use crate::connection::{ConnectionState, StateCell};
use crate::engine::EngineHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Periodic zero-wait engine poll.
///
/// The loop checks the connection state on every tick and exits as soon as
/// disconnection has begun.
pub(crate) struct Poller {
    task: JoinHandle<()>,
}

impl Poller {
    pub fn spawn<H: EngineHandle>(
        runtime: &Handle,
        handle: Arc<H>,
        state: Arc<StateCell>,
        period: Duration,
    ) -> Self {
        let task = runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(interval_ms = period.as_millis() as u64, "Poll loop started");

            loop {
                ticker.tick().await;
                if state.get() >= ConnectionState::Disconnecting {
                    break;
                }
                handle.poll(Duration::ZERO);
            }

            debug!("Poll loop stopped");
        });

        Self { task }
    }

    /// Wait for the loop to observe the state change and exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Poll loop terminated abnormally");
        }
    }
}
