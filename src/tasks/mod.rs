// src/tasks/mod.rs
// Component J task lifecycle: owns the deadline scheduler and escalation
// monitor background loops, and implements the ordered §5 shutdown
// sequence. Grounded in the teacher's `TaskManager` (start/stop handle
// bookkeeping), narrowed to the two tasks this engine actually runs.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::monitor::EscalationMonitor;
use crate::scheduler::DeadlineScheduler;
use crate::state::AppState;

pub struct EngineTasks {
    scheduler_stop: watch::Sender<bool>,
    monitor_stop: watch::Sender<bool>,
    scheduler_join: JoinHandle<()>,
    monitor_join: JoinHandle<()>,
    state: Arc<AppState>,
}

impl EngineTasks {
    /// Spawns the deadline scheduler and escalation monitor loops.
    pub fn spawn(state: Arc<AppState>) -> Self {
        let scheduler = Arc::new(DeadlineScheduler::new(
            state.store.clone(),
            state.aggregator.clone(),
            state.config.redis.scheduler.interval_ms,
            state.config.redis.worker.max_batch,
        ));
        let (scheduler_stop, scheduler_rx) = watch::channel(false);
        let scheduler_join = tokio::spawn(scheduler.run(scheduler_rx));

        let monitor = Arc::new(EscalationMonitor::new(
            state.store.clone(),
            state.outbound.clone(),
            Arc::new(state.config.chats.clone()),
            state.registry.clone(),
            state.silence_clock.clone(),
            state.config,
        ));
        let (monitor_stop, monitor_rx) = watch::channel(false);
        let monitor_join = tokio::spawn(monitor.run(monitor_rx));

        info!("deadline scheduler and escalation monitor started");
        Self {
            scheduler_stop,
            monitor_stop,
            scheduler_join,
            monitor_join,
            state,
        }
    }

    /// §5 ordered shutdown: stop the monitor, flush every pending series,
    /// then stop every per-chat worker, then await the two background
    /// loops. The monitor is cancelled first so it can't race a chat
    /// worker's own shutdown by sending a reminder for a final the worker
    /// is mid-flush on.
    pub async fn shutdown(self) {
        info!("shutting down: stopping escalation monitor");
        let _ = self.monitor_stop.send(true);
        let _ = self.monitor_join.await;

        info!("shutting down: flushing pending series");
        match self.state.aggregator.force_flush_all().await {
            Ok(n) => info!(flushed = n, "pending series flushed"),
            Err(e) => tracing::error!(error = %e, "force_flush_all failed during shutdown"),
        }

        info!("shutting down: stopping deadline scheduler");
        let _ = self.scheduler_stop.send(true);
        let _ = self.scheduler_join.await;

        info!("shutting down: stopping per-chat workers");
        self.state.registry.stop_all().await;
    }
}
