//! Progress snapshots for callbacks and subscribers
//!
//! ```text
//! MigrationOrchestrator ──► ProgressCallback (synchronous, per run)
//!          │
//!          └─► ProgressHub (broadcast per run id) ──► SSE / CLI subscribers
//! ```

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use domain::{MigrationPlan, MigrationProgress, StageKind, StepStatus};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Synchronous push callback invoked on every status or progress change
pub type ProgressCallback = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub plan_id: Uuid,
    /// Stage that changed; `None` for run-level events
    pub stage: Option<StageKind>,
    pub step_status: Option<StepStatus>,
    pub step_progress: u8,
    /// Mean of all step progress values
    pub overall_progress: f64,
    pub progress: MigrationProgress,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn from_plan(plan: &MigrationPlan, stage: Option<StageKind>, progress: &MigrationProgress) -> Self {
        let step = stage.and_then(|kind| plan.step(kind));
        Self {
            plan_id: plan.id,
            stage,
            step_status: step.map(|s| s.status),
            step_progress: step.map_or(0, |s| s.progress),
            overall_progress: plan.overall_progress(),
            progress: progress.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast channels keyed by migration run id
pub struct ProgressHub {
    channels: DashMap<Uuid, broadcast::Sender<ProgressUpdate>>,
    channel_capacity: usize,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ProgressHub {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub fn subscribe(&self, run_id: Uuid) -> broadcast::Receiver<ProgressUpdate> {
        self.channels
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe()
    }

    /// Returns the number of subscribers that received the update
    pub fn publish(&self, update: ProgressUpdate) -> usize {
        let Some(sender) = self.channels.get(&update.plan_id) else {
            return 0;
        };
        match sender.send(update) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("progress update dropped, no subscribers");
                0
            }
        }
    }

    /// Drop the channel; subscribers see `Closed` after the buffered updates
    pub fn close(&self, run_id: Uuid) {
        self.channels.remove(&run_id);
    }

    pub fn active_runs(&self) -> usize {
        self.channels.len()
    }
}
