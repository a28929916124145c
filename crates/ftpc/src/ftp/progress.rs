//! Transfer progress snapshots.
//!
//! The engine computes a [`TransferProgress`] after every chunk and hands it
//! to the client's [`TransferObserver`]. Rendering (progress bars etc.) is
//! the observer's business.

use crate::ftp::types::{TransferProgress, TransferState, TransferTask};
use std::time::Instant;
use uuid::Uuid;

/// Receives progress snapshots from `get`/`send`.
pub trait TransferObserver: Send {
    fn on_progress(&mut self, progress: &TransferProgress);
}

/// Discards every snapshot.
pub struct NoopObserver;

impl TransferObserver for NoopObserver {
    fn on_progress(&mut self, _progress: &TransferProgress) {}
}

impl<F> TransferObserver for F
where
    F: FnMut(&TransferProgress) + Send,
{
    fn on_progress(&mut self, progress: &TransferProgress) {
        self(progress)
    }
}

/// Running byte count for one file transfer.
pub struct ProgressTracker {
    transfer_id: String,
    task: TransferTask,
    transferred: u64,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(task: &TransferTask) -> Self {
        Self {
            transfer_id: Uuid::new_v4().to_string(),
            task: task.clone(),
            transferred: 0,
            started: Instant::now(),
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn advance(&mut self, bytes: usize) -> TransferProgress {
        self.transferred += bytes as u64;
        self.snapshot(TransferState::InProgress)
    }

    pub fn finish(&self) -> TransferProgress {
        let mut p = self.snapshot(TransferState::Completed);
        p.percent = 100.0;
        p
    }

    pub fn fail(&self) -> TransferProgress {
        self.snapshot(TransferState::Failed)
    }

    fn snapshot(&self, state: TransferState) -> TransferProgress {
        let total_bytes = self.task.total_bytes;
        let transferred = self.transferred;
        let elapsed = self.started.elapsed().as_secs_f64().max(0.001);
        let speed = (transferred as f64 / elapsed) as u64;
        let eta = if speed > 0 {
            total_bytes.map(|t| (t.saturating_sub(transferred) / speed) as u32)
        } else {
            None
        };
        let percent = total_bytes
            .map(|t| {
                if t > 0 {
                    (transferred as f64 / t as f64 * 100.0).min(100.0) as f32
                } else {
                    100.0
                }
            })
            .unwrap_or(0.0);

        TransferProgress {
            transfer_id: self.transfer_id.clone(),
            direction: self.task.direction,
            local_path: self.task.local_path.display().to_string(),
            remote_path: self.task.remote_path.clone(),
            total_bytes,
            transferred_bytes: transferred,
            speed_bps: speed,
            eta_seconds: eta,
            percent,
            state,
        }
    }
}
