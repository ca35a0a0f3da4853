//! Operation phase tracking.
//!
//! **Architecture**:
//! - `PipelinePhase`: discrete phases of an orchestrator operation
//! - `PhaseTracker`: current phase plus the operation owning it, readable by front-ends
//! - Transitions are checked against `valid_next_phases`

use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::SystemTime;

use crate::models::OperationKind;

/// Phase of the operation currently (or last) running against the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelinePhase {
    /// No operation has run yet, or a new one is about to start
    Idle,

    /// Deploy 1: target device presence check
    Validating,

    /// Deploy 2: boot configuration backup
    BackingUp,

    /// Deploy 3: partitioning and image apply (point of no return)
    Applying,

    /// Deploy 4: boot entry creation
    Finalizing,

    /// ToggleDualBoot: read, change, re-verify
    TogglingDualBoot,

    /// A registered section is running (InstallGpu)
    RunningSection,

    Completed,

    Failed,

    /// Stopped at a safe checkpoint on request
    Cancelled,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Validating => "validating",
            PipelinePhase::BackingUp => "backing-up",
            PipelinePhase::Applying => "applying",
            PipelinePhase::Finalizing => "finalizing",
            PipelinePhase::TogglingDualBoot => "toggling-dual-boot",
            PipelinePhase::RunningSection => "running-section",
            PipelinePhase::Completed => "completed",
            PipelinePhase::Failed => "failed",
            PipelinePhase::Cancelled => "cancelled",
        }
    }

    /// Get all valid phase transitions FROM this phase.
    pub fn valid_next_phases(&self) -> Vec<PipelinePhase> {
        match self {
            PipelinePhase::Idle => vec![
                PipelinePhase::Validating,
                PipelinePhase::TogglingDualBoot,
                PipelinePhase::RunningSection,
                PipelinePhase::Cancelled,
            ],
            PipelinePhase::Validating => vec![PipelinePhase::BackingUp, PipelinePhase::Failed, PipelinePhase::Cancelled],
            PipelinePhase::BackingUp => vec![PipelinePhase::Applying, PipelinePhase::Failed, PipelinePhase::Cancelled],
            // Past the partition commit: cancellation has to wait for finalize
            PipelinePhase::Applying => vec![PipelinePhase::Finalizing, PipelinePhase::Failed],
            // A cancel requested during apply takes effect once finalize is done
            PipelinePhase::Finalizing => vec![
                PipelinePhase::Completed,
                PipelinePhase::Failed,
                PipelinePhase::Cancelled,
            ],
            PipelinePhase::TogglingDualBoot => vec![PipelinePhase::Completed, PipelinePhase::Failed],
            PipelinePhase::RunningSection => vec![
                PipelinePhase::RunningSection,
                PipelinePhase::Completed,
                PipelinePhase::Failed,
                PipelinePhase::Cancelled,
            ],
            PipelinePhase::Completed | PipelinePhase::Failed | PipelinePhase::Cancelled => {
                vec![PipelinePhase::Idle]
            }
        }
    }

    /// Check if a transition to the given phase is valid.
    pub fn can_transition_to(&self, next: PipelinePhase) -> bool {
        self.valid_next_phases().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelinePhase::Completed | PipelinePhase::Failed | PipelinePhase::Cancelled
        )
    }
}

/// Snapshot of the tracker, for front-ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseSnapshot {
    pub phase: PipelinePhase,
    pub operation: Option<OperationKind>,
    pub run_id: Option<u64>,
    pub last_update_time: SystemTime,
}

impl PhaseSnapshot {
    fn idle() -> Self {
        PhaseSnapshot {
            phase: PipelinePhase::Idle,
            operation: None,
            run_id: None,
            last_update_time: SystemTime::now(),
        }
    }
}

/// Shared, checked phase state.
#[derive(Debug)]
pub struct PhaseTracker {
    state: RwLock<PhaseSnapshot>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        PhaseTracker {
            state: RwLock::new(PhaseSnapshot::idle()),
        }
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PhaseSnapshot {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.snapshot().phase
    }

    /// Reset to Idle for a new run. Only the holder of the device lock calls this.
    pub fn begin(&self, operation: OperationKind, run_id: u64) {
        self.write(|state| {
            *state = PhaseSnapshot {
                phase: PipelinePhase::Idle,
                operation: Some(operation),
                run_id: Some(run_id),
                last_update_time: SystemTime::now(),
            };
        });
    }

    /// Attempt to transition to the next phase.
    pub fn transition_to(&self, next: PipelinePhase) -> Result<(), String> {
        let mut result = Ok(());
        self.write(|state| {
            if state.phase.can_transition_to(next) {
                state.phase = next;
                state.last_update_time = SystemTime::now();
            } else {
                result = Err(format!(
                    "Invalid phase transition: {} -> {}",
                    state.phase.as_str(),
                    next.as_str()
                ));
            }
        });
        result
    }

    /// Mark `run_id` failed when its caller went away mid-run.
    ///
    /// Bypasses the transition table; a terminal phase or a newer run is left alone.
    pub fn abandon(&self, run_id: u64) {
        self.write(|state| {
            if state.run_id == Some(run_id) && !state.phase.is_terminal() {
                state.phase = PipelinePhase::Failed;
                state.last_update_time = SystemTime::now();
            }
        });
    }

    fn write<F: FnOnce(&mut PhaseSnapshot)>(&self, change: F) {
        match self.state.write() {
            Ok(mut guard) => change(&mut guard),
            Err(poisoned) => change(&mut poisoned.into_inner()),
        }
    }
}
