//! Per-document export state machine.
//!
//! Exactly one export may be in flight per machine. The current phase is
//! published on a watch channel so callers can observe progress.

use crate::error::{ExportError, ExportResult};
use crate::job::ExportPhase;
use tokio::sync::watch;
use tracing::{debug, warn};

pub struct ExportStateMachine {
    phase: watch::Sender<ExportPhase>,
    outcome: watch::Sender<Option<ExportPhase>>,
}

impl ExportStateMachine {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(ExportPhase::Idle);
        let (outcome, _) = watch::channel(None);
        Self { phase, outcome }
    }

    pub fn phase(&self) -> ExportPhase {
        *self.phase.borrow()
    }

    /// Terminal phase (`Done` or `Failed`) of the last finished export.
    ///
    /// Terminal phases pass straight back to Idle, so a phase subscriber
    /// may only ever see the Idle that follows them.
    pub fn last_outcome(&self) -> Option<ExportPhase> {
        *self.outcome.borrow()
    }

    /// Receiver that sees every published phase change.
    pub fn subscribe(&self) -> watch::Receiver<ExportPhase> {
        self.phase.subscribe()
    }

    /// Claims the machine for a new export (Idle -> Rasterizing).
    ///
    /// Fails with `ExportInProgress` if any export is already in flight.
    pub fn try_begin(&self) -> ExportResult<ExportGuard<'_>> {
        let claimed = self.phase.send_if_modified(|phase| {
            if *phase == ExportPhase::Idle {
                *phase = ExportPhase::Rasterizing;
                true
            } else {
                false
            }
        });

        if !claimed {
            debug!(phase = %self.phase(), "Export rejected, machine busy");
            return Err(ExportError::ExportInProgress);
        }
        Ok(ExportGuard { machine: self })
    }

    fn transition(&self, next: ExportPhase) -> ExportResult<()> {
        let mut current = ExportPhase::Idle;
        let moved = self.phase.send_if_modified(|phase| {
            current = *phase;
            if phase.can_transition_to(next) {
                *phase = next;
                true
            } else {
                false
            }
        });

        if moved {
            if matches!(next, ExportPhase::Done | ExportPhase::Failed) {
                self.outcome.send_replace(Some(next));
            }
            debug!(from = %current, to = %next, "Export phase changed");
            Ok(())
        } else {
            Err(ExportError::AssemblyFailure(format!(
                "invalid export transition {} -> {}",
                current, next
            )))
        }
    }
}

impl Default for ExportStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive claim on a machine for one export.
///
/// Dropping the guard before [`ExportGuard::complete`] fails the export and
/// returns the machine to Idle, which covers errors and cancelled futures.
pub struct ExportGuard<'a> {
    machine: &'a ExportStateMachine,
}

impl ExportGuard<'_> {
    pub fn advance(&self, next: ExportPhase) -> ExportResult<()> {
        self.machine.transition(next)
    }

    pub fn phase(&self) -> ExportPhase {
        self.machine.phase()
    }

    /// Assembling -> Done -> Idle.
    pub fn complete(self) -> ExportResult<()> {
        self.machine.transition(ExportPhase::Done)?;
        self.machine.transition(ExportPhase::Idle)?;
        std::mem::forget(self);
        Ok(())
    }
}

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        let phase = self.machine.phase();
        if phase.is_busy() && phase != ExportPhase::Failed {
            if let Err(e) = self.machine.transition(ExportPhase::Failed) {
                warn!("Failed to mark export as failed: {}", e);
            }
        }
        if let Err(e) = self.machine.transition(ExportPhase::Idle) {
            warn!("Failed to return export machine to idle: {}", e);
        }
    }
}
