//! Export job records and pipeline phases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Phase of the export pipeline for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportPhase {
    Idle,
    Rasterizing,
    Planning,
    Rendering,
    Assembling,
    Done,
    Failed,
}

impl ExportPhase {
    /// Whether the pipeline may move from `self` to `next`.
    pub fn can_transition_to(self, next: ExportPhase) -> bool {
        use ExportPhase::*;
        match (self, next) {
            (Idle, Rasterizing)
            | (Rasterizing, Planning)
            | (Planning, Rendering)
            | (Rendering, Assembling)
            | (Assembling, Done)
            | (Done, Idle)
            | (Failed, Idle) => true,
            (Idle, Failed) => false,
            (_, Failed) => true,
            _ => false,
        }
    }

    /// Phases during which an export is in flight.
    pub fn is_busy(self) -> bool {
        !matches!(self, ExportPhase::Idle)
    }
}

impl fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportPhase::Idle => write!(f, "idle"),
            ExportPhase::Rasterizing => write!(f, "rasterizing"),
            ExportPhase::Planning => write!(f, "planning"),
            ExportPhase::Rendering => write!(f, "rendering"),
            ExportPhase::Assembling => write!(f, "assembling"),
            ExportPhase::Done => write!(f, "done"),
            ExportPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Record of a single export invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    pub job_id: String,
    pub document_name: String,
    pub phase: ExportPhase,
    pub page_count: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
}

impl ExportJob {
    pub fn new(document_name: String) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            document_name,
            phase: ExportPhase::Idle,
            page_count: None,
            created_at: now,
            updated_at: now,
            error: None,
            error_kind: None,
        }
    }

    pub fn enter(&mut self, phase: ExportPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    pub fn mark_complete(&mut self, page_count: usize) {
        self.phase = ExportPhase::Done;
        self.page_count = Some(page_count);
        self.updated_at = Utc::now();
        self.error = None;
        self.error_kind = None;
    }

    pub fn mark_failed(&mut self, kind: &str, error: String) {
        self.phase = ExportPhase::Failed;
        self.updated_at = Utc::now();
        self.error_kind = Some(kind.to_string());
        self.error = Some(error);
    }

    pub fn processing_duration_ms(&self) -> Option<i64> {
        if self.phase == ExportPhase::Done || self.phase == ExportPhase::Failed {
            Some(self.updated_at.signed_duration_since(self.created_at).num_milliseconds())
        } else {
            None
        }
    }
}
