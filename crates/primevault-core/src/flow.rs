use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Stages an orchestration passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    Initialized,
    Classified,
    Funded,
    Submitted,
    Settled,
    Completed,
}

impl FlowStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Classified => "classified",
            Self::Funded => "funded",
            Self::Submitted => "submitted",
            Self::Settled => "settled",
            Self::Completed => "completed",
        }
    }
}

/// Tracks one deposit or claim through its stages. The current stage names where an
/// aborted flow stopped; the history is handed back with a finished one.
///
/// Deposits go classified -> funded -> submitted -> completed. Claims skip funding and may
/// pass through settled after submission.
#[derive(Debug, Clone)]
pub struct FlowTracker {
    trace_id: String,
    stage: FlowStage,
    history: Vec<FlowStage>,
}

impl FlowTracker {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            stage: FlowStage::Initialized,
            history: Vec::new(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn stage(&self) -> FlowStage {
        self.stage
    }

    /// Stages reached so far, oldest first.
    pub fn stages(&self) -> &[FlowStage] {
        &self.history
    }

    pub fn mark_classified(&mut self) -> Result<(), VaultError> {
        self.advance(FlowStage::Initialized, FlowStage::Classified)
    }

    pub fn mark_funded(&mut self) -> Result<(), VaultError> {
        self.advance(FlowStage::Classified, FlowStage::Funded)
    }

    pub fn mark_submitted(&mut self) -> Result<(), VaultError> {
        match self.stage {
            FlowStage::Funded => self.advance(FlowStage::Funded, FlowStage::Submitted),
            _ => self.advance(FlowStage::Classified, FlowStage::Submitted),
        }
    }

    pub fn mark_settled(&mut self) -> Result<(), VaultError> {
        self.advance(FlowStage::Submitted, FlowStage::Settled)
    }

    pub fn mark_completed(&mut self) -> Result<(), VaultError> {
        match self.stage {
            FlowStage::Settled => self.advance(FlowStage::Settled, FlowStage::Completed),
            _ => self.advance(FlowStage::Submitted, FlowStage::Completed),
        }
    }

    fn advance(&mut self, expected_current: FlowStage, next: FlowStage) -> Result<(), VaultError> {
        if self.stage != expected_current {
            return Err(VaultError::stage_violation(
                expected_current.name(),
                self.stage.name(),
            ));
        }
        self.stage = next;
        self.history.push(next);
        Ok(())
    }
}
