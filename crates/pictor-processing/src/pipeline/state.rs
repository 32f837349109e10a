use bytes::Bytes;
use pictor_core::{ErrorMetadata, GeneratedVariant, ImageFormat, PipelineError, UploadRequest};
use std::fmt;

use crate::dimension::ValidatedImage;
use crate::sanitize::SanitizedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Received,
    Sniffed,
    DimensionChecked,
    Scanned,
    Sanitized,
    VariantsGenerated,
    Succeeded,
    Rejected,
    Failed,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Sniffed => "sniffed",
            PipelineStage::DimensionChecked => "dimension_checked",
            PipelineStage::Scanned => "scanned",
            PipelineStage::Sanitized => "sanitized",
            PipelineStage::VariantsGenerated => "variants_generated",
            PipelineStage::Succeeded => "succeeded",
            PipelineStage::Rejected => "rejected",
            PipelineStage::Failed => "failed",
        }
    }

    /// Name of the step that runs when leaving this stage, used to report where a
    /// run stopped. Terminal stages run no step.
    pub fn step_name(self) -> &'static str {
        match self {
            PipelineStage::Received => "sniff",
            PipelineStage::Sniffed => "dimension_check",
            PipelineStage::DimensionChecked => "malware_scan",
            PipelineStage::Scanned => "sanitize",
            PipelineStage::Sanitized => "generate_variants",
            PipelineStage::VariantsGenerated => "finalize",
            PipelineStage::Succeeded | PipelineStage::Rejected | PipelineStage::Failed => "none",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineStage::Succeeded | PipelineStage::Rejected | PipelineStage::Failed
        )
    }

    /// Successor on the success path
    pub fn next(self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Received => Some(PipelineStage::Sniffed),
            PipelineStage::Sniffed => Some(PipelineStage::DimensionChecked),
            PipelineStage::DimensionChecked => Some(PipelineStage::Scanned),
            PipelineStage::Scanned => Some(PipelineStage::Sanitized),
            PipelineStage::Sanitized => Some(PipelineStage::VariantsGenerated),
            PipelineStage::VariantsGenerated => Some(PipelineStage::Succeeded),
            PipelineStage::Succeeded | PipelineStage::Rejected | PipelineStage::Failed => None,
        }
    }

    /// Every non-terminal stage may advance to its successor or end in
    /// `Rejected`/`Failed`. Terminal stages have no transitions.
    pub fn can_transition_to(self, to: PipelineStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(to, PipelineStage::Rejected | PipelineStage::Failed) || self.next() == Some(to)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one upload moving through the pipeline. Each state carries exactly
/// what the next step needs.
#[derive(Debug)]
pub enum PipelineState {
    Received(UploadRequest),
    Sniffed {
        request: UploadRequest,
        format: ImageFormat,
    },
    DimensionChecked {
        data: Bytes,
        image: ValidatedImage,
    },
    Scanned {
        data: Bytes,
        image: ValidatedImage,
    },
    Sanitized(SanitizedImage),
    VariantsGenerated(Vec<GeneratedVariant>),
    Succeeded(Vec<GeneratedVariant>),
    /// `at` is the stage the run was in when its step failed
    Rejected {
        at: PipelineStage,
        error: PipelineError,
    },
    Failed {
        at: PipelineStage,
        error: PipelineError,
    },
}

impl PipelineState {
    /// Terminal state for an error raised while in stage `at`.
    pub fn from_error(at: PipelineStage, error: PipelineError) -> Self {
        if error.is_rejection() {
            PipelineState::Rejected { at, error }
        } else {
            PipelineState::Failed { at, error }
        }
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineState::Received(_) => PipelineStage::Received,
            PipelineState::Sniffed { .. } => PipelineStage::Sniffed,
            PipelineState::DimensionChecked { .. } => PipelineStage::DimensionChecked,
            PipelineState::Scanned { .. } => PipelineStage::Scanned,
            PipelineState::Sanitized(_) => PipelineStage::Sanitized,
            PipelineState::VariantsGenerated(_) => PipelineStage::VariantsGenerated,
            PipelineState::Succeeded(_) => PipelineStage::Succeeded,
            PipelineState::Rejected { .. } => PipelineStage::Rejected,
            PipelineState::Failed { .. } => PipelineStage::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_terminal()
    }
}
