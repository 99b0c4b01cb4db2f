use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::plan::{ProjectStructure, TransformationResult, TransformationStatus, ValidationResult};
use crate::queue::{ErrorRecord, ImportService, JobStatus, QueueCounts};
use crate::types::TokenUsage;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub import: ImportService,
}

// Response bodies of the import API (camelCase on the wire)

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationSummary {
    pub status: TransformationStatus,
    pub confidence_score: f64,
    pub validation_errors: Vec<String>,
    pub processing_notes: Vec<String>,
    pub tokens_used: TokenUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResultResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_structure: Option<ProjectStructure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformation: Option<TransformationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl JobResultResponse {
    pub fn completed(result: TransformationResult) -> Self {
        Self {
            success: true,
            project_structure: result.transformed_data,
            transformation: Some(TransformationSummary {
                status: result.status,
                confidence_score: result.confidence_score,
                validation_errors: result.validation_errors,
                processing_notes: result.processing_notes,
                tokens_used: result.tokens_used,
                validation: result.validation,
            }),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            project_structure: None,
            transformation: None,
            error: Some(ErrorBody { message: message.into() }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub queue: QueueCounts,
    pub providers: Vec<String>,
    pub recent_errors: Vec<ErrorRecord>,
}
