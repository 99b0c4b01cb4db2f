//! Import Pipeline
//!
//! One job's run: extract -> build prompt -> generate -> transform/validate
//! -> enrich. Progress checkpoints are written to the job store as each stage
//! finishes. Validation and extraction failures end the run immediately;
//! provider failures have already been through the fallback chain by the time
//! they surface here.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::extraction::{self, Document, ExtractOptions};
use crate::llm::ProviderOrchestrator;
use crate::plan::{DataEnricher, PromptBuilder, StructureValidator, TransformationResult, TransformationStatus, Transformer};
use crate::queue::jobs::JobStore;
use crate::settings::AiConfig;
use crate::types::{AppError, AppResult};

pub const PROGRESS_EXTRACTED: u8 = 25;
pub const PROGRESS_GENERATED: u8 = 60;
pub const PROGRESS_TRANSFORMED: u8 = 75;
pub const PROGRESS_VALIDATED: u8 = 85;
pub const PROGRESS_ENRICHED: u8 = 95;

pub struct ImportPipeline {
    orchestrator: Arc<ProviderOrchestrator>,
    prompt_builder: PromptBuilder,
    transformer: Transformer,
    enricher: DataEnricher,
    extract_options: ExtractOptions,
}

impl ImportPipeline {
    pub fn new(orchestrator: Arc<ProviderOrchestrator>, config: &AiConfig) -> Self {
        let validator = StructureValidator::new(config.error_handling.error_tolerance);
        Self {
            orchestrator,
            prompt_builder: PromptBuilder::new(&config.processing),
            transformer: Transformer::new(config.error_handling.recovery_enabled, validator),
            enricher: DataEnricher::new(),
            extract_options: ExtractOptions {
                annotate_headers: config.processing.annotate_headers,
            },
        }
    }

    pub fn orchestrator(&self) -> &ProviderOrchestrator {
        &self.orchestrator
    }

    pub async fn run(
        &self,
        job_id: Uuid,
        document: Document,
        store: &JobStore,
        cancel: &CancellationToken,
    ) -> AppResult<TransformationResult> {
        let filename = document.filename.clone();

        let extracted = extraction::extract(document, self.extract_options, cancel).await?;
        store.set_progress(job_id, PROGRESS_EXTRACTED).await;
        info!(job_id = %job_id, stage = "extract", filename = %filename, chars = extracted.text.len(), "Stage complete");

        let built = self.prompt_builder.build(&extracted);
        let generation = self
            .orchestrator
            .generate(&built.options, &built.prompt, cancel)
            .await?;
        store.set_progress(job_id, PROGRESS_GENERATED).await;
        info!(
            job_id = %job_id,
            stage = "generate",
            provider = %generation.provider,
            tokens = generation.tokens_used.total,
            confidence = generation.confidence,
            "Stage complete"
        );

        let mut result = self.transformer.transform(&generation);
        store.set_progress(job_id, PROGRESS_TRANSFORMED).await;
        if result.status == TransformationStatus::Failed {
            let reason = result
                .validation_errors
                .first()
                .cloned()
                .unwrap_or_else(|| "no project structure could be recovered".to_string());
            return Err(AppError::Transformation(reason));
        }

        if let Some(validation) = &result.validation {
            if !validation.warnings.is_empty() || !validation.is_valid {
                warn!(
                    job_id = %job_id,
                    stage = "validate",
                    status = ?result.status,
                    issues = validation.issues.len(),
                    warnings = validation.warnings.len(),
                    quality = validation.quality_score,
                    "Structure has validation findings"
                );
            }
        }
        store.set_progress(job_id, PROGRESS_VALIDATED).await;

        if let Some(project) = &result.transformed_data {
            result.transformed_data = Some(self.enricher.enrich(project));
        }
        store.set_progress(job_id, PROGRESS_ENRICHED).await;

        if !built.notes.is_empty() {
            let mut notes = built.notes;
            notes.append(&mut result.processing_notes);
            result.processing_notes = notes;
        }

        info!(job_id = %job_id, status = ?result.status, confidence = result.confidence_score, "Pipeline finished");
        Ok(result)
    }
}
