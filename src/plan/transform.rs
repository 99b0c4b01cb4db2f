// Transformation of raw provider output into a ProjectStructure

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::plan::validate::{StructureValidator, ValidationResult};
use crate::plan::{lenient, ProjectStructure};
use crate::types::{GenerationResult, TokenUsage};

/// Wrapper keys some models put around the plan object
const WRAPPER_KEYS: [&str; 3] = ["project", "projectStructure", "project_structure"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationStatus {
    Success,
    Partial,
    Failed,
    ValidationError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationResult {
    pub transformed_data: Option<ProjectStructure>,
    pub status: TransformationStatus,
    pub confidence_score: f64,
    pub validation_errors: Vec<String>,
    pub processing_notes: Vec<String>,
    pub tokens_used: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
}

#[derive(Debug, Clone)]
pub struct Transformer {
    recovery_enabled: bool,
    validator: StructureValidator,
}

impl Transformer {
    pub fn new(recovery_enabled: bool, validator: StructureValidator) -> Self {
        Self {
            recovery_enabled,
            validator,
        }
    }

    pub fn validator(&self) -> &StructureValidator {
        &self.validator
    }

    /// Parse, validate and classify one generation result. Never panics on bad input.
    pub fn transform(&self, generation: &GenerationResult) -> TransformationResult {
        let mut notes = Vec::new();

        let object = match self.parse_object(&generation.content, &mut notes) {
            Ok(object) => object,
            Err(reason) => return self.failed(generation, reason, notes),
        };

        let object = Value::Object(object);
        notes.extend(lenient::skipped_entities(&object));

        let project: ProjectStructure = match serde_json::from_value(object) {
            Ok(project) => project,
            Err(e) => {
                return self.failed(
                    generation,
                    format!("Output does not match the project structure: {e}"),
                    notes,
                )
            }
        };

        let validation = self.validator.validate(&project);
        let missing_optional = missing_optional_fields(&project);

        let status = if !validation.is_valid {
            TransformationStatus::ValidationError
        } else if !missing_optional.is_empty() {
            notes.push(format!(
                "{} optional field(s) missing: {}",
                missing_optional.len(),
                summarize(&missing_optional)
            ));
            TransformationStatus::Partial
        } else {
            TransformationStatus::Success
        };

        if validation.quality_score < self.validator.error_tolerance() {
            notes.push(format!(
                "Quality score {:.2} is below the error tolerance {:.2}",
                validation.quality_score,
                self.validator.error_tolerance()
            ));
        }

        debug!(
            ?status,
            quality = validation.quality_score,
            issues = validation.issues.len(),
            "Transformed provider output"
        );

        TransformationResult {
            transformed_data: Some(project),
            status,
            confidence_score: (generation.confidence + validation.quality_score) / 2.0,
            validation_errors: validation.issues.clone(),
            processing_notes: notes,
            tokens_used: generation.tokens_used,
            validation: Some(validation),
        }
    }

    fn failed(&self, generation: &GenerationResult, reason: String, mut notes: Vec<String>) -> TransformationResult {
        debug!(reason = %reason, "Provider output could not be transformed");
        notes.push(reason.clone());
        TransformationResult {
            transformed_data: None,
            status: TransformationStatus::Failed,
            confidence_score: generation.confidence / 2.0,
            validation_errors: vec![reason],
            processing_notes: notes,
            tokens_used: generation.tokens_used,
            validation: None,
        }
    }

    fn parse_object(&self, content: &str, notes: &mut Vec<String>) -> Result<Map<String, Value>, String> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err("Provider returned empty content".to_string());
        }

        let value = match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => value,
            Err(e) if !self.recovery_enabled => {
                return Err(format!("Output is not valid JSON: {e}"));
            }
            Err(_) => {
                let candidate = strip_code_fence(trimmed);
                let value = serde_json::from_str::<Value>(candidate)
                    .ok()
                    .or_else(|| {
                        extract_balanced_object(candidate).and_then(|slice| serde_json::from_str(slice).ok())
                    })
                    .or_else(|| {
                        extract_balanced_object(trimmed).and_then(|slice| serde_json::from_str(slice).ok())
                    })
                    .ok_or_else(|| "Output does not contain a JSON object".to_string())?;
                notes.push("Recovered JSON object from surrounding text".to_string());
                value
            }
        };

        match value {
            Value::Object(object) => Ok(unwrap_wrapper(object, notes)),
            other => Err(format!("Expected a JSON object, found {}", json_type(&other))),
        }
    }
}

fn unwrap_wrapper(mut object: Map<String, Value>, notes: &mut Vec<String>) -> Map<String, Value> {
    if object.len() == 1 {
        for key in WRAPPER_KEYS {
            if let Some(Value::Object(_)) = object.get(key) {
                if let Some(Value::Object(inner)) = object.remove(key) {
                    notes.push(format!("Unwrapped plan from \"{key}\" key"));
                    return inner;
                }
            }
        }
    }
    object
}

/// Content between a leading ```/```json fence and the closing fence
fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let rest = rest.trim_end();
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // The language tag ends at the first newline, or at the payload on a one-line fence
    let body = match rest.split_once('\n') {
        Some((_tag, body)) => body,
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    body.trim()
}

/// First `{` through its matching `}`, ignoring braces inside strings
fn extract_balanced_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in content[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn missing_optional_fields(project: &ProjectStructure) -> Vec<String> {
    let mut missing = Vec::new();
    if project.description.trim().is_empty() {
        missing.push("description".to_string());
    }
    if project.deadline.is_none() {
        missing.push("deadline".to_string());
    }
    for (i, phase) in project.phases.iter().enumerate() {
        let optional = [
            ("description", phase.description.is_none()),
            ("startDate", phase.start_date.is_none()),
            ("endDate", phase.end_date.is_none()),
        ];
        missing.extend(
            optional
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(field, _)| format!("phases[{i}].{field}")),
        );
        for (j, task) in phase.tasks.iter().enumerate() {
            let optional = [
                ("description", task.description.is_none()),
                ("startDate", task.start_date.is_none()),
                ("endDate", task.end_date.is_none()),
            ];
            missing.extend(
                optional
                    .iter()
                    .filter(|(_, absent)| *absent)
                    .map(|(field, _)| format!("phases[{i}].tasks[{j}].{field}")),
            );
        }
    }
    missing
}

fn summarize(fields: &[String]) -> String {
    const SHOWN: usize = 5;
    if fields.len() <= SHOWN {
        fields.join(", ")
    } else {
        format!("{}, and {} more", fields[..SHOWN].join(", "), fields.len() - SHOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn generation(content: &str) -> GenerationResult {
        GenerationResult {
            content: content.to_string(),
            tokens_used: TokenUsage::new(10, 5),
            confidence: crate::llm::estimate_confidence(content),
            model: "m".to_string(),
            provider: "p".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn transformer() -> Transformer {
        Transformer::new(true, StructureValidator::default())
    }

    const COMPLETE: &str = r#"{
        "title": "Alpha", "description": "Build it", "deadline": "2025-03-01",
        "phases": [{"id": "p1", "name": "Foundation", "description": "Ground work",
                    "startDate": "2025-01-01", "endDate": "2025-02-01",
                    "tasks": [{"id": "t1", "name": "Dig", "description": "Dig a hole",
                               "startDate": "2025-01-01", "endDate": "2025-01-10"}]}]
    }"#;

    #[test]
    fn test_success_when_everything_present() {
        let result = transformer().transform(&generation(COMPLETE));
        assert_eq!(result.status, TransformationStatus::Success);
        assert_eq!(result.transformed_data.unwrap().title, "Alpha");
        assert_eq!(result.confidence_score, 1.0);
        assert_eq!(result.tokens_used.total, 15);
    }

    #[test]
    fn test_partial_when_optional_fields_missing() {
        let result = transformer().transform(&generation(
            r#"{"title": "Alpha", "phases": [{"id": "p1", "name": "Foundation", "tasks": []}]}"#,
        ));
        assert_eq!(result.status, TransformationStatus::Partial);
        assert!(result.validation_errors.is_empty());
        assert!(result.processing_notes.iter().any(|n| n.contains("optional field(s) missing")));
    }

    #[test]
    fn test_validation_error_keeps_structure() {
        let result = transformer().transform(&generation(r#"{"title": "Alpha", "phases": []}"#));
        assert_eq!(result.status, TransformationStatus::ValidationError);
        assert!(result.transformed_data.is_some());
        assert_eq!(result.validation_errors, vec!["phases is required".to_string()]);
    }

    #[test]
    fn test_failed_on_unparseable_output() {
        let result = transformer().transform(&generation("I could not find a project plan."));
        assert_eq!(result.status, TransformationStatus::Failed);
        assert!(result.transformed_data.is_none());
        assert!(!result.validation_errors.is_empty());

        let result = transformer().transform(&generation("[1, 2, 3]"));
        assert_eq!(result.status, TransformationStatus::Failed);
        assert!(result.validation_errors[0].contains("an array"));
    }

    #[test]
    fn test_recovers_fenced_and_embedded_json() {
        let fenced = format!("```json\n{COMPLETE}\n```");
        let result = transformer().transform(&generation(&fenced));
        assert_eq!(result.status, TransformationStatus::Success);
        assert!(result.processing_notes.iter().any(|n| n.contains("Recovered")));

        let embedded = format!("Here is the plan: {COMPLETE} Let me know if you need more.");
        assert_eq!(transformer().transform(&generation(&embedded)).status, TransformationStatus::Success);
    }

    #[test]
    fn test_recovers_single_line_fence() {
        let one_line = COMPLETE.replace('\n', " ");
        for content in [format!("```json {one_line} ```"), format!("```{one_line}```")] {
            let result = transformer().transform(&generation(&content));
            assert_eq!(result.status, TransformationStatus::Success, "{content}");
            assert_eq!(result.transformed_data.unwrap().phases.len(), 1);
        }
        assert_eq!(strip_code_fence("```json {\"a\": 1} ```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
    }

    #[test]
    fn test_bare_task_names_degrade_instead_of_failing() {
        let result = transformer().transform(&generation(
            r#"{"title": "Alpha", "phases": [{"id": "p1", "name": "Build", "tasks": ["Dig", "Pour"]}]}"#,
        ));
        assert_eq!(result.status, TransformationStatus::ValidationError);
        let project = result.transformed_data.unwrap();
        let names: Vec<&str> = project.phases[0].tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Dig", "Pour"]);
        assert!(result
            .validation_errors
            .contains(&"phases[0].tasks[0].id is required".to_string()));
    }

    #[test]
    fn test_non_object_person_is_skipped_with_note() {
        let result = transformer().transform(&generation(
            r#"{"title": "Alpha", "phases": [{"id": "p1", "name": "Build",
                "tasks": [{"id": "t1", "name": "Dig", "responsiblePersons": [7, {"name": "Ann"}]}]}]}"#,
        ));
        assert_ne!(result.status, TransformationStatus::Failed);
        let project = result.transformed_data.unwrap();
        assert_eq!(project.phases[0].tasks[0].responsible_persons.len(), 1);
        assert!(result
            .processing_notes
            .iter()
            .any(|n| n.starts_with("Skipped phases[0].tasks[0].responsiblePersons[0]")));
    }

    #[test]
    fn test_recovery_disabled_requires_bare_object() {
        let strict = Transformer::new(false, StructureValidator::default());
        let fenced = format!("```json\n{COMPLETE}\n```");
        assert_eq!(strict.transform(&generation(&fenced)).status, TransformationStatus::Failed);
        assert_eq!(strict.transform(&generation(COMPLETE)).status, TransformationStatus::Success);
    }

    #[test]
    fn test_wrapper_key_unwrapped() {
        let wrapped = format!("{{\"project\": {COMPLETE}}}");
        let result = transformer().transform(&generation(&wrapped));
        assert_eq!(result.status, TransformationStatus::Success);
    }

    #[test]
    fn test_balanced_object_ignores_braces_in_strings() {
        let content = r#"noise {"title": "a } tricky \" {", "phases": []} trailing }"#;
        assert_eq!(
            extract_balanced_object(content),
            Some(r#"{"title": "a } tricky \" {", "phases": []}"#)
        );
        assert_eq!(extract_balanced_object("no braces"), None);
        assert_eq!(extract_balanced_object("{ never closed"), None);
    }
}
