// Derived timeline, complexity, quality and health metrics
//
// Enrichment never touches its input: it clones the structure and only adds
// keys to the clone's metadata map (plus a deadline backfill).

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate};
use serde_json::{json, Value};

use crate::plan::ProjectStructure;

const DATE_LAYOUTS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];
const INCONSISTENCY_PENALTY: f64 = 0.1;

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps, `DD.MM.YYYY` and `DD/MM/YYYY`
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive());
    }
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(raw, layout).ok())
}

fn parse_opt(raw: &Option<String>) -> Option<NaiveDate> {
    raw.as_deref().and_then(normalize_date)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DataEnricher;

impl DataEnricher {
    pub fn new() -> Self {
        Self
    }

    pub fn enrich(&self, project: &ProjectStructure) -> ProjectStructure {
        let mut enriched = project.clone();

        let mut dates = Vec::new();
        let mut inconsistent = 0usize;
        let ranges = project
            .phases
            .iter()
            .map(|p| (&p.start_date, &p.end_date))
            .chain(project.tasks().map(|t| (&t.start_date, &t.end_date)));
        for (start, end) in ranges {
            let (start, end) = (parse_opt(start), parse_opt(end));
            if let (Some(s), Some(e)) = (start, end) {
                if s > e {
                    inconsistent += 1;
                }
            }
            dates.extend(start);
            dates.extend(end);
        }

        let project_start = dates.iter().min().copied();
        let project_end = dates.iter().max().copied();
        let total_duration_days = match (project_start, project_end) {
            (Some(s), Some(e)) => (e - s).num_days(),
            _ => 0,
        };

        let metadata = &mut enriched.metadata;
        if let Some(start) = project_start {
            metadata.insert("projectStart".to_string(), json!(start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = project_end {
            metadata.insert("projectEnd".to_string(), json!(end.format("%Y-%m-%d").to_string()));
        }
        metadata.insert("totalDurationDays".to_string(), json!(total_duration_days));

        let has_deadline = enriched.deadline.as_deref().is_some_and(|d| !d.trim().is_empty());
        if !has_deadline {
            if let Some(end) = project_end {
                enriched.deadline = Some(end.format("%Y-%m-%d").to_string());
                enriched
                    .metadata
                    .insert("deadlineDerived".to_string(), Value::Bool(true));
            }
        }

        let data_quality = data_quality_score(project);
        let responsibles: HashSet<String> = project
            .tasks()
            .flat_map(|t| t.responsible_persons.iter())
            .map(|p| p.name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        let health = (data_quality - INCONSISTENCY_PENALTY * inconsistent as f64).max(0.0);

        let metadata = &mut enriched.metadata;
        metadata.insert("dataQualityScore".to_string(), json!(data_quality));
        metadata.insert(
            "complexityMetrics".to_string(),
            json!({
                "totalPhases": project.phases.len(),
                "totalTasks": project.task_count(),
                "totalResponsibles": responsibles.len(),
            }),
        );
        metadata.insert("dateInconsistencies".to_string(), json!(inconsistent));
        metadata.insert("healthScore".to_string(), json!(health));

        enriched
    }
}

/// Filled / total over title, description and every phase and task name + description
fn data_quality_score(project: &ProjectStructure) -> f64 {
    fn filled(s: &str) -> usize {
        usize::from(!s.trim().is_empty())
    }
    fn filled_opt(s: &Option<String>) -> usize {
        s.as_deref().map(filled).unwrap_or(0)
    }

    let mut total = 2;
    let mut present = filled(&project.title) + filled(&project.description);
    for phase in &project.phases {
        total += 2;
        present += filled(&phase.name) + filled_opt(&phase.description);
        for task in &phase.tasks {
            total += 2;
            present += filled(&task.name) + filled_opt(&task.description);
        }
    }
    present as f64 / total as f64
}
