// Structure validation: required-field completeness and a quality score

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::plan::{Phase, ProjectStructure, Task};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<String>,
    /// Satisfied / checked over every required-field check, in [0, 1]
    pub quality_score: f64,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Required fields of one entity, without descending into children
trait RequiredFields {
    fn required_fields(&self) -> [(&'static str, bool); 2];
}

impl RequiredFields for ProjectStructure {
    fn required_fields(&self) -> [(&'static str, bool); 2] {
        [("title", !self.title.trim().is_empty()), ("phases", !self.phases.is_empty())]
    }
}

impl RequiredFields for Phase {
    fn required_fields(&self) -> [(&'static str, bool); 2] {
        [("id", !self.id.trim().is_empty()), ("name", !self.name.trim().is_empty())]
    }
}

impl RequiredFields for Task {
    fn required_fields(&self) -> [(&'static str, bool); 2] {
        [("id", !self.id.trim().is_empty()), ("name", !self.name.trim().is_empty())]
    }
}

#[derive(Default)]
struct Tally {
    checked: usize,
    satisfied: usize,
    issues: Vec<String>,
}

impl Tally {
    fn check(&mut self, path: &str, entity: &impl RequiredFields) {
        for (field, present) in entity.required_fields() {
            self.checked += 1;
            if present {
                self.satisfied += 1;
            } else if path.is_empty() {
                self.issues.push(format!("{field} is required"));
            } else {
                self.issues.push(format!("{path}.{field} is required"));
            }
        }
    }

    fn score(&self) -> f64 {
        if self.checked == 0 {
            return 0.0;
        }
        self.satisfied as f64 / self.checked as f64
    }
}

#[derive(Debug, Clone)]
pub struct StructureValidator {
    /// Minimum acceptable quality score; lower scores produce a warning
    error_tolerance: f64,
}

impl Default for StructureValidator {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl StructureValidator {
    pub fn new(error_tolerance: f64) -> Self {
        Self {
            error_tolerance: error_tolerance.clamp(0.0, 1.0),
        }
    }

    pub fn error_tolerance(&self) -> f64 {
        self.error_tolerance
    }

    pub fn validate(&self, project: &ProjectStructure) -> ValidationResult {
        let mut tally = Tally::default();
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();

        tally.check("", project);

        let task_ids: HashSet<&str> = project.tasks().map(|t| t.id.trim()).filter(|id| !id.is_empty()).collect();
        let mut seen_phase_ids = HashSet::new();
        let mut seen_task_ids = HashSet::new();
        let mut unassigned = 0;
        let mut undated = 0;

        for (i, phase) in project.phases.iter().enumerate() {
            let phase_path = format!("phases[{i}]");
            tally.check(&phase_path, phase);

            if !phase.id.is_empty() && !seen_phase_ids.insert(phase.id.as_str()) {
                warnings.push(format!("{phase_path}: duplicate phase id '{}'", phase.id));
            }
            if phase.tasks.is_empty() {
                warnings.push(format!("{phase_path} has no tasks"));
            }

            for (j, task) in phase.tasks.iter().enumerate() {
                let task_path = format!("{phase_path}.tasks[{j}]");
                tally.check(&task_path, task);

                if !task.id.is_empty() && !seen_task_ids.insert(task.id.as_str()) {
                    warnings.push(format!("{task_path}: duplicate task id '{}'", task.id));
                }
                for dependency in &task.dependencies {
                    if !task_ids.contains(dependency.trim()) {
                        warnings.push(format!("{task_path}: dependency '{dependency}' does not match any task id"));
                    }
                }
                if task.responsible_persons.is_empty() {
                    unassigned += 1;
                }
                if task.start_date.is_none() && task.end_date.is_none() {
                    undated += 1;
                }
            }
        }

        if project.description.trim().is_empty() {
            suggestions.push("Add a project description".to_string());
        }
        if unassigned > 0 {
            suggestions.push(format!("Assign responsible persons to {unassigned} task(s)"));
        }
        if undated > 0 {
            suggestions.push(format!("Add start or end dates to {undated} task(s)"));
        }

        let quality_score = tally.score();
        if quality_score < self.error_tolerance {
            warnings.push(format!(
                "Quality score {quality_score:.2} is below the configured tolerance {:.2}",
                self.error_tolerance
            ));
        }

        ValidationResult {
            is_valid: tally.issues.is_empty(),
            issues: tally.issues,
            quality_score,
            warnings,
            suggestions,
        }
    }
}
