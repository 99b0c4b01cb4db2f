//! Project Plan Model
//!
//! The structured project plan produced from a document, plus the chain that
//! builds it: prompt construction, transformation of provider output,
//! structure validation and enrichment.
//!
//! Provider output is loosely typed in practice (numeric ids, `null` where a
//! string belongs, a bare name instead of a phase, task or person object), so
//! deserialization goes through the helpers in [`lenient`]. List entries that
//! cannot describe an entity are dropped rather than failing the whole plan.

pub mod enrich;
pub mod prompt;
pub mod transform;
pub mod validate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use enrich::{normalize_date, DataEnricher};
pub use prompt::{BuiltPrompt, PromptBuilder};
pub use transform::{TransformationResult, TransformationStatus, Transformer};
pub use validate::{StructureValidator, ValidationResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStructure {
    #[serde(default, deserialize_with = "lenient::string", alias = "name")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub phases: Vec<Phase>,
    #[serde(default, deserialize_with = "lenient::map")]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string", alias = "title")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        alias = "start_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        alias = "end_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string", alias = "title")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        alias = "start_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        alias = "end_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::seq",
        alias = "responsible_persons",
        alias = "responsible"
    )]
    pub responsible_persons: Vec<ResponsiblePerson>,
    #[serde(default, deserialize_with = "lenient::string_seq")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "lenient::status")]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Planned,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Loose parse of the spellings models tend to produce; anything unknown is `Planned`
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "in_progress" | "inprogress" | "active" | "ongoing" | "started" => Self::InProgress,
            "completed" | "complete" | "done" | "finished" => Self::Completed,
            _ => Self::Planned,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsiblePerson {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub role: String,
    #[serde(default, deserialize_with = "lenient::string", alias = "email")]
    pub contact: String,
}

impl ProjectStructure {
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.phases.iter().flat_map(|phase| phase.tasks.iter())
    }

    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.tasks.len()).sum()
    }
}

pub(crate) mod lenient {
    use std::collections::BTreeMap;

    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::{json, Value};

    use super::TaskStatus;

    fn scalar_to_string(value: Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s.trim().to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(scalar_to_string(Value::deserialize(deserializer)?))
    }

    /// Empty strings and `null` become `None`
    pub fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let s = scalar_to_string(Value::deserialize(deserializer)?);
        Ok((!s.is_empty()).then_some(s))
    }

    pub fn string_seq<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let values = match Value::deserialize(deserializer)? {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        Ok(values
            .into_iter()
            .map(scalar_to_string)
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// Keys a task's responsible persons may arrive under
    const PERSON_KEYS: [&str; 3] = ["responsiblePersons", "responsible_persons", "responsible"];

    /// Objects, or a non-empty string naming the entity
    fn is_entity(item: &Value) -> bool {
        match item {
            Value::Object(_) => true,
            Value::String(name) => !name.trim().is_empty(),
            _ => false,
        }
    }

    fn entity_item(item: Value) -> Option<Value> {
        if !is_entity(&item) {
            return None;
        }
        Some(match item {
            Value::String(name) => json!({ "name": name }),
            object => object,
        })
    }

    /// `null` is an empty list and a lone entry a list of one. A bare string
    /// becomes `{"name": ...}`; entries that still do not deserialize are skipped.
    pub fn seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let items = match Value::deserialize(deserializer)? {
            Value::Array(items) => items,
            Value::Null => return Ok(Vec::new()),
            single => vec![single],
        };
        Ok(items
            .into_iter()
            .filter_map(entity_item)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }

    /// Describe every phase, task or person entry that [`seq`] will drop from a raw plan object
    pub fn skipped_entities(project: &Value) -> Vec<String> {
        let mut skipped = Vec::new();
        for (i, phase) in usable(project.get("phases"), "phases", &mut skipped) {
            let tasks_path = format!("phases[{i}].tasks");
            for (j, task) in usable(phase.get("tasks"), &tasks_path, &mut skipped) {
                let persons = PERSON_KEYS.iter().find_map(|key| task.get(*key));
                usable(persons, &format!("{tasks_path}[{j}].responsiblePersons"), &mut skipped);
            }
        }
        skipped
    }

    fn usable<'a>(field: Option<&'a Value>, path: &str, skipped: &mut Vec<String>) -> Vec<(usize, &'a Value)> {
        let items: Vec<&Value> = match field {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(items)) => items.iter().collect(),
            Some(single) => vec![single],
        };
        let mut kept = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            if is_entity(item) {
                kept.push((index, item));
            } else {
                skipped.push(format!("Skipped {path}[{index}]: expected an object or a name, found {item}"));
            }
        }
        kept
    }

    pub fn map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, Value>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        })
    }

    pub fn status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TaskStatus, D::Error> {
        Ok(TaskStatus::parse(&scalar_to_string(Value::deserialize(deserializer)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_loose_model_output() {
        let project: ProjectStructure = serde_json::from_value(json!({
            "title": "Project Alpha",
            "description": null,
            "deadline": "",
            "phases": [{
                "id": 1,
                "name": "Foundation",
                "start_date": "2025-01-01",
                "endDate": "2025-02-01",
                "tasks": {
                    "id": "t1",
                    "title": "Dig",
                    "responsiblePersons": ["Ann", {"name": "Bob", "role": "Engineer", "email": "bob@example.com"}],
                    "dependencies": [2, "t0"],
                    "status": "In Progress"
                }
            }],
            "metadata": "ignored"
        }))
        .unwrap();

        assert_eq!(project.description, "");
        assert_eq!(project.deadline, None);
        assert!(project.metadata.is_empty());

        let phase = &project.phases[0];
        assert_eq!(phase.id, "1");
        assert_eq!(phase.start_date.as_deref(), Some("2025-01-01"));
        assert_eq!(phase.end_date.as_deref(), Some("2025-02-01"));

        let task = &phase.tasks[0];
        assert_eq!(task.name, "Dig");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.dependencies, vec!["2", "t0"]);
        assert_eq!(task.responsible_persons[0].name, "Ann");
        assert_eq!(task.responsible_persons[1].contact, "bob@example.com");
    }

    #[test]
    fn test_serialize_camel_case() {
        let project = ProjectStructure {
            title: "T".to_string(),
            phases: vec![Phase {
                id: "p1".to_string(),
                name: "P".to_string(),
                start_date: Some("2025-01-01".to_string()),
                tasks: vec![Task {
                    id: "t1".to_string(),
                    name: "Task".to_string(),
                    status: TaskStatus::InProgress,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(&project).unwrap();
        assert_eq!(value["phases"][0]["startDate"], "2025-01-01");
        assert_eq!(value["phases"][0]["tasks"][0]["status"], "in_progress");
        assert!(value.get("deadline").is_none());
    }

    #[test]
    fn test_bare_names_and_junk_entries() {
        let raw = json!({
            "title": "Alpha",
            "phases": [
                "Design",
                42,
                {"id": "p2", "name": "Build", "tasks": ["Dig", "", {"id": "t2", "name": "Pour", "responsible": [7, "Ann"]}]}
            ]
        });
        let skipped = lenient::skipped_entities(&raw);
        let project: ProjectStructure = serde_json::from_value(raw).unwrap();

        assert_eq!(project.phases.len(), 2);
        assert_eq!(project.phases[0].name, "Design");
        assert_eq!(project.phases[0].id, "");
        let tasks = &project.phases[1].tasks;
        assert_eq!(tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["Dig", "Pour"]);
        assert_eq!(tasks[1].responsible_persons.len(), 1);
        assert_eq!(tasks[1].responsible_persons[0].name, "Ann");

        assert_eq!(
            skipped,
            vec![
                "Skipped phases[1]: expected an object or a name, found 42".to_string(),
                "Skipped phases[2].tasks[1]: expected an object or a name, found \"\"".to_string(),
                "Skipped phases[2].tasks[2].responsiblePersons[0]: expected an object or a name, found 7".to_string(),
            ]
        );
    }

    #[test]
    fn test_task_status_parse() {
        assert_eq!(TaskStatus::parse("done"), TaskStatus::Completed);
        assert_eq!(TaskStatus::parse("in-progress"), TaskStatus::InProgress);
        assert_eq!(TaskStatus::parse("whatever"), TaskStatus::Planned);
    }
}
