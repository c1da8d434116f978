//! Domain types for the normalization core.
//!
//! Everything the recovery pipeline produces is expressed here: the bounded
//! task/material records, the caller-declared expected shape, and the
//! classified parse outcome. All structural leniency lives in the parser;
//! these types are strict.

pub mod error;

pub use error::{GenerationError, GovernError, QuoteError, Result};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Domain Records
// =============================================================================

/// A material line item nested inside a task suggestion.
///
/// Never created standalone; always owned by a [`TaskSuggestion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub price: f64,
}

impl Material {
    /// Assemble a material from a parsed JSON value.
    ///
    /// `name` is required; the numeric fields coerce from quoted strings and
    /// fall back to neutral defaults so one sloppy field does not sink the
    /// whole line item.
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let name = lenient_string(obj.get("name")?)?;
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            quantity: obj.get("quantity").and_then(lenient_f64).unwrap_or(1.0),
            unit: obj
                .get("unit")
                .and_then(lenient_string)
                .unwrap_or_default(),
            price: obj.get("price").and_then(lenient_f64).unwrap_or(0.0),
        })
    }
}

/// Basis on which labor is priced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaborBasis {
    Hour,
    Task,
}

impl LaborBasis {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "hour" | "hourly" => Some(Self::Hour),
            "task" | "per-task" | "per task" => Some(Self::Task),
            _ => None,
        }
    }
}

/// A single recovered task suggestion.
///
/// `description` is the only field required for a Success outcome; absent
/// numeric fields are the caller's responsibility to default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskSuggestion {
    pub title: Option<String>,
    pub description: String,
    pub estimated_duration_minutes: Option<f64>,
    pub labor_price: Option<f64>,
    pub unit_labor_basis: Option<LaborBasis>,
    pub suggested_materials: Vec<Material>,
}

impl TaskSuggestion {
    /// Create a suggestion carrying only a description.
    pub fn from_description(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Assemble a task from a parsed JSON value against a schema.
    ///
    /// Schema-driven: only fields the schema names are read; quoted numerics
    /// are coerced here and nowhere else. Returns None when the required
    /// `description` field is missing or empty.
    pub(crate) fn from_value(value: &Value, schema: &TaskSchema) -> Option<Self> {
        let obj = value.as_object()?;
        let mut task = Self::default();
        for field in schema.fields() {
            let found = field.lookup(obj);
            if field.required && found.is_none() {
                return None;
            }
            match (field.name, field.kind) {
                ("description", FieldKind::String) => {
                    task.description = found.and_then(lenient_string).unwrap_or_default();
                }
                ("title", FieldKind::String) => {
                    task.title = found.and_then(lenient_string).filter(|s| !s.is_empty());
                }
                ("estimatedDurationMinutes", FieldKind::Number) => {
                    task.estimated_duration_minutes = found.and_then(lenient_f64);
                }
                ("laborPrice", FieldKind::Number) => {
                    task.labor_price = found.and_then(lenient_f64);
                }
                ("unitLaborBasis", FieldKind::String) => {
                    task.unit_labor_basis = found
                        .and_then(|v| v.as_str().map(str::to_string))
                        .and_then(|s| LaborBasis::parse(&s));
                }
                ("suggestedMaterials", FieldKind::Materials) => {
                    task.suggested_materials = found
                        .and_then(Value::as_array)
                        .map(|arr| arr.iter().filter_map(Material::from_value).collect())
                        .unwrap_or_default();
                }
                _ => {}
            }
        }
        if task.description.trim().is_empty() {
            return None;
        }
        Some(task)
    }
}

// =============================================================================
// Expected Shape & Schema
// =============================================================================

/// Kind of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Materials,
}

/// A single named field the caller expects in a recovered record
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub aliases: &'static [&'static str],
    pub required: bool,
}

impl FieldSpec {
    /// Find this field in an object, trying aliases in order.
    fn lookup<'v>(&self, obj: &'v serde_json::Map<String, Value>) -> Option<&'v Value> {
        if let Some(v) = obj.get(self.name) {
            return Some(v);
        }
        self.aliases.iter().find_map(|alias| obj.get(*alias))
    }
}

/// The set of named fields expected in a task record
#[derive(Debug, Clone)]
pub struct TaskSchema {
    fields: Vec<FieldSpec>,
}

impl TaskSchema {
    /// The standard task-suggestion schema.
    pub fn task() -> Self {
        Self {
            fields: vec![
                FieldSpec {
                    name: "title",
                    kind: FieldKind::String,
                    aliases: &["name"],
                    required: false,
                },
                FieldSpec {
                    name: "description",
                    kind: FieldKind::String,
                    aliases: &[],
                    required: true,
                },
                FieldSpec {
                    name: "estimatedDurationMinutes",
                    kind: FieldKind::Number,
                    aliases: &["estimatedDuration", "durationMinutes"],
                    required: false,
                },
                FieldSpec {
                    name: "laborPrice",
                    kind: FieldKind::Number,
                    aliases: &["labourPrice", "price"],
                    required: false,
                },
                FieldSpec {
                    name: "unitLaborBasis",
                    kind: FieldKind::String,
                    aliases: &["laborBasis"],
                    required: false,
                },
                FieldSpec {
                    name: "suggestedMaterials",
                    kind: FieldKind::Materials,
                    aliases: &["materials"],
                    required: false,
                },
            ],
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

impl Default for TaskSchema {
    fn default() -> Self {
        Self::task()
    }
}

/// The caller-declared structural form an LLM response is expected to take
#[derive(Debug, Clone)]
pub enum ExpectedShape {
    /// A single task object
    SingleObject(TaskSchema),
    /// An array of task objects, truncated to at most `max_items` elements
    ObjectArray(TaskSchema, usize),
}

impl ExpectedShape {
    /// Single task object with the standard schema
    pub fn single() -> Self {
        Self::SingleObject(TaskSchema::task())
    }

    /// Array of task objects with the standard schema
    pub fn array(max_items: usize) -> Self {
        Self::ObjectArray(TaskSchema::task(), max_items)
    }

    pub fn schema(&self) -> &TaskSchema {
        match self {
            Self::SingleObject(schema) | Self::ObjectArray(schema, _) => schema,
        }
    }
}

// =============================================================================
// Parse Outcome
// =============================================================================

/// A structured value recovered from a raw response
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveredValue {
    Task(TaskSuggestion),
    Tasks(Vec<TaskSuggestion>),
}

impl RecoveredValue {
    pub fn as_task(&self) -> Option<&TaskSuggestion> {
        match self {
            Self::Task(task) => Some(task),
            Self::Tasks(_) => None,
        }
    }

    pub fn as_tasks(&self) -> Option<&[TaskSuggestion]> {
        match self {
            Self::Tasks(tasks) => Some(tasks),
            Self::Task(_) => None,
        }
    }

    /// Apply a transform to every `description` at any depth.
    pub(crate) fn map_descriptions(&mut self, f: impl Fn(&str) -> String) {
        match self {
            Self::Task(task) => task.description = f(&task.description),
            Self::Tasks(tasks) => {
                for task in tasks {
                    task.description = f(&task.description);
                }
            }
        }
    }
}

/// Classified result of running the recovery pipeline over a raw response.
///
/// This is a value, never an exception: every repair-tier failure is
/// recovered internally, and callers branch on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A structurally valid value matching the expected shape
    Success(RecoveredValue),
    /// A usable but incomplete value; the warning should be surfaced
    PartialSuccess(RecoveredValue, String),
    /// No tier recovered a usable structure
    Failure(String),
}

impl ParseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The recovered value, if any
    pub fn value(&self) -> Option<&RecoveredValue> {
        match self {
            Self::Success(value) | Self::PartialSuccess(value, _) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// The warning attached to a partial recovery, if any
    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::PartialSuccess(_, warning) => Some(warning),
            _ => None,
        }
    }
}

// =============================================================================
// JSON Coercion Helpers
// =============================================================================

/// Extract an f64, coercing numeric-looking strings (`"120"` -> 120.0).
///
/// This is the single coercion point for quoted numerics; tiers upstream
/// never rewrite number syntax.
pub(crate) fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Extract a string, coercing bare numbers where unambiguous.
pub(crate) fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_from_value_minimal() {
        let value = json!({"description": "Paint the fence"});
        let task = TaskSuggestion::from_value(&value, &TaskSchema::task()).unwrap();
        assert_eq!(task.description, "Paint the fence");
        assert!(task.title.is_none());
        assert!(task.suggested_materials.is_empty());
    }

    #[test]
    fn test_task_from_value_full() {
        let value = json!({
            "title": "Fence",
            "description": "Paint the fence",
            "estimatedDurationMinutes": 120,
            "laborPrice": 45.5,
            "unitLaborBasis": "hour",
            "suggestedMaterials": [
                {"name": "Paint", "quantity": 2, "unit": "box", "price": 20.0}
            ]
        });
        let task = TaskSuggestion::from_value(&value, &TaskSchema::task()).unwrap();
        assert_eq!(task.title.as_deref(), Some("Fence"));
        assert_eq!(task.estimated_duration_minutes, Some(120.0));
        assert_eq!(task.unit_labor_basis, Some(LaborBasis::Hour));
        assert_eq!(task.suggested_materials.len(), 1);
        assert_eq!(task.suggested_materials[0].name, "Paint");
    }

    #[test]
    fn test_task_requires_description() {
        let value = json!({"title": "No description here"});
        assert!(TaskSuggestion::from_value(&value, &TaskSchema::task()).is_none());

        let blank = json!({"description": "   "});
        assert!(TaskSuggestion::from_value(&blank, &TaskSchema::task()).is_none());
    }

    #[test]
    fn test_numeric_string_coercion_at_assembly() {
        let value = json!({
            "description": "x",
            "estimatedDuration": "120",
            "laborPrice": "45.5"
        });
        let task = TaskSuggestion::from_value(&value, &TaskSchema::task()).unwrap();
        assert_eq!(task.estimated_duration_minutes, Some(120.0));
        assert_eq!(task.labor_price, Some(45.5));
    }

    #[test]
    fn test_non_numeric_field_dropped() {
        let value = json!({"description": "x", "laborPrice": "about forty"});
        let task = TaskSuggestion::from_value(&value, &TaskSchema::task()).unwrap();
        assert!(task.labor_price.is_none());
    }

    #[test]
    fn test_material_defaults() {
        let value = json!({"name": "Screws"});
        let material = Material::from_value(&value).unwrap();
        assert_eq!(material.quantity, 1.0);
        assert_eq!(material.price, 0.0);
        assert_eq!(material.unit, "");
    }

    #[test]
    fn test_material_requires_name() {
        assert!(Material::from_value(&json!({"quantity": 3})).is_none());
        assert!(Material::from_value(&json!("just a string")).is_none());
    }

    #[test]
    fn test_labor_basis_parse() {
        assert_eq!(LaborBasis::parse("Hour"), Some(LaborBasis::Hour));
        assert_eq!(LaborBasis::parse("hourly"), Some(LaborBasis::Hour));
        assert_eq!(LaborBasis::parse("task"), Some(LaborBasis::Task));
        assert_eq!(LaborBasis::parse("per day"), None);
    }

    #[test]
    fn test_outcome_accessors() {
        let task = TaskSuggestion::from_description("x");
        let outcome = ParseOutcome::PartialSuccess(RecoveredValue::Task(task), "partial".into());
        assert!(!outcome.is_success());
        assert!(!outcome.is_failure());
        assert!(outcome.value().is_some());
        assert_eq!(outcome.warning(), Some("partial"));

        let failure = ParseOutcome::Failure("unparseable".into());
        assert!(failure.value().is_none());
    }
}
