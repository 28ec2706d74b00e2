use schemars::JsonSchema;
use schemars::transform::RecursiveTransform;
use serde::{Deserialize, Serialize};

use crate::api::ApiResponse;
use crate::types::{DailySnapshot, ShiftEntry};

/// Strips non-standard numeric `format` annotations from JSON Schemas.
///
/// `schemars` emits values like `"uint"` for Rust integer types. They are not
/// part of JSON Schema and strict validators used by some MCP clients warn
/// about them.
fn strip_non_standard_format(schema: &mut schemars::Schema) {
    let dominated = schema
        .get("format")
        .and_then(|v| v.as_str())
        .is_some_and(|f| {
            matches!(
                f,
                "uint8"
                    | "int8"
                    | "uint16"
                    | "int16"
                    | "uint32"
                    | "int32"
                    | "uint64"
                    | "int64"
                    | "uint"
                    | "int"
                    | "float"
                    | "double"
            )
        });
    if dominated {
        schema.remove("format");
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetDailySnapshotRequest {
    /// Team name, e.g. "관제SO팀".
    pub team: String,

    /// Date in YYYY-MM-DD format. If omitted, uses today in the configured timezone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTeamsRequest {}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ShiftEntryView {
    pub division: String,
    pub name: String,
    pub shift_code: String,
}

impl From<&ShiftEntry> for ShiftEntryView {
    fn from(entry: &ShiftEntry) -> Self {
        Self {
            division: entry.division.clone(),
            name: entry.name.clone(),
            shift_code: entry.shift_code.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[schemars(transform = RecursiveTransform(strip_non_standard_format))]
pub struct SnapshotView {
    pub date: String,
    pub day_shift: Vec<ShiftEntryView>,
    pub night_shift: Vec<ShiftEntryView>,
    pub vacation_shift: Vec<ShiftEntryView>,
    pub on_duty: usize,
}

impl From<&DailySnapshot> for SnapshotView {
    fn from(s: &DailySnapshot) -> Self {
        let view = |entries: &[ShiftEntry]| entries.iter().map(ShiftEntryView::from).collect();
        Self {
            date: s.date.clone(),
            day_shift: view(&s.day_shift),
            night_shift: view(&s.night_shift),
            vacation_shift: view(&s.vacation_shift),
            on_duty: s.day_shift.len() + s.night_shift.len(),
        }
    }
}

/// Either `status = "ok"` with `data`, or `status = "error"` with `message`.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[schemars(transform = RecursiveTransform(strip_non_standard_format))]
pub struct SnapshotResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SnapshotView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&ApiResponse> for SnapshotResponse {
    fn from(response: &ApiResponse) -> Self {
        match response {
            ApiResponse::Data { data } => Self {
                status: "ok".to_string(),
                data: Some(SnapshotView::from(data)),
                message: None,
            },
            ApiResponse::Error { status, message } => Self {
                status: status.to_string(),
                data: None,
                message: Some(message.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[schemars(transform = RecursiveTransform(strip_non_standard_format))]
pub struct TeamSummary {
    pub name: String,
    pub has_legend: bool,
    /// Months with an uploaded roster, as YYYY-MM.
    pub roster_months: Vec<String>,
    pub roster_count: usize,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TeamListResponse {
    pub teams: Vec<TeamSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::serde_json;
    use schemars::schema_for;

    const NON_STANDARD_FORMATS: &[&str] = &[
        "uint8", "int8", "uint16", "int16", "uint32", "int32", "uint64", "int64", "uint", "int",
        "float", "double",
    ];

    fn assert_no_non_standard_formats(value: &serde_json::Value, path: &str) {
        match value {
            serde_json::Value::Object(map) => {
                if let Some(fmt) = map.get("format").and_then(|v| v.as_str()) {
                    assert!(
                        !NON_STANDARD_FORMATS.contains(&fmt),
                        "found non-standard format \"{fmt}\" at {path}/format"
                    );
                }
                for (key, val) in map {
                    assert_no_non_standard_formats(val, &format!("{path}/{key}"));
                }
            }
            serde_json::Value::Array(arr) => {
                for (i, val) in arr.iter().enumerate() {
                    assert_no_non_standard_formats(val, &format!("{path}[{i}]"));
                }
            }
            _ => {}
        }
    }

    #[test]
    fn mcp_schemas_contain_no_non_standard_formats() {
        let schemas: Vec<(&str, schemars::Schema)> = vec![
            ("SnapshotView", schema_for!(SnapshotView)),
            ("SnapshotResponse", schema_for!(SnapshotResponse)),
            ("TeamSummary", schema_for!(TeamSummary)),
        ];

        for (name, schema) in &schemas {
            let value = serde_json::to_value(schema).expect("schema should serialize");
            assert_no_non_standard_formats(&value, &format!("#/{name}"));
        }
    }

    #[test]
    fn error_payload_keeps_message() {
        let response = ApiResponse::Error {
            status: "error",
            message: "날짜 형식은 YYYY-MM-DD 이어야 합니다.".to_string(),
        };
        let converted = SnapshotResponse::from(&response);
        assert_eq!(converted.status, "error");
        assert!(converted.data.is_none());
        assert!(converted.message.unwrap().contains("YYYY-MM-DD"));
    }
}
