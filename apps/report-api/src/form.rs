//! Multipart form handling shared by the upload endpoints

use std::collections::HashMap;

use axum::extract::Multipart;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ApiError;

/// One uploaded file
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn has_extension(&self, ext: &str) -> bool {
        self.file_name
            .to_ascii_lowercase()
            .ends_with(&format!(".{}", ext))
    }

    /// `{name, size_bytes, size_mb, content_type}` as echoed in responses
    pub fn meta(&self, default_content_type: &str) -> Value {
        let size_bytes = self.bytes.len();
        let size_mb = (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
        json!({
            "name": self.file_name,
            "size_bytes": size_bytes,
            "size_mb": size_mb,
            "content_type": self.content_type.as_deref().unwrap_or(default_content_type),
        })
    }
}

/// Files and text fields of a multipart body
#[derive(Debug, Default)]
pub struct UploadForm {
    files: HashMap<String, Upload>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Read the whole form, rejecting any single file above `max_file_bytes`
    pub async fn read(multipart: &mut Multipart, max_file_bytes: usize) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?.to_vec();
                    if bytes.len() > max_file_bytes {
                        return Err(ApiError::PayloadTooLarge(format!(
                            "File exceeds the limit of {} MB.",
                            max_file_bytes / (1024 * 1024)
                        )));
                    }
                    debug!(field = %name, file = %file_name, bytes = bytes.len(), "file received");
                    form.files.insert(
                        name,
                        Upload {
                            file_name,
                            content_type,
                            bytes,
                        },
                    );
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// First file present under any of `names`
    pub fn take_file(&mut self, names: &[&str]) -> Option<Upload> {
        names.iter().find_map(|n| self.files.remove(*n))
    }

    /// Trimmed, non-blank text field
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn flag(&self, name: &str) -> bool {
        is_truthy(self.text(name))
    }

    /// Raw `custom_data` field, interpreted by [`parse_custom_data`]
    pub fn custom_data(&self) -> Option<Value> {
        parse_custom_data(self.fields.get("custom_data").map(String::as_str))
    }
}

/// `1`, `true` and `yes` (any case) switch a form flag on
pub fn is_truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

/// Interpret caller metadata.
///
/// A JSON object is kept as is, any other JSON value becomes
/// `{"value": ...}` and text that is not JSON becomes `{"_raw": "..."}`.
/// Absent or empty input yields `None`.
pub fn parse_custom_data(raw: Option<&str>) -> Option<Value> {
    let raw = raw.filter(|r| !r.is_empty())?;
    Some(match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => json!({ "value": other }),
        Err(_) => json!({ "_raw": raw }),
    })
}

/// Same rules for metadata that arrived inside a JSON body
pub fn custom_data_from_json(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => parse_custom_data(Some(&s)),
        Value::Object(map) => Some(Value::Object(map)),
        other => Some(json!({ "value": other })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_custom_data_shapes() {
        assert_eq!(
            parse_custom_data(Some(r#"{"batch": 7}"#)),
            Some(json!({"batch": 7}))
        );
        assert_eq!(parse_custom_data(Some("[1,2]")), Some(json!({"value": [1, 2]})));
        assert_eq!(parse_custom_data(Some("42")), Some(json!({"value": 42})));
        assert_eq!(
            parse_custom_data(Some("batch seven")),
            Some(json!({"_raw": "batch seven"}))
        );
        assert_eq!(parse_custom_data(Some("")), None);
        assert_eq!(parse_custom_data(None), None);
    }

    #[test]
    fn test_custom_data_from_json_body() {
        assert_eq!(custom_data_from_json(Value::Null), None);
        assert_eq!(
            custom_data_from_json(json!(r#"{"a": 1}"#)),
            Some(json!({"a": 1}))
        );
        assert_eq!(custom_data_from_json(json!(true)), Some(json!({"value": true})));
    }

    #[test]
    fn test_truthy_values() {
        for v in ["1", "true", "TRUE", " yes "] {
            assert!(is_truthy(Some(v)), "{v}");
        }
        for v in ["0", "no", "on", ""] {
            assert!(!is_truthy(Some(v)), "{v}");
        }
        assert!(!is_truthy(None));
    }

    #[test]
    fn test_extension_check_ignores_case() {
        let upload = Upload {
            file_name: "Daily Report.PDF".into(),
            content_type: None,
            bytes: vec![0; 3],
        };
        assert!(upload.has_extension("pdf"));
        assert!(!upload.has_extension("csv"));
        assert_eq!(upload.meta("application/pdf")["content_type"], "application/pdf");
    }
}
