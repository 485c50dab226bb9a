use crate::error::ValidationIssue;
use chrono::NaiveDate;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared type of a survey field. Only dropdowns carry data: their ordered options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "options", rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Dropdown(Vec<String>),
    Checkbox,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerError {
    Invalid,
    NotAnOption,
}

impl FieldType {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Dropdown(_) => "dropdown",
            FieldType::Checkbox => "checkbox",
            FieldType::Date => "date",
        }
    }

    /// Builds a field type from its kind tag and raw option lines.
    /// Options are trimmed and blank lines dropped; they are ignored for non-dropdowns.
    pub fn from_parts(kind: Option<&str>, options: &[String]) -> Result<Self, ValidationIssue> {
        let kind = kind.map(|k| k.trim().to_lowercase());
        match kind.as_deref() {
            Some("text") => Ok(FieldType::Text),
            Some("number") => Ok(FieldType::Number),
            Some("checkbox") => Ok(FieldType::Checkbox),
            Some("date") => Ok(FieldType::Date),
            Some("dropdown") => FieldType::dropdown(options),
            _ => Err(ValidationIssue::MissingFieldType),
        }
    }

    /// Dropdown over the trimmed, non-blank options. At least one must remain.
    pub fn dropdown(options: &[String]) -> Result<Self, ValidationIssue> {
        let options: Vec<String> = options
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if options.is_empty() {
            return Err(ValidationIssue::DropdownWithoutOptions);
        }
        Ok(FieldType::Dropdown(options))
    }

    /// Decodes the persisted `(field_type, field_options)` pair.
    pub fn decode(kind: &str, options: Option<&str>) -> Result<Self, serde_json::Error> {
        match kind {
            "dropdown" => {
                let options: Vec<String> = match options {
                    Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)?,
                    _ => Vec::new(),
                };
                Ok(FieldType::Dropdown(options))
            }
            "text" => Ok(FieldType::Text),
            "number" => Ok(FieldType::Number),
            "checkbox" => Ok(FieldType::Checkbox),
            "date" => Ok(FieldType::Date),
            other => Err(serde_json::Error::custom(format!("unknown field type `{other}`"))),
        }
    }

    /// JSON array persisted in `field_options`; only dropdowns have one.
    pub fn options_json(&self) -> Option<String> {
        match self {
            FieldType::Dropdown(options) => serde_json::to_string(options).ok(),
            _ => None,
        }
    }

    /// Validates a raw answer and returns its canonical stored text.
    /// Blank input is absent (`None`), never an empty string.
    pub fn normalize_answer(&self, raw: Option<&str>) -> Result<Option<String>, AnswerError> {
        let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(None);
        };

        let canonical = match self {
            FieldType::Text => value.to_string(),
            FieldType::Number => {
                let parsed: f64 = value.parse().map_err(|_| AnswerError::Invalid)?;
                if !parsed.is_finite() {
                    return Err(AnswerError::Invalid);
                }
                value.to_string()
            }
            FieldType::Checkbox => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => "true".to_string(),
                "false" | "0" | "no" | "off" => "false".to_string(),
                _ => return Err(AnswerError::Invalid),
            },
            FieldType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map_err(|_| AnswerError::Invalid)?
                .format("%Y-%m-%d")
                .to_string(),
            FieldType::Dropdown(options) => {
                if !options.iter().any(|o| o == value) {
                    return Err(AnswerError::NotAnOption);
                }
                value.to_string()
            }
        };
        Ok(Some(canonical))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SurveyField {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub label: String,
    pub field_type: FieldType,
    pub is_required: bool,
    pub field_order: i64,
}

impl SurveyField {
    /// Normalizes an answer for this field, mapping failures to validation issues.
    pub fn check_answer(&self, raw: Option<&str>) -> Result<Option<String>, ValidationIssue> {
        self.field_type.normalize_answer(raw).map_err(|err| match err {
            AnswerError::Invalid => ValidationIssue::InvalidAnswer(self.id),
            AnswerError::NotAnOption => ValidationIssue::OptionNotAllowed(self.id),
        })
    }
}

/// One stored answer joined with the field it answers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnswerView {
    pub detail_id: Uuid,
    pub response_id: Uuid,
    pub field: SurveyField,
    pub answer_value: Option<String>,
}

/// A field as supplied by the schema editor. `id` is set when editing an existing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDraft {
    pub id: Option<Uuid>,
    pub label: String,
    pub field_type: FieldType,
    pub is_required: bool,
}

impl FieldDraft {
    pub fn new(label: impl Into<String>, field_type: FieldType, is_required: bool) -> Self {
        Self {
            id: None,
            label: label.into(),
            field_type,
            is_required,
        }
    }

    /// Trims the label and cleans dropdown options the way the store keeps them.
    pub fn normalized(self) -> Result<Self, ValidationIssue> {
        let label = self.label.trim().to_string();
        if label.is_empty() {
            return Err(ValidationIssue::EmptyLabel);
        }
        let field_type = match self.field_type {
            FieldType::Dropdown(options) => FieldType::dropdown(&options)?,
            other => other,
        };
        Ok(Self {
            label,
            field_type,
            ..self
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dropdown() -> FieldType {
        FieldType::Dropdown(vec!["Yes".into(), "No".into()])
    }

    #[test]
    fn test_from_parts_requires_type() {
        assert_eq!(
            FieldType::from_parts(None, &[]),
            Err(ValidationIssue::MissingFieldType)
        );
        assert_eq!(
            FieldType::from_parts(Some("rating"), &[]),
            Err(ValidationIssue::MissingFieldType)
        );
        assert_eq!(FieldType::from_parts(Some(" Date "), &[]), Ok(FieldType::Date));
    }

    #[test]
    fn test_dropdown_options_are_cleaned() {
        let options = vec![" A ".to_string(), "".to_string(), "B".to_string(), "  ".to_string()];
        assert_eq!(
            FieldType::from_parts(Some("dropdown"), &options),
            Ok(FieldType::Dropdown(vec!["A".into(), "B".into()]))
        );
        assert_eq!(
            FieldType::from_parts(Some("dropdown"), &["  ".to_string()]),
            Err(ValidationIssue::DropdownWithoutOptions)
        );
    }

    #[test]
    fn test_options_only_persisted_for_dropdown() {
        assert_eq!(FieldType::Text.options_json(), None);
        let json = dropdown().options_json().unwrap();
        assert_eq!(json, r#"["Yes","No"]"#);
        assert_eq!(FieldType::decode("dropdown", Some(json.as_str())).unwrap(), dropdown());
        assert!(FieldType::decode("dropdown", Some("not json")).is_err());
    }

    #[test]
    fn test_blank_answer_is_absent() {
        assert_eq!(FieldType::Number.normalize_answer(Some("   ")), Ok(None));
        assert_eq!(FieldType::Text.normalize_answer(None), Ok(None));
    }

    #[test]
    fn test_typed_answers() {
        assert_eq!(
            FieldType::Number.normalize_answer(Some(" 12.5 ")),
            Ok(Some("12.5".into()))
        );
        assert_eq!(
            FieldType::Number.normalize_answer(Some("twelve")),
            Err(AnswerError::Invalid)
        );
        assert_eq!(
            FieldType::Number.normalize_answer(Some("NaN")),
            Err(AnswerError::Invalid)
        );
        assert_eq!(
            FieldType::Checkbox.normalize_answer(Some("Yes")),
            Ok(Some("true".into()))
        );
        assert_eq!(
            FieldType::Checkbox.normalize_answer(Some("maybe")),
            Err(AnswerError::Invalid)
        );
        assert_eq!(
            FieldType::Date.normalize_answer(Some("2026-02-03")),
            Ok(Some("2026-02-03".into()))
        );
        assert_eq!(
            FieldType::Date.normalize_answer(Some("03/02/2026")),
            Err(AnswerError::Invalid)
        );
    }

    #[test]
    fn test_dropdown_answer_must_be_an_option() {
        assert_eq!(dropdown().normalize_answer(Some("No")), Ok(Some("No".into())));
        assert_eq!(
            dropdown().normalize_answer(Some("Maybe")),
            Err(AnswerError::NotAnOption)
        );
    }

    #[test]
    fn test_draft_validation() {
        assert_eq!(
            FieldDraft::new(" ", FieldType::Text, false).normalized(),
            Err(ValidationIssue::EmptyLabel)
        );
        assert_eq!(
            FieldDraft::new("Choice", FieldType::Dropdown(vec![]), true).normalized(),
            Err(ValidationIssue::DropdownWithoutOptions)
        );
        assert_eq!(
            FieldDraft::new("Choice", FieldType::Dropdown(vec!["  ".into()]), true).normalized(),
            Err(ValidationIssue::DropdownWithoutOptions)
        );
        let draft = FieldDraft::new(" Shift ", FieldType::Dropdown(vec![" Day ".into(), "".into()]), true)
            .normalized()
            .unwrap();
        assert_eq!(draft.label, "Shift");
        assert_eq!(draft.field_type, FieldType::Dropdown(vec!["Day".into()]));
    }

    #[test]
    fn test_unknown_stored_kind_is_rejected() {
        assert_eq!(FieldType::decode("text", None).unwrap(), FieldType::Text);
        assert!(FieldType::decode("rating", None).is_err());
        assert!(FieldType::decode("", None).is_err());
    }
}
