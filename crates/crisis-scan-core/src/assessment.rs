//! Boundary with the language model that produces a second-opinion risk
//! assessment: the prompt it is given and validated parsing of what it
//! returns. The model call itself lives with the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// System prompt for the model's risk classification pass.
pub const RISK_SYSTEM_PROMPT: &str = r#"
You are assisting with risk assessment by classifying language in a therapy
session transcript. You are conservative and err on the side of caution.
You are NOT making clinical decisions; you only flag text for a clinician.

Respond ONLY with valid JSON of the form:

{
  "has_crisis_language": boolean,
  "risk_category": "none" | "passive_SI" | "active_SI" | "harm_others" | "other",
  "evidence_snippets": ["string"]
}

Risk categories:
- "none": No crisis language detected
- "passive_SI": Passive suicidal ideation (e.g., "I wish I wasn't here")
- "active_SI": Active suicidal ideation (e.g., "I want to kill myself")
- "harm_others": Expressed intent to harm others
- "other": Other concerning language that doesn't fit above categories
"#;

/// User prompt wrapping a transcript for the risk classification pass.
pub fn build_risk_user_prompt(transcript: &str) -> String {
    format!(
        r#"Transcript:
{transcript}

Analyze the transcript and fill out the JSON above.
If there is no crisis language, use:

{{
  "has_crisis_language": false,
  "risk_category": "none",
  "evidence_snippets": []
}}"#
    )
}

/// Category the model assigns to the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "passive_SI")]
    PassiveSuicidalIdeation,
    #[serde(rename = "active_SI")]
    ActiveSuicidalIdeation,
    #[serde(rename = "harm_others")]
    HarmOthers,
    #[serde(rename = "other")]
    Other,
}

/// Validated model assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub has_crisis_language: bool,
    pub risk_category: RiskCategory,
    #[serde(default)]
    pub evidence_snippets: Vec<String>,
}

impl RiskAssessment {
    pub fn validate(&self) -> Result<(), AssessmentError> {
        let flagged_category = self.risk_category != RiskCategory::None;
        if self.has_crisis_language != flagged_category {
            return Err(AssessmentError::InconsistentCategory {
                has_crisis_language: self.has_crisis_language,
                risk_category: self.risk_category,
            });
        }
        if self
            .evidence_snippets
            .iter()
            .any(|snippet| snippet.trim().is_empty())
        {
            return Err(AssessmentError::BlankSnippet);
        }
        Ok(())
    }
}

/// Reasons a model response cannot be turned into an assessment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssessmentError {
    #[error("model response was empty")]
    Empty,
    #[error("model response is not valid JSON: {message}")]
    Malformed { message: String },
    #[error("model response does not match the assessment schema: {message}")]
    Schema { message: String },
    #[error("has_crisis_language is {has_crisis_language} but risk_category is {risk_category:?}")]
    InconsistentCategory {
        has_crisis_language: bool,
        risk_category: RiskCategory,
    },
    #[error("evidence snippets must not be blank")]
    BlankSnippet,
}

/// Parse raw model output into a validated assessment.
///
/// Accepts a fenced code block, raw newlines inside strings, truncated
/// output, and JSON5 syntax; anything that still fails the schema is an error.
pub fn parse_assessment(raw: &str) -> Result<RiskAssessment, AssessmentError> {
    let payload = extract_json_payload(raw);
    if payload.is_empty() {
        return Err(AssessmentError::Empty);
    }

    let value = match serde_json::from_str::<serde_json::Value>(&payload) {
        Ok(value) => value,
        Err(strict_err) => {
            let sanitized = sanitize_json_strings(&payload);
            match serde_json::from_str::<serde_json::Value>(&sanitized) {
                Ok(value) => value,
                Err(_) => match json5::from_str::<serde_json::Value>(&sanitized) {
                    Ok(value) => {
                        warn!("model risk assessment needed relaxed JSON parsing");
                        value
                    }
                    Err(_) => {
                        return Err(AssessmentError::Malformed {
                            message: strict_err.to_string(),
                        })
                    }
                },
            }
        }
    };

    let assessment: RiskAssessment =
        serde_json::from_value(value).map_err(|err| AssessmentError::Schema {
            message: err.to_string(),
        })?;
    assessment.validate()?;
    Ok(assessment)
}

fn extract_json_payload(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(stripped) = strip_code_fence(trimmed) {
        return stripped;
    }
    trimmed.to_string()
}

fn strip_code_fence(input: &str) -> Option<String> {
    let mut trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return None;
    }
    trimmed = trimmed.trim_start_matches("```");
    trimmed = trimmed.trim_start_matches(|c: char| c.is_ascii_whitespace());
    if let Some(rest) = trimmed.strip_prefix("json") {
        trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
    }
    let end = trimmed.rfind("```").unwrap_or(trimmed.len());
    Some(trimmed[..end].trim().to_string())
}

/// Escape raw newlines inside string literals and close whatever a truncated
/// response left open.
fn sanitize_json_strings(payload: &str) -> String {
    let mut result = String::with_capacity(payload.len());
    let mut in_string = false;
    let mut escape = false;
    let mut open = Vec::new();

    for ch in payload.chars() {
        if in_string {
            if escape {
                result.push(ch);
                escape = false;
                continue;
            }
            match ch {
                '\\' => {
                    result.push(ch);
                    escape = true;
                }
                '"' => {
                    result.push(ch);
                    in_string = false;
                }
                '\n' => result.push_str("\\n"),
                '\r' => {}
                _ => result.push(ch),
            }
        } else {
            result.push(ch);
            match ch {
                '"' => in_string = true,
                '[' => open.push(']'),
                '{' => open.push('}'),
                ']' | '}' => {
                    open.pop();
                }
                _ => {}
            }
        }
    }

    if in_string {
        result.push('"');
    }
    while let Some(close) = open.pop() {
        result.push(close);
    }

    result
}
