use serde::Deserialize;
use serde_json::Value;

use super::RenderError;

/// Structured resume payload carried in a job's `resume_data`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeDocument {
    pub basics: Basics,
    #[serde(default)]
    pub work: Vec<Work>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub skills: Vec<SkillGroup>,
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Basics {
    pub name: String,
    pub label: Option<String>,
    pub summary: Option<String>,
    pub contact: Contact,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub network: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Work {
    pub company: String,
    pub position: String,
    pub location: Option<String>,
    pub start_date: String,
    pub end_date: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    pub institution: String,
    pub degree: String,
    pub area: Option<String>,
    pub score: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkillGroup {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

impl ResumeDocument {
    /// Parses a job payload. Fails when the payload cannot fill the template.
    pub fn from_payload(payload: &Value) -> Result<Self, RenderError> {
        if !payload.is_object() {
            return Err(RenderError::NotAnObject(json_kind(payload)));
        }

        let document = Self::deserialize(payload)?;
        if document.basics.name.trim().is_empty() {
            return Err(RenderError::Empty("basics.name"));
        }
        Ok(document)
    }
}

/// `meta.code` of a raw payload, if present.
pub fn meta_code(payload: &Value) -> Option<&str> {
    payload
        .get("meta")
        .and_then(|meta| meta.get("code"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|code| !code.is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
