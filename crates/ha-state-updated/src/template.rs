//! Text templates describing a change
//!
//! Templates are Jinja2 source rendered with [`minijinja`] against
//! [`TemplateVariables`].

use minijinja::{Environment, Error, ErrorKind, Value};
use serde::Serialize;
use thiserror::Error as ThisError;
use tracing::trace;

/// Template used when the entry does not configure one
pub const DEFAULT_TEXT_TEMPLATE: &str = "Changed from {{ old_value }} to {{ new_value }}";

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum TemplateError {
    #[error("invalid template syntax: {0}")]
    Syntax(String),

    #[error("undefined variable: {0}")]
    Undefined(String),

    #[error("failed to render template: {0}")]
    Render(String),
}

impl From<Error> for TemplateError {
    fn from(err: Error) -> Self {
        match err.kind() {
            ErrorKind::SyntaxError => TemplateError::Syntax(err.to_string()),
            ErrorKind::UndefinedError => TemplateError::Undefined(err.to_string()),
            _ => TemplateError::Render(err.to_string()),
        }
    }
}

/// Variables available inside a text template
#[derive(Debug, Clone, Serialize)]
pub struct TemplateVariables {
    pub entity_id: String,
    pub attribute: String,

    /// Current value with unit suffix
    pub new_value: String,

    /// Previous value with unit suffix
    pub old_value: String,

    /// Latch time, RFC 3339
    pub last_updated: String,

    /// Current value without formatting
    pub value: serde_json::Value,

    /// Current value parsed as JSON, when it parses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_json: Option<serde_json::Value>,
}

/// A compiled-on-demand text template
pub struct TextTemplate {
    source: String,
    env: Environment<'static>,
}

impl TextTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        let mut env = Environment::new();
        env.add_filter("slugify", slugify);
        env.add_filter("to_json", to_json);
        env.add_filter("from_json", from_json);

        Self {
            source: source.into(),
            env,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// A blank template renders nothing
    pub fn is_blank(&self) -> bool {
        self.source.trim().is_empty()
    }

    pub fn render(&self, variables: &TemplateVariables) -> Result<String, TemplateError> {
        if self.is_blank() {
            return Ok(String::new());
        }
        trace!(template = %self.source, "Rendering text template");
        Ok(self.env.render_str(&self.source, variables)?)
    }
}

impl Default for TextTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT_TEMPLATE)
    }
}

impl std::fmt::Debug for TextTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextTemplate")
            .field("source", &self.source)
            .finish()
    }
}

fn slugify(value: &str) -> String {
    slug::slugify(value).replace('-', "_")
}

fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("JSON error: {}", e)))
}

fn from_json(value: &str) -> Result<Value, Error> {
    let json: serde_json::Value = serde_json::from_str(value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("invalid JSON: {}", e)))?;
    Ok(Value::from_serialize(&json))
}
