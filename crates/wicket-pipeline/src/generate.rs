use std::sync::Arc;

use serde_json::{Map, Value};
use wicket_core::{Category, WidgetDraft};

use crate::error::PipelineError;
use crate::llm::{LlmClient, LlmMessage, LlmRequest};
use crate::prompt;

/// Required keys of a generation result, each with its accepted alias.
const REQUIRED_KEYS: [(&str, &str); 4] = [
    ("name", "name"),
    ("category", "category"),
    ("code", "python_code"),
    ("presentation", "html_code"),
];

/// Turns a natural-language prompt into a validated [`WidgetDraft`].
///
/// The adapter never persists anything: a draft only exists once every
/// required key is present and well-formed.
pub struct GenerationAdapter {
    llm: Arc<dyn LlmClient>,
    database_path: String,
    max_tokens: u32,
}

impl GenerationAdapter {
    pub fn new(llm: Arc<dyn LlmClient>, database_path: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            llm,
            database_path: database_path.into(),
            max_tokens,
        }
    }

    pub async fn generate(&self, user_prompt: &str, schema: &str) -> Result<WidgetDraft, PipelineError> {
        let request = LlmRequest {
            system_prompt: prompt::system_prompt(schema, &self.database_path),
            messages: vec![LlmMessage::user(user_prompt)],
            max_tokens: self.max_tokens,
            json_response: true,
        };

        tracing::info!(llm = %self.llm.describe(), prompt_len = user_prompt.len(), "Requesting widget generation");
        let response = self.llm.chat(&request).await?;

        let draft = parse_generation(&response.content)?;
        tracing::info!(name = %draft.name, category = %draft.category, "Generation result validated");
        Ok(draft)
    }
}

/// Validate raw model output into a draft.
///
/// Accepts the object bare or inside a Markdown code fence. Every missing
/// key is named in the error.
pub fn parse_generation(content: &str) -> Result<WidgetDraft, PipelineError> {
    let body = strip_code_fence(content);
    let value: Value = serde_json::from_str(body).map_err(|e| {
        PipelineError::InvalidGenerationResult(format!("response is not valid JSON: {e}"))
    })?;
    let Value::Object(object) = value else {
        return Err(PipelineError::InvalidGenerationResult(
            "response is not a JSON object".into(),
        ));
    };

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .filter(|(key, alias)| !object.contains_key(*key) && !object.contains_key(*alias))
        .map(|(key, _)| *key)
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::InvalidGenerationResult(format!(
            "missing required keys: {}",
            missing.join(", ")
        )));
    }

    let [name, category, code, presentation] =
        REQUIRED_KEYS.map(|(key, alias)| string_field(&object, key, alias));
    let category = category?;
    let category: Category = category
        .parse()
        .map_err(|e: wicket_core::UnknownCategory| PipelineError::InvalidGenerationResult(e.to_string()))?;

    Ok(WidgetDraft {
        name: name?,
        category,
        code: code?,
        presentation: presentation?,
    })
}

fn string_field(object: &Map<String, Value>, key: &str, alias: &str) -> Result<String, PipelineError> {
    match object.get(key).or_else(|| object.get(alias)) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Err(PipelineError::InvalidGenerationResult(format!(
            "'{key}' must be a string, got {other}"
        ))),
        None => Err(PipelineError::InvalidGenerationResult(format!(
            "missing required keys: {key}"
        ))),
    }
}

/// Strip one surrounding ```` ``` ```` fence (with or without a language tag).
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string on the opening line, e.g. "json".
    match rest.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => rest.trim(),
    }
}
