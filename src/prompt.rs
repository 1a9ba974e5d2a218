// src/prompt.rs
// Grounded prompt assembly and model-output parsing

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::vector_store::RetrievedChunk;

pub const SYSTEM_PROMPT: &str = r#"
You are a SQL Query Builder specialised in PostgreSQL. Use ONLY tables/columns present in the RAG CONTEXT.
Generate safe, readable SQL (use CTEs when helpful).

IMPORTANT: Return ONLY a valid JSON object (no markdown, no ```json).

Required format:
{
  "tables_used": [],
  "columns_used": [],
  "joins_explained": [],
  "assumptions": [],
  "sql": "..."
}

Rules:
- Default filter: last 90 days and status COMPLETED when the user does not specify.
- Avoid SELECT *.
- For dates use sales.created_at; for status use sales.sale_status_desc.
- For daily granularity: DATE(sales.created_at) AS sale_date.
- Frequent joins: sales→stores, sales→channels, sales→customers (LEFT), product_sales→sales, item_product_sales→product_sales, payments→payment_types.
- If something is missing from the context, explain it in "assumptions".
"#;

const INSTRUCTION: &str = "Use ONLY what is in the context below to choose tables and columns. \
If something is unclear, record your assumptions in 'assumptions'. \
Reply with the JSON in the requested format only.";

// Trailing `{...}` object when the model wraps JSON in prose
static TRAILING_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}\s*$").expect("valid regex"));

/// Fields the model is asked to produce. Missing fields default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedQuery {
    pub tables_used: Vec<String>,
    pub columns_used: Vec<String>,
    pub joins_explained: Vec<String>,
    pub assumptions: Vec<String>,
    pub sql: String,
}

pub fn build_prompt_with_context(user_input: &str, contexts: &[RetrievedChunk]) -> String {
    let context_text = contexts
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[DOC {} - {}#chunk{}]\n{}",
                i + 1,
                c.metadata.source,
                c.metadata.chunk,
                c.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\n=== RAG CONTEXT BEGIN ===\n{}\n=== RAG CONTEXT END ===\n\nUser request: {}\n",
        INSTRUCTION, context_text, user_input
    )
}

/// Pull the JSON object out of raw model output.
///
/// Returns `None` when neither the whole text nor its trailing `{...}`
/// parses as a JSON object.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }
    let found = TRAILING_OBJECT.find(text)?;
    match serde_json::from_str::<Value>(found.as_str()) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Parse model output into the expected fields.
pub fn parse_generated_query(text: &str) -> Result<GeneratedQuery, String> {
    let value = extract_json(text)
        .ok_or_else(|| "Model response does not contain valid JSON.".to_string())?;
    serde_json::from_value(value).map_err(|e| format!("Model JSON has unexpected shape: {}", e))
}
