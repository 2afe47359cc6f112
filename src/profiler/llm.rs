//! LLM-assisted strategy — static analysis via an Ollama-compatible endpoint.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OllamaConfig;
use crate::error::ExecutionError;
use crate::profiler::Profiler;
use crate::task::RuntimeOptions;

/// File name of the written model response.
const REPORT_FILE: &str = "llm_profile.txt";

/// Static-profiling prompt. The runtime options block is appended only when
/// the request carries any.
const PROMPT_TEMPLATE: &str =
    "Analyze and perform a static profiling of the following code.\n\nCode:\n{code}\n";
const PROMPT_OPTIONS_SUFFIX: &str = "\nRuntime options:\n{options}\n";

/// Sends the full source text to an inference service and writes the textual
/// response verbatim as the artifact.
pub struct OllamaProfiler {
    client: reqwest::Client,
    host: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaProfiler {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    fn build_prompt(&self, code: &str, options: Option<&RuntimeOptions>) -> String {
        let mut prompt = PROMPT_TEMPLATE.replace("{code}", code);
        if let Some(options) = options {
            let rendered = serde_json::to_string_pretty(options)
                .unwrap_or_else(|_| "(unavailable)".to_string());
            prompt.push_str(&PROMPT_OPTIONS_SUFFIX.replace("{options}", &rendered));
        }
        prompt
    }
}

#[async_trait]
impl Profiler for OllamaProfiler {
    async fn profile(
        &self,
        source: &Path,
        options: Option<&RuntimeOptions>,
    ) -> Result<PathBuf, ExecutionError> {
        let code = tokio::fs::read_to_string(source).await?;
        let prompt = self.build_prompt(&code, options);

        tracing::debug!(source = %source.display(), model = %self.model, "Requesting LLM analysis");

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: &prompt,
                }],
                stream: false,
            })
            .send()
            .await
            .map_err(|e| ExecutionError::Inference(e.to_string()))?
            .error_for_status()
            .map_err(|e| ExecutionError::Inference(e.to_string()))?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExecutionError::Inference(e.to_string()))?;

        let content = body.message.map(|m| m.content).unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ExecutionError::EmptyResponse);
        }

        let report_path = source
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(REPORT_FILE);
        tokio::fs::write(&report_path, content).await?;

        tracing::info!(source = %source.display(), artifact = %report_path.display(), "LLM profiling complete");
        Ok(report_path)
    }

    fn describe(&self) -> String {
        "llm".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_code() {
        let profiler = OllamaProfiler::new(&OllamaConfig::default());
        let prompt = profiler.build_prompt("print(1)", None);
        assert!(prompt.contains("print(1)"));
        assert!(!prompt.contains("Runtime options"));
    }

    #[test]
    fn prompt_embeds_runtime_options_when_present() {
        let profiler = OllamaProfiler::new(&OllamaConfig::default());
        let options = RuntimeOptions {
            timeout_seconds: Some(10),
            ..Default::default()
        };
        let prompt = profiler.build_prompt("int main(){}", Some(&options));
        assert!(prompt.contains("Runtime options"));
        assert!(prompt.contains("timeoutSeconds"));
    }

    #[test]
    fn host_trailing_slash_is_normalized() {
        let profiler = OllamaProfiler::new(&OllamaConfig {
            host: "http://localhost:11434/".to_string(),
            model: "llama3.1:8b".to_string(),
        });
        assert_eq!(profiler.host, "http://localhost:11434");
    }
}
