use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Completion, LlmClient, ModelTier};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::social::HTTP_CLIENT;

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: Option<u64>,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: Option<u64>,
}

impl UsageMetadata {
    fn total(&self) -> u64 {
        self.total_token_count.unwrap_or_else(|| {
            self.prompt_token_count.unwrap_or(0) + self.candidates_token_count.unwrap_or(0)
        })
    }
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    pro_model: String,
    flash_model: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            api_key: config.genai_api_key.clone(),
            base_url: config.genai_base_url.trim_end_matches('/').to_string(),
            pro_model: config.genai_pro_model.clone(),
            flash_model: config.genai_flash_model.clone(),
            temperature: config.genai_temperature,
        }
    }

    fn model(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Pro => &self.pro_model,
            ModelTier::Flash => &self.flash_model,
        }
    }
}

fn parse_response(json: GeminiResponse) -> AppResult<Completion> {
    let text = json
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<String>()
        })
        .ok_or_else(|| AppError::Llm("Response has no candidates".to_string()))?;

    let total_tokens = json.usage_metadata.unwrap_or_default().total();
    Ok(Completion { text, total_tokens })
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, tier: ModelTier, prompt: &str) -> AppResult<Completion> {
        if self.api_key.is_empty() {
            return Err(AppError::Llm("GENAI_API_KEY is not configured".to_string()));
        }

        let model = self.model(tier);
        let url = format!("{}/{model}:generateContent", self.base_url);

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!("API error ({status}): {text}")));
        }

        let json: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse JSON: {e}")))?;

        let completion = parse_response(json)?;
        tracing::debug!(
            model = %model,
            tokens = completion.total_tokens,
            "Gemini completion received"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> AppResult<Completion> {
        parse_response(serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn test_parse_response_joins_parts_and_reads_usage() {
        let completion = parse(
            r#"{
                "candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "world"}]}}],
                "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15}
            }"#,
        )
        .unwrap();
        assert_eq!(completion.text, "Hello world");
        assert_eq!(completion.total_tokens, 15);
    }

    #[test]
    fn test_parse_response_sums_tokens_without_total() {
        let completion = parse(
            r#"{
                "candidates": [{"content": {"parts": [{"text": "x"}]}}],
                "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3}
            }"#,
        )
        .unwrap();
        assert_eq!(completion.total_tokens, 10);
    }

    #[test]
    fn test_parse_response_without_usage() {
        let completion = parse(r#"{"candidates": [{"content": {"parts": [{"text": "x"}]}}]}"#).unwrap();
        assert_eq!(completion.total_tokens, 0);
    }

    #[test]
    fn test_parse_response_without_candidates_fails() {
        assert!(matches!(parse(r#"{"candidates": []}"#), Err(AppError::Llm(_))));
        assert!(matches!(parse("{}"), Err(AppError::Llm(_))));
    }

    #[test]
    fn test_model_selection_by_tier() {
        let mut config = AppConfig::from_env();
        config.genai_pro_model = "pro-model".to_string();
        config.genai_flash_model = "flash-model".to_string();
        let client = GeminiClient::new(&config);

        assert_eq!(client.model(ModelTier::Pro), "pro-model");
        assert_eq!(client.model(ModelTier::Flash), "flash-model");
    }

    #[tokio::test]
    async fn test_generate_requires_api_key() {
        let mut config = AppConfig::from_env();
        config.genai_api_key = String::new();
        let client = GeminiClient::new(&config);

        let result = client.generate(ModelTier::Flash, "hi").await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }
}
