//! [`LlmEngine`] adapter for an OpenAI-compatible streaming chat-completions
//! endpoint, grounded in the llama-server proxy shape: POST with
//! `"stream": true`, pass the response body through as SSE frames, decode
//! each `data:` payload as one completion chunk.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;

use gateway_core::{LlmEngine, LlmError, Message, SamplingParams, StreamItem, ThinkTagFilter, ToolCallDelta, ToolDefinition};

use crate::sse::sse_data_lines;
use crate::wire::{build_messages, ChatCompletionChunk, ChatCompletionRequest, WireToolSchema};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model_name: model_name.into(),
            timeout_secs: 300,
        }
    }
}

pub struct OpenAiEngine {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiEngine {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn open_stream(
        &self,
        dialogue: &[Message],
        tools: &[ToolDefinition],
        params: &SamplingParams,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let tool_schemas: Vec<WireToolSchema<'_>> = tools.iter().map(WireToolSchema::from).collect();
        let request = ChatCompletionRequest {
            model: &self.config.model_name,
            messages: build_messages(dialogue),
            stream: true,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            tools: if tool_schemas.is_empty() { None } else { Some(tool_schemas) },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport(format!("upstream returned {status}: {body}")));
        }

        Ok(Box::pin(sse_data_lines(response.bytes_stream())))
    }
}

#[async_trait]
impl LlmEngine for OpenAiEngine {
    async fn stream(
        &self,
        dialogue: &[Message],
        params: &SamplingParams,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let lines = self.open_stream(dialogue, &[], params).await?;
        let out = stream! {
            let mut filter = ThinkTagFilter::new();
            futures_util::pin_mut!(lines);
            while let Some(line) = lines.next().await {
                let payload = match line {
                    Ok(p) => p,
                    Err(e) => { yield Err(e); continue; }
                };
                let chunk: ChatCompletionChunk = match serde_json::from_str(&payload) {
                    Ok(c) => c,
                    Err(e) => { yield Err(LlmError::MalformedChunk(e.to_string())); continue; }
                };
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        let visible = filter.filter(&content);
                        if !visible.is_empty() {
                            yield Ok(visible);
                        }
                    }
                }
            }
        };
        Ok(Box::pin(out))
    }

    async fn stream_with_tools(
        &self,
        dialogue: &[Message],
        tools: &[ToolDefinition],
        params: &SamplingParams,
    ) -> Result<BoxStream<'static, Result<StreamItem, LlmError>>, LlmError> {
        let lines = self.open_stream(dialogue, tools, params).await?;
        let out = stream! {
            let mut filter = ThinkTagFilter::new();
            futures_util::pin_mut!(lines);
            while let Some(line) = lines.next().await {
                let payload = match line {
                    Ok(p) => p,
                    Err(e) => { yield Err(e); continue; }
                };
                let chunk: ChatCompletionChunk = match serde_json::from_str(&payload) {
                    Ok(c) => c,
                    Err(e) => { yield Err(LlmError::MalformedChunk(e.to_string())); continue; }
                };
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        let visible = filter.filter(&content);
                        if !visible.is_empty() {
                            yield Ok(StreamItem::Content(visible));
                        }
                    }
                    for delta in choice.delta.tool_calls {
                        yield Ok(StreamItem::ToolCall(ToolCallDelta {
                            index: delta.index,
                            id: delta.id,
                            name: delta.function.as_ref().and_then(|f| f.name.clone()),
                            arguments_fragment: delta.function.and_then(|f| f.arguments),
                        }));
                    }
                }
            }
        };
        Ok(Box::pin(out))
    }
}
