//! `TurnEngine`: orchestrates one user turn per §4.8 — LLM streaming with
//! text-embedded and structured tool-call extraction, parallel dispatch,
//! and bounded recursion through further LLM passes when tools report
//! `REQLLM`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use uuid::Uuid;

use gateway_core::{
    Action, DialogueStore, EmotionHook, LlmEngine, MemoryStore, Message, SamplingParams,
    StreamItem, ToolCallRef, ToolDefinition, ToolDispatcher, ToolResult, TtsTextSink,
    TurnEngineConfig,
};

use crate::error::TurnEngineError;
use crate::text_tool_call::extract_json_object;
use crate::tool_call_merge::{merge_tool_call_delta, PendingToolCall};

/// Collaborators a `TurnEngine` needs, all reached through `gateway-core`
/// ports so this crate stays free of infrastructure dependencies.
pub struct TurnEngineDeps {
    pub llm: Arc<dyn LlmEngine>,
    pub tools: Arc<dyn ToolDispatcher>,
    pub tts: Arc<dyn TtsTextSink>,
    pub memory: Option<Arc<dyn MemoryStore>>,
    pub emotion: Option<Arc<dyn EmotionHook>>,
    pub sampling: SamplingParams,
    pub config: TurnEngineConfig,
}

pub struct TurnEngine {
    deps: TurnEngineDeps,
}

impl TurnEngine {
    #[must_use]
    pub fn new(deps: TurnEngineDeps) -> Self {
        Self { deps }
    }

    /// Run one user turn to completion: appends the user message, emits the
    /// FIRST TTS marker, then recurses through tool-call rounds (bounded by
    /// `config.max_depth`) until a final assistant answer is reached.
    pub async fn run_turn(&self, dialogue: &mut DialogueStore, query: impl Into<String>) -> Result<(), TurnEngineError> {
        let sentence_id = Uuid::new_v4().simple().to_string();
        self.deps.tts.send_first(&sentence_id).await;
        self.run_depth(dialogue, Some(query.into()), 0, sentence_id).await
    }

    fn run_depth<'a>(
        &'a self,
        dialogue: &'a mut DialogueStore,
        query: Option<String>,
        depth: u32,
        sentence_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), TurnEngineError>> + Send + 'a>> {
        Box::pin(async move {
            if depth == 0 {
                if let Some(q) = &query {
                    dialogue.put(Message::user(q.clone()));
                }
            }

            let force_final_answer = depth >= self.deps.config.max_depth;
            if force_final_answer {
                tracing::debug!(depth, "maximum tool call depth reached, forcing final answer");
                dialogue.put(Message::user(
                    "[System Prompt] Maximum tool call limit reached, please directly provide the final answer based on all information currently obtained. Do not attempt to call any tools.",
                ));
            }

            let functions: Vec<ToolDefinition> = if force_final_answer {
                Vec::new()
            } else {
                self.deps.tools.get_functions().await
            };

            let memory_summary = match &self.deps.memory {
                Some(memory) => memory.query_memory(query.as_deref().unwrap_or_default()).await,
                None => None,
            };

            let llm_dialogue = dialogue.get_for_llm(memory_summary.as_deref(), None);
            let mut stream = self
                .deps
                .llm
                .stream_with_tools(&llm_dialogue, &functions, &self.deps.sampling)
                .await?;

            let mut content_buffer = String::new();
            let mut text_accum = String::new();
            let mut tool_call_flag = false;
            let mut tool_calls: Vec<PendingToolCall> = Vec::new();
            let mut emotion_fired = false;

            while let Some(item) = stream.next().await {
                match item? {
                    StreamItem::Content(content) => {
                        if content.is_empty() {
                            continue;
                        }
                        text_accum.push_str(&content);
                        if !tool_call_flag && text_accum.trim_start().starts_with("<tool_call>") {
                            tool_call_flag = true;
                        }

                        if !emotion_fired && !content.trim().is_empty() {
                            emotion_fired = true;
                            if let Some(hook) = self.deps.emotion.clone() {
                                let owned = content.clone();
                                tokio::spawn(async move { hook.extract(&owned).await });
                            }
                        }

                        if !tool_call_flag {
                            content_buffer.push_str(&content);
                            self.deps.tts.send_text(&sentence_id, &content).await;
                        }
                    }
                    StreamItem::ToolCall(delta) => {
                        tool_call_flag = true;
                        merge_tool_call_delta(&mut tool_calls, delta);
                    }
                }
            }

            if tool_call_flag {
                let mut malformed = false;
                if tool_calls.is_empty() && !text_accum.is_empty() {
                    match extract_json_object(&text_accum) {
                        Some(json_text) => match serde_json::from_str::<Value>(&json_text) {
                            Ok(parsed) => {
                                let name = parsed.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                                let arguments = parsed.get("arguments").cloned().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                                tool_calls.push(PendingToolCall {
                                    id: Uuid::new_v4().simple().to_string(),
                                    name,
                                    arguments: serde_json::to_string(&arguments).unwrap_or_else(|_| "{}".to_string()),
                                });
                            }
                            Err(_) => {
                                malformed = true;
                                content_buffer.push_str(&json_text);
                            }
                        },
                        None => {
                            malformed = true;
                            content_buffer.push_str(&text_accum);
                        }
                    }
                    if malformed {
                        tracing::error!(content = %text_accum, "malformed text-based tool call");
                    }
                }

                if !malformed && !tool_calls.is_empty() {
                    if !content_buffer.is_empty() {
                        dialogue.put(Message::assistant(std::mem::take(&mut content_buffer)));
                    }

                    tracing::debug!(count = tool_calls.len(), "dispatching tool calls");
                    let dispatches = tool_calls.iter().map(|call| {
                        let tools = self.deps.tools.clone();
                        let name = call.name.clone();
                        let args_text = call.arguments.clone();
                        async move {
                            let arguments: HashMap<String, Value> = if args_text.trim().is_empty() {
                                HashMap::new()
                            } else {
                                serde_json::from_str(&args_text).unwrap_or_default()
                            };
                            tools.dispatch(&name, arguments).await
                        }
                    });
                    let results = futures_util::future::join_all(dispatches).await;

                    return self.handle_function_results(dialogue, &tool_calls, results, depth, &sentence_id).await;
                }
            }

            if !content_buffer.is_empty() {
                dialogue.put(Message::assistant(content_buffer));
            }
            if depth == 0 {
                self.deps.tts.send_last(&sentence_id).await;
            }
            Ok(())
        })
    }

    /// Apply dispatch policy: `RESPONSE`/`NOTFOUND`/`ERROR` speak directly
    /// and are recorded as a plain assistant message; `REQLLM` results are
    /// batched into one assistant `tool_calls` message plus one `tool`
    /// message per call, then the turn recurses into another LLM pass.
    async fn handle_function_results(
        &self,
        dialogue: &mut DialogueStore,
        tool_calls: &[PendingToolCall],
        results: Vec<ToolResult>,
        depth: u32,
        sentence_id: &str,
    ) -> Result<(), TurnEngineError> {
        let mut need_llm: Vec<(&PendingToolCall, ToolResult)> = Vec::new();
        for (call, result) in tool_calls.iter().zip(results) {
            match result.action {
                Action::ReqLlm => need_llm.push((call, result)),
                Action::Response | Action::NotFound | Action::Error => {
                    self.deps.tts.send_text(sentence_id, &result.text).await;
                    dialogue.put(Message::assistant(result.text.clone()));
                }
            }
        }

        if need_llm.is_empty() {
            if depth == 0 {
                self.deps.tts.send_last(sentence_id).await;
            }
            return Ok(());
        }

        let tool_call_refs: Vec<ToolCallRef> = need_llm
            .iter()
            .map(|(call, _)| ToolCallRef {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: if call.arguments.is_empty() { "{}".to_string() } else { call.arguments.clone() },
            })
            .collect();
        dialogue.put(Message::assistant_tool_calls(tool_call_refs));

        for (call, result) in &need_llm {
            if !result.text.is_empty() {
                dialogue.put(Message::tool(call.id.clone(), result.text.clone()));
            }
        }

        self.run_depth(dialogue, None, depth + 1, sentence_id.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use futures_core::stream::BoxStream;
    use gateway_core::{LlmError, MessageRole, ToolDefinition};

    struct ScriptedLlm {
        rounds: StdMutex<std::collections::VecDeque<Vec<StreamItem>>>,
    }

    impl ScriptedLlm {
        fn new(rounds: Vec<Vec<StreamItem>>) -> Self {
            Self { rounds: StdMutex::new(rounds.into()) }
        }
    }

    #[async_trait]
    impl LlmEngine for ScriptedLlm {
        async fn stream(&self, _dialogue: &[Message], _params: &SamplingParams) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
            unimplemented!("turn engine only calls stream_with_tools")
        }

        async fn stream_with_tools(
            &self,
            _dialogue: &[Message],
            _tools: &[ToolDefinition],
            _params: &SamplingParams,
        ) -> Result<BoxStream<'static, Result<StreamItem, LlmError>>, LlmError> {
            let round = self.rounds.lock().unwrap().pop_front().unwrap_or_default();
            Ok(Box::pin(futures_util::stream::iter(round.into_iter().map(Ok))))
        }
    }

    struct StubTools {
        result: ToolResult,
    }

    #[async_trait]
    impl ToolDispatcher for StubTools {
        async fn get_functions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::new("get_weather")]
        }

        async fn dispatch(&self, _name: &str, _arguments: HashMap<String, Value>) -> ToolResult {
            self.result.clone()
        }
    }

    #[derive(Default)]
    struct RecordingTts {
        events: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl TtsTextSink for RecordingTts {
        async fn send_first(&self, sentence_id: &str) {
            self.events.lock().unwrap().push(format!("FIRST:{sentence_id}"));
        }

        async fn send_text(&self, sentence_id: &str, chunk: &str) {
            self.events.lock().unwrap().push(format!("TEXT:{sentence_id}:{chunk}"));
        }

        async fn send_last(&self, sentence_id: &str) {
            self.events.lock().unwrap().push(format!("LAST:{sentence_id}"));
        }
    }

    fn deps(llm: ScriptedLlm, tools: StubTools, tts: Arc<RecordingTts>) -> TurnEngineDeps {
        TurnEngineDeps {
            llm: Arc::new(llm),
            tools: Arc::new(tools),
            tts,
            memory: None,
            emotion: None,
            sampling: SamplingParams::default(),
            config: TurnEngineConfig { max_depth: 5 },
        }
    }

    #[tokio::test]
    async fn plain_content_turn_appends_one_assistant_message_and_brackets_with_first_and_last() {
        let llm = ScriptedLlm::new(vec![vec![StreamItem::Content("hello".to_string()), StreamItem::Content(" there".to_string())]]);
        let tts = Arc::new(RecordingTts::default());
        let engine = TurnEngine::new(deps(llm, StubTools { result: ToolResult::response("unused") }, tts.clone()));

        let mut dialogue = DialogueStore::new();
        engine.run_turn(&mut dialogue, "hi").await.unwrap();

        assert_eq!(dialogue.messages().len(), 2);
        assert_eq!(dialogue.messages()[0].role, MessageRole::User);
        assert_eq!(dialogue.messages()[1].role, MessageRole::Assistant);
        assert_eq!(dialogue.messages()[1].content.as_deref(), Some("hello there"));

        let events = tts.events.lock().unwrap();
        assert!(events[0].starts_with("FIRST:"));
        assert!(events.last().unwrap().starts_with("LAST:"));
    }

    #[tokio::test]
    async fn reqllm_tool_result_recurses_into_a_second_llm_pass() {
        let llm = ScriptedLlm::new(vec![
            vec![StreamItem::ToolCall(tool_call_delta(0, "call-1", "get_weather", "{}"))],
            vec![StreamItem::Content("it is sunny".to_string())],
        ]);
        let tts = Arc::new(RecordingTts::default());
        let engine = TurnEngine::new(deps(llm, StubTools { result: ToolResult::req_llm("72F and clear") }, tts));

        let mut dialogue = DialogueStore::new();
        engine.run_turn(&mut dialogue, "what's the weather?").await.unwrap();

        let roles: Vec<_> = dialogue.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant, MessageRole::Tool, MessageRole::Assistant]);
        assert_eq!(dialogue.messages()[1].tool_calls[0].name, "get_weather");
        assert_eq!(dialogue.messages()[2].content.as_deref(), Some("72F and clear"));
        assert_eq!(dialogue.messages()[3].content.as_deref(), Some("it is sunny"));
    }

    #[tokio::test]
    async fn response_action_speaks_directly_without_recursing() {
        let llm = ScriptedLlm::new(vec![vec![StreamItem::ToolCall(tool_call_delta(0, "call-1", "get_weather", "{}"))]]);
        let tts = Arc::new(RecordingTts::default());
        let engine = TurnEngine::new(deps(llm, StubTools { result: ToolResult::response("done") }, tts.clone()));

        let mut dialogue = DialogueStore::new();
        engine.run_turn(&mut dialogue, "do it").await.unwrap();

        assert_eq!(dialogue.messages().len(), 2);
        assert_eq!(dialogue.messages()[1].content.as_deref(), Some("done"));
        assert!(tts.events.lock().unwrap().iter().any(|e| e.contains("TEXT") && e.ends_with("done")));
    }

    #[tokio::test]
    async fn max_depth_zero_forces_a_final_answer_without_offering_tools() {
        let llm = ScriptedLlm::new(vec![vec![StreamItem::Content("final answer".to_string())]]);
        let tts = Arc::new(RecordingTts::default());
        let mut built = deps(llm, StubTools { result: ToolResult::response("unused") }, tts);
        built.config = TurnEngineConfig { max_depth: 0 };
        let engine = TurnEngine::new(built);

        let mut dialogue = DialogueStore::new();
        engine.run_turn(&mut dialogue, "hi").await.unwrap();

        let has_system_guard = dialogue.messages().iter().any(|m| {
            m.role == MessageRole::User && m.content.as_deref().unwrap_or_default().contains("Maximum tool call limit reached")
        });
        assert!(has_system_guard);
    }

    fn tool_call_delta(index: u32, id: &str, name: &str, arguments: &str) -> gateway_core::ToolCallDelta {
        gateway_core::ToolCallDelta {
            index,
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            arguments_fragment: Some(arguments.to_string()),
        }
    }
}
