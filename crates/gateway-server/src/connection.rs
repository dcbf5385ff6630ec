//! `ConnectionHandler` — one device WebSocket's entire lifecycle (spec
//! §4.11): handshake, authentication, the audio/dialogue pipeline, the
//! background TTS-monitor/paced-drain/idle-timeout tasks, and teardown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gateway_agent::{TurnEngine, TurnEngineDeps};
use gateway_core::{
    AsrConfig, AudioRouterConfig, DialogueStore, EndPromptConfig, SamplingParams, VadConfig,
};
use gateway_mcp::{DeviceMcpClient, DeviceTransport, McpError, ToolRegistry};
use gateway_voice::audio_frame::strip_or_extract;
use gateway_voice::{
    AsrSession, DeviceSink, ListenMode, OpusDecoderWrapper, PacedSender, ReorderBuffer,
    SentenceMarker, TtsSession, VadGate, VoiceError,
};

use crate::dto::{
    AudioParams, HelloMessage, InboundMessage, IotMessage, ListenMessage, McpMessage,
    OutboundMessage, ServerControlMessage, TtsState,
};
use crate::routes::ConnectQuery;
use crate::state::{constant_time_eq, ReportEvent, SharedState};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

#[derive(Debug, thiserror::Error)]
enum ConnectionError {
    #[error("device transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Voice(#[from] VoiceError),
}

/// Connection identity, resolved header-first with URL-query fallback
/// (spec §6): headers take precedence since the MQTT gateway and most
/// native clients send them, while a handful of embedded firmwares only
/// support query parameters.
pub struct ConnectCtx {
    pub device_id: String,
    pub client_id: String,
    pub authorization: Option<String>,
    pub client_ip: String,
    pub from_mqtt_gateway: bool,
}

impl ConnectCtx {
    #[must_use]
    pub fn resolve(headers: &axum::http::HeaderMap, query: &ConnectQuery, remote_addr: SocketAddr) -> Self {
        let device_id = header_str(headers, "device-id")
            .or_else(|| query.device_id.clone())
            .unwrap_or_default();
        let client_id = header_str(headers, "client-id")
            .or_else(|| query.client_id.clone())
            .unwrap_or_else(|| device_id.clone());
        let authorization = header_str(headers, "authorization")
            .or_else(|| query.authorization.clone())
            .map(|raw| raw.strip_prefix("Bearer ").map(str::to_string).unwrap_or(raw));
        let client_ip = header_str(headers, "x-real-ip")
            .or_else(|| {
                header_str(headers, "x-forwarded-for")
                    .and_then(|v| v.split(',').next().map(str::trim).map(str::to_string))
            })
            .unwrap_or_else(|| remote_addr.ip().to_string());
        let from_mqtt_gateway = query.from.as_deref() == Some("mqtt_gateway");

        Self { device_id, client_id, authorization, client_ip, from_mqtt_gateway }
    }
}

fn header_str(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

fn now_unix_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn authenticate(state: &SharedState, ctx: &ConnectCtx) -> bool {
    if !state.config.auth.enabled {
        return true;
    }
    if state.config.auth.allow_list.iter().any(|d| d == &ctx.device_id) {
        return true;
    }
    let Some(token) = ctx.authorization.as_deref() else { return false };
    state.auth.verify(token, &ctx.client_id, &ctx.device_id, now_unix())
}

/// Entry point wired from `routes::ws_upgrade`.
pub async fn handle_connection(state: SharedState, socket: WebSocket, ctx: ConnectCtx) {
    let session_id = Uuid::new_v4().simple().to_string();
    info!(device_id = %ctx.device_id, client_ip = %ctx.client_ip, session_id = %session_id, "device connected");

    let (ws_tx, ws_rx) = socket.split();
    let ws_tx = Arc::new(AsyncMutex::new(ws_tx));

    if !authenticate(&state, &ctx) {
        if let Some(player) = state.bind_prompt.clone() {
            run_need_bind_loop(&state, ws_tx, ws_rx, &ctx, player).await;
        } else {
            let _ = send_json(
                &ws_tx,
                &OutboundMessage::Server { status: "error".to_string(), message: Some("authentication failed".to_string()) },
            )
            .await;
            let _ = ws_tx.lock().await.send(Message::Close(None)).await;
        }
        info!(device_id = %ctx.device_id, "connection closed: not authenticated");
        return;
    }

    if let Err(err) = run_authenticated_connection(state, ws_tx, ws_rx, ctx, session_id.clone()).await {
        warn!(session_id = %session_id, error = %err, "connection ended with error");
    }
}

/// Discards inbound audio and replays the bind-code prompt periodically
/// until the device disconnects — there is nothing else a not-yet-bound
/// device can do on this channel.
async fn run_need_bind_loop(
    state: &SharedState,
    ws_tx: Arc<AsyncMutex<WsSink>>,
    mut ws_rx: WsStream,
    ctx: &ConnectCtx,
    player: Arc<dyn crate::state::BindPromptPlayer>,
) {
    let interval_secs = state.config.connection.bind_prompt_interval_secs.max(1);
    let mut ticker = interval(Duration::from_secs(interval_secs));
    player.play_bind_code(None).await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                player.play_bind_code(None).await;
            }
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }
    let _ = ws_tx.lock().await.send(Message::Close(None)).await;
    debug!(device_id = %ctx.device_id, "need-bind connection closed");
}

/// Mutable per-connection audio/dialogue pipeline state: VAD hysteresis,
/// the ASR turn state machine, the opus decoder, and `listen`-driven mode.
struct AudioPipeline {
    vad_gate: VadGate,
    asr_session: AsrSession,
    decoder: OpusDecoderWrapper,
    reorder: Option<ReorderBuffer>,
    listen_mode: ListenMode,
    listening: bool,
    was_voice: bool,
}

impl AudioPipeline {
    fn new(
        vad: Arc<dyn gateway_core::VadProvider>,
        vad_config: VadConfig,
        asr: Arc<dyn gateway_core::AsrProvider>,
        asr_config: AsrConfig,
        audio_router: AudioRouterConfig,
        from_mqtt_gateway: bool,
    ) -> Result<Self, VoiceError> {
        Ok(Self {
            vad_gate: VadGate::new(vad, vad_config),
            asr_session: AsrSession::new(asr, asr_config),
            decoder: OpusDecoderWrapper::new()?,
            reorder: from_mqtt_gateway.then(|| ReorderBuffer::new(audio_router.reorder_buffer_cap, audio_router.overflow_policy)),
            listen_mode: ListenMode::Auto,
            listening: false,
            was_voice: false,
        })
    }

    /// Returns `Some(transcript)` once a turn's audio is fully resolved
    /// (silence after auto-mode voice, or a manual-mode `listen stop`).
    async fn on_binary_frame(&mut self, frame: &[u8], from_mqtt_gateway: bool, tts_active: bool, client_abort: &AtomicBool) -> Option<String> {
        let payloads: Vec<Vec<u8>> = if from_mqtt_gateway {
            let (header, payload) = strip_or_extract(frame)?;
            let buffer = self.reorder.as_mut().expect("reorder buffer present for mqtt-gateway connections");
            let timestamp_ms = header.map(|h| h.timestamp_ms).unwrap_or(0);
            buffer.feed(timestamp_ms, payload.to_vec())
        } else {
            vec![frame.to_vec()]
        };

        let mut transcript = None;
        for opus in payloads {
            if let Some(text) = self.ingest_opus_payload(&opus, tts_active, client_abort).await {
                transcript = Some(text);
            }
        }
        transcript
    }

    async fn ingest_opus_payload(&mut self, opus: &[u8], tts_active: bool, client_abort: &AtomicBool) -> Option<String> {
        let pcm = match self.decoder.decode(opus) {
            Ok(pcm) => pcm,
            Err(err) => {
                warn!(error = %err, "failed to decode inbound opus frame");
                return None;
            }
        };

        let decision = self.vad_gate.process_frame(&pcm, Instant::now(), tts_active, self.listen_mode);
        if decision.barge_in {
            client_abort.store(true, Ordering::SeqCst);
        }

        let should_feed = match self.listen_mode {
            ListenMode::Auto => decision.is_voice,
            ListenMode::Manual => self.listening,
        };
        if should_feed {
            if let Err(err) = self.asr_session.on_voice_frame(&pcm).await {
                warn!(error = %err, "asr ingest error");
            }
        } else {
            self.asr_session.prime(&pcm);
        }

        let silence_edge = self.listen_mode == ListenMode::Auto && self.was_voice && !decision.is_voice;
        self.was_voice = decision.is_voice;

        if silence_edge {
            self.resolve_turn().await
        } else {
            None
        }
    }

    async fn resolve_turn(&mut self) -> Option<String> {
        match self.asr_session.on_silence_resolved().await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "asr silence resolution failed");
                None
            }
        }
    }

    async fn stop_manual_listen(&mut self) -> Option<String> {
        self.listening = false;
        self.resolve_turn().await
    }
}

/// The shared, cheaply-cloneable handles every inbound-message branch needs.
struct ConnectionServices {
    state: SharedState,
    ctx: ConnectCtx,
    ws_tx: Arc<AsyncMutex<WsSink>>,
    device_mcp: Arc<DeviceMcpClient>,
    tts_session: Arc<AsyncMutex<TtsSession>>,
    turn_engine: Arc<TurnEngine>,
    dialogue: Arc<AsyncMutex<DialogueStore>>,
    client_abort: Arc<AtomicBool>,
    active_turn: AsyncMutex<Option<JoinHandle<()>>>,
    report_tx: mpsc::Sender<ReportEvent>,
}

async fn send_json(ws_tx: &Arc<AsyncMutex<WsSink>>, message: &OutboundMessage) -> Result<(), ConnectionError> {
    let text = serde_json::to_string(message).map_err(|e| ConnectionError::Protocol(e.to_string()))?;
    ws_tx
        .lock()
        .await
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| ConnectionError::Transport(e.to_string()))
}

struct WsDeviceSink {
    ws_tx: Arc<AsyncMutex<WsSink>>,
}

#[async_trait]
impl DeviceSink for WsDeviceSink {
    async fn send(&self, frame: Vec<u8>) -> Result<(), VoiceError> {
        self.ws_tx
            .lock()
            .await
            .send(Message::Binary(frame.into()))
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))
    }
}

struct WsDeviceTransport {
    ws_tx: Arc<AsyncMutex<WsSink>>,
}

#[async_trait]
impl DeviceTransport for WsDeviceTransport {
    async fn send_json(&self, payload: Value) -> Result<(), McpError> {
        let envelope = serde_json::json!({"type": "mcp", "payload": payload});
        let text = serde_json::to_string(&envelope).map_err(|e| McpError::Protocol(e.to_string()))?;
        self.ws_tx
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }
}

/// Bridges `TurnEngine`'s text-sink port onto the connection's `TtsSession`,
/// and times each sentence's synthesis for the report worker (mirrors the
/// original implementation's report-worker handoff, without a concrete
/// metrics backend).
struct TtsTextSinkAdapter {
    session: Arc<AsyncMutex<TtsSession>>,
    device_id: String,
    report_tx: mpsc::Sender<ReportEvent>,
    started_at: AsyncMutex<Option<Instant>>,
}

#[async_trait]
impl gateway_core::TtsTextSink for TtsTextSinkAdapter {
    async fn send_first(&self, _sentence_id: &str) {
        *self.started_at.lock().await = Some(Instant::now());
        if let Err(err) = self.session.lock().await.start().await {
            warn!(error = %err, "failed to start tts session");
        }
    }

    async fn send_text(&self, _sentence_id: &str, chunk: &str) {
        if let Err(err) = self.session.lock().await.send_text(chunk).await {
            warn!(error = %err, "failed to forward tts text");
        }
    }

    async fn send_last(&self, _sentence_id: &str) {
        if let Err(err) = self.session.lock().await.finish().await {
            warn!(error = %err, "failed to finish tts session");
        }
        if let Some(started_at) = self.started_at.lock().await.take() {
            let _ = self.report_tx.try_send(ReportEvent::Tts {
                device_id: self.device_id.clone(),
                duration_ms: started_at.elapsed().as_millis() as u64,
            });
        }
    }
}

async fn run_authenticated_connection(
    state: SharedState,
    ws_tx: Arc<AsyncMutex<WsSink>>,
    mut ws_rx: WsStream,
    ctx: ConnectCtx,
    session_id: String,
) -> Result<(), ConnectionError> {
    send_json(
        &ws_tx,
        &OutboundMessage::Hello {
            session_id: session_id.clone(),
            audio_params: Some(AudioParams { format: Some("opus".to_string()) }),
        },
    )
    .await?;

    let vad = state.shared_vad.clone().unwrap_or_else(|| state.modules.vad_provider(&ctx.device_id));
    let asr_provider = state.shared_local_asr.clone().unwrap_or_else(|| state.modules.asr_provider(&ctx.device_id));
    let tts_provider = state.modules.tts_provider(&ctx.device_id);
    let llm_engine = state.modules.llm_engine(&ctx.device_id);

    let mut pipeline = AudioPipeline::new(vad, state.config.vad, asr_provider, state.config.asr, state.config.audio_router, ctx.from_mqtt_gateway)?;

    let (frame_tx, mut frame_rx) = mpsc::channel(64);
    let (marker_tx, mut marker_rx) = mpsc::channel(16);
    let tts_session = Arc::new(AsyncMutex::new(TtsSession::new(tts_provider, frame_tx, marker_tx)?));

    let mut registry = ToolRegistry::new();
    for tool in &state.local_tools {
        registry.register_local(tool.clone());
    }
    for client in &state.server_mcp_clients {
        registry.register_server_mcp(client.clone());
    }
    let device_mcp = Arc::new(DeviceMcpClient::new(Box::new(WsDeviceTransport { ws_tx: ws_tx.clone() })));
    registry.set_device_mcp(device_mcp.clone());
    let registry = Arc::new(registry);

    let client_abort = Arc::new(AtomicBool::new(false));
    let last_activity = Arc::new(AtomicU64::new(now_unix_ms()));
    let from_mqtt_gateway = ctx.from_mqtt_gateway;
    let (report_tx, report_rx) = mpsc::channel(32);

    let turn_engine = Arc::new(TurnEngine::new(TurnEngineDeps {
        llm: llm_engine,
        tools: registry.clone(),
        tts: Arc::new(TtsTextSinkAdapter {
            session: tts_session.clone(),
            device_id: ctx.device_id.clone(),
            report_tx: report_tx.clone(),
            started_at: AsyncMutex::new(None),
        }),
        memory: state.memory.clone(),
        emotion: state.emotion.clone(),
        sampling: SamplingParams::default(),
        config: state.config.turn_engine,
    }));
    let dialogue = Arc::new(AsyncMutex::new(DialogueStore::new()));

    let services = ConnectionServices {
        state: state.clone(),
        ctx,
        ws_tx: ws_tx.clone(),
        device_mcp: device_mcp.clone(),
        tts_session: tts_session.clone(),
        turn_engine,
        dialogue: dialogue.clone(),
        client_abort: client_abort.clone(),
        active_turn: AsyncMutex::new(None),
        report_tx,
    };

    let drain_handle = spawn_drain_task(ws_tx.clone(), frame_rx, marker_rx, client_abort.clone(), from_mqtt_gateway, state.config.paced_sender);
    let tts_monitor_handle = spawn_tts_monitor_task(tts_session.clone());
    let idle_handle = spawn_idle_watcher(
        ws_tx.clone(),
        last_activity.clone(),
        state.config.connection.close_connection_no_voice_time_secs,
        state.config.end_prompt.clone(),
        services.turn_engine.clone(),
        services.dialogue.clone(),
    );
    let report_handle = spawn_report_task(report_rx, state.report_sink.clone());

    let result = ingest_loop(&mut ws_rx, &mut pipeline, &services, &last_activity).await;

    drain_handle.abort();
    tts_monitor_handle.abort();
    idle_handle.abort();
    report_handle.abort();
    let _ = tts_session.lock().await.finish().await;
    if let Some(handle) = services.active_turn.lock().await.take() {
        handle.abort();
    }
    if let Some(memory) = state.memory.clone() {
        let messages = dialogue.lock().await.messages().to_vec();
        tokio::spawn(async move { memory.persist(&messages).await });
    }

    info!(device_id = %services.ctx.device_id, session_id = %session_id, "device disconnected");
    result
}

async fn ingest_loop(
    ws_rx: &mut WsStream,
    pipeline: &mut AudioPipeline,
    services: &ConnectionServices,
    last_activity: &Arc<AtomicU64>,
) -> Result<(), ConnectionError> {
    loop {
        match ws_rx.next().await {
            Some(Ok(Message::Binary(bytes))) => {
                last_activity.store(now_unix_ms(), Ordering::Relaxed);
                let tts_active = services.tts_session.lock().await.is_active();
                let started_at = Instant::now();
                if let Some(text) = pipeline.on_binary_frame(&bytes, services.ctx.from_mqtt_gateway, tts_active, &services.client_abort).await {
                    report_asr_round_trip(services, started_at);
                    handle_transcript(text, services).await;
                }
            }
            Some(Ok(Message::Text(text))) => {
                last_activity.store(now_unix_ms(), Ordering::Relaxed);
                match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(msg) => handle_text_message(msg, pipeline, services).await,
                    Err(err) => debug!(error = %err, "malformed device message, ignoring"),
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(ConnectionError::Transport(err.to_string())),
        }
    }
    Ok(())
}

async fn handle_text_message(msg: InboundMessage, pipeline: &mut AudioPipeline, services: &ConnectionServices) {
    match msg {
        InboundMessage::Hello(HelloMessage { features, .. }) => {
            // The welcome envelope was already sent at connect time; this is
            // the device announcing its capabilities. Device-hosted MCP
            // tools are only worth handshaking into if it claims the feature.
            if features.is_some_and(|f| f.mcp) {
                let device_mcp = services.device_mcp.clone();
                tokio::spawn(async move {
                    if let Err(err) = device_mcp.initialize("gateway", serde_json::json!({})).await {
                        debug!(error = %err, "device MCP initialize failed, proceeding without device tools");
                        return;
                    }
                    if let Err(err) = device_mcp.request_tools_list().await {
                        debug!(error = %err, "device MCP tools/list failed");
                    }
                });
            }
        }
        InboundMessage::Abort(abort) => {
            services.client_abort.store(true, Ordering::SeqCst);
            if let Some(handle) = services.active_turn.lock().await.take() {
                handle.abort();
            }
            let _ = services.tts_session.lock().await.finish().await;
            debug!(reason = ?abort.reason, "abort received");
        }
        InboundMessage::Listen(listen) => handle_listen(listen, pipeline, services).await,
        InboundMessage::Iot(IotMessage { descriptors, states }) => {
            debug!(?descriptors, ?states, "iot update received");
        }
        InboundMessage::Mcp(McpMessage { payload }) => {
            services.device_mcp.handle_message(payload).await;
        }
        InboundMessage::Server(control) => handle_server_control(control, services).await,
        InboundMessage::Unknown => {
            debug!("unrecognized device message type, ignoring");
        }
    }
}

async fn handle_listen(listen: ListenMessage, pipeline: &mut AudioPipeline, services: &ConnectionServices) {
    if let Some(mode) = listen.mode.as_deref() {
        pipeline.listen_mode = if mode == "manual" { ListenMode::Manual } else { ListenMode::Auto };
    }
    match listen.state.as_deref() {
        Some("start") => pipeline.listening = true,
        Some("stop") => {
            let started_at = Instant::now();
            if let Some(text) = pipeline.stop_manual_listen().await {
                report_asr_round_trip(services, started_at);
                handle_transcript(text, services).await;
            }
        }
        Some("detect") => {
            if let Some(text) = listen.text {
                handle_transcript(text, services).await;
            }
        }
        _ => {}
    }
}

/// Times an ASR round trip and hands it to the connection's report worker.
/// Best-effort: a full report channel just drops the sample.
fn report_asr_round_trip(services: &ConnectionServices, started_at: Instant) {
    let _ = services.report_tx.try_send(ReportEvent::Asr {
        device_id: services.ctx.device_id.clone(),
        duration_ms: started_at.elapsed().as_millis() as u64,
    });
}

async fn handle_transcript(text: String, services: &ConnectionServices) {
    let _ = send_json(&services.ws_tx, &OutboundMessage::Stt { text: text.clone() }).await;
    spawn_turn(services, text).await;
}

async fn spawn_turn(services: &ConnectionServices, query: String) {
    let mut active = services.active_turn.lock().await;
    if let Some(handle) = active.take() {
        handle.abort();
    }
    services.client_abort.store(false, Ordering::SeqCst);

    let turn_engine = services.turn_engine.clone();
    let dialogue = services.dialogue.clone();
    *active = Some(tokio::spawn(async move {
        let mut dialogue = dialogue.lock().await;
        if let Err(err) = turn_engine.run_turn(&mut dialogue, query).await {
            warn!(error = %err, "turn engine error");
        }
    }));
}

async fn handle_server_control(control: ServerControlMessage, services: &ConnectionServices) {
    let Some(secret) = &services.state.admin_secret else {
        let _ = send_json(&services.ws_tx, &OutboundMessage::Server { status: "error".to_string(), message: Some("control channel disabled".to_string()) }).await;
        return;
    };
    if !constant_time_eq(&control.secret, secret) {
        let _ = send_json(&services.ws_tx, &OutboundMessage::Server { status: "error".to_string(), message: Some("invalid secret".to_string()) }).await;
        return;
    }
    match control.action.as_str() {
        "update_config" => {
            info!(payload = ?control.payload, "server control: update_config accepted");
            let _ = send_json(&services.ws_tx, &OutboundMessage::Server { status: "ok".to_string(), message: None }).await;
        }
        "restart" => {
            let _ = send_json(&services.ws_tx, &OutboundMessage::Server { status: "ok".to_string(), message: Some("restarting".to_string()) }).await;
            if let Some(hook) = services.state.restart_hook.clone() {
                tokio::spawn(async move { hook.restart().await });
            }
        }
        other => {
            let _ = send_json(&services.ws_tx, &OutboundMessage::Server { status: "error".to_string(), message: Some(format!("unknown action: {other}")) }).await;
        }
    }
}

fn spawn_drain_task(
    ws_tx: Arc<AsyncMutex<WsSink>>,
    mut frame_rx: mpsc::Receiver<gateway_voice::TtsFrame>,
    mut marker_rx: mpsc::Receiver<SentenceMarker>,
    client_abort: Arc<AtomicBool>,
    from_mqtt_gateway: bool,
    paced_config: gateway_core::PacedSenderConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut paced = PacedSender::new(paced_config);
        let mut last_sentence: Option<Uuid> = None;
        let sink = WsDeviceSink { ws_tx: ws_tx.clone() };

        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if last_sentence != Some(frame.sentence_id) {
                        paced.reset_for_sentence(frame.sentence_id);
                        last_sentence = Some(frame.sentence_id);
                    }
                    if let Err(err) = paced.send_frame(&sink, &frame.opus, &client_abort, from_mqtt_gateway).await {
                        warn!(error = %err, "paced send failed");
                    }
                }
                marker = marker_rx.recv() => {
                    let Some(marker) = marker else { break };
                    let outbound = match marker {
                        SentenceMarker::First => OutboundMessage::Tts { state: TtsState::Start, text: None },
                        SentenceMarker::SentenceEnd { caption } => OutboundMessage::Tts { state: TtsState::SentenceStart, text: caption },
                        SentenceMarker::Last => OutboundMessage::Tts { state: TtsState::Stop, text: None },
                    };
                    let _ = send_json(&ws_tx, &outbound).await;
                }
            }
        }
    })
}

fn spawn_tts_monitor_task(tts_session: Arc<AsyncMutex<TtsSession>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut session = tts_session.lock().await;
            if !session.is_active() {
                drop(session);
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
            if let Err(err) = session.poll_once().await {
                warn!(error = %err, "tts monitor error");
            }
        }
    })
}

/// Drains ASR/TTS timing samples off the connection's report channel.
/// Forwards to `sink` when the embedder configured one; otherwise just
/// keeps the channel from backing up.
fn spawn_report_task(mut report_rx: mpsc::Receiver<ReportEvent>, sink: Option<Arc<dyn crate::state::ReportSink>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = report_rx.recv().await {
            if let Some(sink) = &sink {
                sink.record(event).await;
            }
        }
    })
}

fn spawn_idle_watcher(
    ws_tx: Arc<AsyncMutex<WsSink>>,
    last_activity: Arc<AtomicU64>,
    close_connection_no_voice_time_secs: u64,
    end_prompt: EndPromptConfig,
    turn_engine: Arc<TurnEngine>,
    dialogue: Arc<AsyncMutex<DialogueStore>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            let idle_ms = now_unix_ms().saturating_sub(last_activity.load(Ordering::Relaxed));
            if idle_ms >= (close_connection_no_voice_time_secs + 60) * 1000 {
                if end_prompt.enable && !end_prompt.message.is_empty() {
                    let mut dialogue = dialogue.lock().await;
                    if let Err(err) = turn_engine.run_turn(&mut dialogue, end_prompt.message.clone()).await {
                        warn!(error = %err, "farewell turn failed");
                    }
                }
                let _ = send_json(&ws_tx, &OutboundMessage::Server { status: "closing".to_string(), message: Some("idle timeout".to_string()) }).await;
                let _ = ws_tx.lock().await.send(Message::Close(None)).await;
                break;
            }
        }
    })
}
