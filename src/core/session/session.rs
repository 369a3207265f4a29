//! The per-call session task.
//!
//! A session owns every piece of per-call mutable state: the state machine,
//! the audio relay queues, pending tool calls, and the transcript. It
//! consumes one ordered event channel fed by the two link reader tasks and
//! the tool dispatcher; nothing outside this task mutates session state.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::interrupt::{InterruptionController, PlayingTurn};
use super::relay::AudioRelay;
use super::state::{SessionState, transition_allowed};
use crate::core::ai::messages::ConversationItem;
use crate::core::ai::{ClientEvent, ServerEvent};
use crate::core::audio::{self, AudioFrame, FrameSource, SequenceTracker};
use crate::core::telephony::{TelephonyCommand, TelephonyEvent};
use crate::core::tools::{ToolCall, ToolCallStatus, ToolDispatcher, ToolResolution};

/// Capacity of the tool-resolution channel.
const TOOL_CHANNEL_CAPACITY: usize = 16;

/// How long a closing session waits for both links to confirm closure before
/// it forces the terminal state.
const CLOSE_GRACE: Duration = Duration::from_secs(3);

/// Everything that can wake the session task.
#[derive(Debug)]
pub enum SessionEvent {
    /// Inbound telephony event
    Telephony(TelephonyEvent),
    /// Telephony socket closed
    TelephonyClosed,
    /// Telephony socket failed
    TelephonyFailed(String),
    /// Inbound AI event
    Ai(ServerEvent),
    /// AI socket closed
    AiClosed,
    /// AI socket failed
    AiFailed(String),
    /// Process shutdown requested
    Shutdown,
}

/// Per-session bounds injected by the supervisor.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bound on waiting for the AI configuration acknowledgement
    pub config_ack_timeout: Duration,
    /// Per-direction audio queue depth, in frames
    pub audio_queue_frames: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            config_ack_timeout: Duration::from_secs(10),
            audio_queue_frames: 256,
        }
    }
}

/// Speaker attribution for transcript turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptRole {
    Caller,
    Assistant,
}

impl std::fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptRole::Caller => write!(f, "caller"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One conversation turn, appended as transcripts arrive.
#[derive(Debug, Clone)]
pub struct TranscriptTurn {
    pub role: TranscriptRole,
    pub text: String,
    pub timestamp_ms: u64,
}

/// What a finished session reports back to the supervisor.
#[derive(Debug)]
pub struct SessionSummary {
    pub id: String,
    pub state: SessionState,
    pub transcript: Vec<TranscriptTurn>,
    pub interruptions: u64,
}

/// One active call.
pub struct Session {
    id: String,
    state: SessionState,
    started: Instant,
    options: SessionOptions,

    /// Stream identifier from the telephony `start` event, required for
    /// outbound playback frames
    stream_sid: Option<String>,

    relay: AudioRelay,
    caller_seq: SequenceTracker,
    ai_seq: SequenceTracker,
    interrupter: InterruptionController,

    /// The AI turn currently being forwarded, if any
    playing: Option<PlayingTurn>,
    /// Response whose remaining deltas must be discarded after a barge-in
    cancelled_response: Option<String>,
    /// Marks emitted so far, used to name playback checkpoints
    utterances: u64,

    pending_tool_calls: HashMap<String, ToolCall>,
    /// call_id -> function name, captured from `response.output_item.added`
    /// because the arguments-done event does not carry the name
    function_names: HashMap<String, String>,
    dispatcher: ToolDispatcher,

    transcript: Vec<TranscriptTurn>,

    to_telephony: Option<mpsc::Sender<TelephonyCommand>>,
    to_ai: Option<mpsc::Sender<ClientEvent>>,

    telephony_closed: bool,
    ai_closed: bool,
    close_deadline: Option<Instant>,
}

impl Session {
    pub fn new(
        id: String,
        options: SessionOptions,
        to_telephony: mpsc::Sender<TelephonyCommand>,
        to_ai: mpsc::Sender<ClientEvent>,
        dispatcher: ToolDispatcher,
    ) -> Self {
        let relay = AudioRelay::new(options.audio_queue_frames);
        Self {
            id,
            state: SessionState::Connecting,
            started: Instant::now(),
            options,
            stream_sid: None,
            relay,
            caller_seq: SequenceTracker::new(),
            ai_seq: SequenceTracker::new(),
            interrupter: InterruptionController::new(),
            playing: None,
            cancelled_response: None,
            utterances: 0,
            pending_tool_calls: HashMap::new(),
            function_names: HashMap::new(),
            dispatcher,
            transcript: Vec::new(),
            to_telephony: Some(to_telephony),
            to_ai: Some(to_ai),
            telephony_closed: false,
            ai_closed: false,
            close_deadline: None,
        }
    }

    /// Drive the session to its terminal state, consuming every event the
    /// links and the tool dispatcher produce.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) -> SessionSummary {
        let (tool_tx, mut tool_rx) = mpsc::channel::<ToolResolution>(TOOL_CHANNEL_CAPACITY);
        let config_deadline = Instant::now() + self.options.config_ack_timeout;

        while self.state != SessionState::Closed {
            tokio::select! {
                _ = tokio::time::sleep_until(config_deadline),
                    if self.state == SessionState::Connecting =>
                {
                    warn!(
                        session_id = %self.id,
                        timeout = ?self.options.config_ack_timeout,
                        "AI configuration acknowledgement timed out"
                    );
                    self.begin_close();
                }

                _ = tokio::time::sleep_until(self.close_deadline.unwrap_or_else(Instant::now)),
                    if self.close_deadline.is_some() =>
                {
                    debug!(session_id = %self.id, "Close grace elapsed, forcing terminal state");
                    self.force_closed();
                }

                Some(resolution) = tool_rx.recv() => {
                    self.handle_tool_resolution(resolution).await;
                }

                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event, &tool_tx).await,
                        None => {
                            // Every producer is gone; nothing further can arrive.
                            self.begin_close();
                            self.force_closed();
                        }
                    }
                }
            }

            self.pump();
            self.maybe_finish_close();
        }

        SessionSummary {
            id: self.id,
            state: self.state,
            transcript: self.transcript,
            interruptions: self.interrupter.interruptions(),
        }
    }

    // -------------------------------------------------------------------------
    // Event handling
    // -------------------------------------------------------------------------

    async fn handle_event(&mut self, event: SessionEvent, tool_tx: &mpsc::Sender<ToolResolution>) {
        match event {
            SessionEvent::Telephony(event) => self.handle_telephony(event),
            SessionEvent::Ai(event) => self.handle_ai(event, tool_tx).await,
            SessionEvent::TelephonyClosed => {
                self.telephony_closed = true;
                self.begin_close();
            }
            SessionEvent::TelephonyFailed(reason) => {
                warn!(session_id = %self.id, "Telephony link failure: {reason}");
                self.telephony_closed = true;
                self.begin_close();
            }
            SessionEvent::AiClosed => {
                self.ai_closed = true;
                self.begin_close();
            }
            SessionEvent::AiFailed(reason) => {
                warn!(session_id = %self.id, "AI link failure: {reason}");
                self.ai_closed = true;
                self.begin_close();
            }
            SessionEvent::Shutdown => {
                info!(session_id = %self.id, "Shutdown requested");
                self.begin_close();
            }
        }
    }

    fn handle_telephony(&mut self, event: TelephonyEvent) {
        match event {
            TelephonyEvent::Connected {} => {
                debug!(session_id = %self.id, "Telephony stream connected");
            }
            TelephonyEvent::Start { stream_sid, start } => {
                let sid = stream_sid.unwrap_or_else(|| start.stream_sid.clone());
                info!(
                    session_id = %self.id,
                    stream_sid = %sid,
                    call_sid = ?start.call_sid,
                    "Call established"
                );
                self.stream_sid = Some(sid);
            }
            TelephonyEvent::Media {
                sequence_number,
                media,
            } => {
                if self.state.is_closing() {
                    return;
                }
                let payload = match audio::decode_payload(&media.payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(session_id = %self.id, "Skipping caller frame: {e}");
                        return;
                    }
                };
                let sequence = match sequence_number.as_deref().and_then(|s| s.parse().ok()) {
                    Some(seq) => {
                        if let Some(gap) = self.caller_seq.observe(seq) {
                            warn!(
                                session_id = %self.id,
                                gap,
                                "Caller audio sequence gap"
                            );
                        }
                        seq
                    }
                    None => self.caller_seq.next(),
                };
                let frame = AudioFrame {
                    source: FrameSource::Caller,
                    sequence,
                    payload,
                    timestamp_ms: self.elapsed_ms(),
                };
                self.relay.push_caller_frame(&frame);
            }
            TelephonyEvent::Dtmf { dtmf } => {
                info!(session_id = %self.id, digit = %dtmf.digit, "DTMF received");
                let turn = TranscriptTurn {
                    role: TranscriptRole::Caller,
                    text: format!("[dtmf {}]", dtmf.digit),
                    timestamp_ms: self.elapsed_ms(),
                };
                self.transcript.push(turn);
            }
            TelephonyEvent::Mark { mark } => {
                debug!(session_id = %self.id, mark = %mark.name, "Playback checkpoint confirmed");
            }
            TelephonyEvent::Stop {} => {
                info!(session_id = %self.id, "Call ended by telephony side");
                self.begin_close();
            }
        }
    }

    async fn handle_ai(&mut self, event: ServerEvent, tool_tx: &mpsc::Sender<ToolResolution>) {
        match event {
            ServerEvent::SessionCreated { session } => {
                debug!(session_id = %self.id, ai_session = %session.id, "AI session created");
            }
            ServerEvent::SessionUpdated { .. } => {
                if self.state == SessionState::Connecting {
                    info!(session_id = %self.id, "AI session configured");
                    self.transition(SessionState::Active);
                }
            }
            ServerEvent::SpeechStarted { .. } => self.handle_speech_started().await,
            ServerEvent::SpeechStopped { .. } => {
                if self.state == SessionState::CallerSpeaking {
                    self.transition(SessionState::Active);
                }
            }
            ServerEvent::AudioDelta {
                response_id,
                item_id,
                delta,
            } => self.handle_audio_delta(response_id, item_id, &delta),
            ServerEvent::AudioDone {
                response_id,
                item_id,
            } => self.handle_audio_done(&response_id, &item_id),
            ServerEvent::OutputItemAdded { item, .. } => {
                if item.item_type == "function_call" {
                    if let (Some(call_id), Some(name)) = (item.call_id, item.name) {
                        debug!(session_id = %self.id, call_id = %call_id, name = %name, "Tracking function call");
                        self.function_names.insert(call_id, name);
                    }
                }
            }
            ServerEvent::FunctionCallArgumentsDone {
                call_id, arguments, ..
            } => self.handle_function_call(call_id, arguments, tool_tx),
            ServerEvent::TranscriptionCompleted { transcript, .. } => {
                let turn = TranscriptTurn {
                    role: TranscriptRole::Caller,
                    text: transcript,
                    timestamp_ms: self.elapsed_ms(),
                };
                self.transcript.push(turn);
            }
            ServerEvent::AudioTranscriptDone { transcript, .. } => {
                let turn = TranscriptTurn {
                    role: TranscriptRole::Assistant,
                    text: transcript,
                    timestamp_ms: self.elapsed_ms(),
                };
                self.transcript.push(turn);
            }
            ServerEvent::ResponseDone { response } => {
                debug!(session_id = %self.id, response_id = %response.id, "AI response done");
                if self.cancelled_response.as_deref() == Some(response.id.as_str()) {
                    self.cancelled_response = None;
                }
            }
            ServerEvent::Error { error } => {
                // Service-reported errors are contained: the link stays open.
                warn!(
                    session_id = %self.id,
                    error_type = %error.error_type,
                    "AI service error: {}",
                    error.message
                );
            }
            ServerEvent::Other => {}
        }
    }

    async fn handle_speech_started(&mut self) {
        match self.state {
            SessionState::AiSpeaking => {
                self.cancelled_response = self
                    .playing
                    .as_ref()
                    .map(|turn| turn.response_id.clone());
                let playing = self.playing.take();
                self.interrupter
                    .interrupt(
                        &self.id,
                        &mut self.relay,
                        self.to_ai.as_ref(),
                        self.to_telephony.as_ref(),
                        self.stream_sid.as_deref(),
                        playing.as_ref(),
                    )
                    .await;
                self.transition(SessionState::CallerSpeaking);
            }
            SessionState::Active => {
                self.transition(SessionState::CallerSpeaking);
            }
            _ => {}
        }
    }

    fn handle_audio_delta(&mut self, response_id: String, item_id: String, delta: &str) {
        if self.state.is_closing() {
            return;
        }
        if self.cancelled_response.as_deref() == Some(response_id.as_str()) {
            debug!(session_id = %self.id, "Discarding delta from interrupted turn");
            return;
        }
        let payload = match audio::decode_payload(delta) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(session_id = %self.id, "Skipping AI frame: {e}");
                return;
            }
        };
        let frame = AudioFrame {
            source: FrameSource::Ai,
            sequence: self.ai_seq.next(),
            payload,
            timestamp_ms: self.elapsed_ms(),
        };

        match &mut self.playing {
            Some(turn) if turn.item_id == item_id => turn.played_ms += frame.duration_ms(),
            _ => {
                self.playing = Some(PlayingTurn {
                    response_id,
                    item_id,
                    played_ms: frame.duration_ms(),
                });
            }
        }

        if let Some(sid) = self.stream_sid.clone() {
            self.relay.push_ai_frame(&sid, &frame);
        } else {
            warn!(session_id = %self.id, "AI audio before telephony start, dropping frame");
        }

        if self.state == SessionState::Active {
            self.transition(SessionState::AiSpeaking);
        }
    }

    fn handle_audio_done(&mut self, response_id: &str, item_id: &str) {
        if self.cancelled_response.as_deref() == Some(response_id) {
            return;
        }
        if let Some(sid) = self.stream_sid.clone() {
            let name = format!("utterance-{}", self.utterances);
            self.utterances += 1;
            self.relay.push_mark(&sid, name);
        }
        if self
            .playing
            .as_ref()
            .is_some_and(|turn| turn.item_id == item_id)
        {
            self.playing = None;
        }
        if self.state == SessionState::AiSpeaking {
            if self.pending_tool_calls.is_empty() {
                self.transition(SessionState::Active);
            } else {
                self.transition(SessionState::ToolExecuting);
            }
        }
    }

    fn handle_function_call(
        &mut self,
        call_id: String,
        arguments: String,
        tool_tx: &mpsc::Sender<ToolResolution>,
    ) {
        let name = self.function_names.remove(&call_id).unwrap_or_else(|| {
            warn!(
                session_id = %self.id,
                call_id = %call_id,
                "Function name missing for call"
            );
            String::new()
        });
        info!(
            session_id = %self.id,
            call_id = %call_id,
            tool = %name,
            "Tool call requested"
        );

        let mut call = ToolCall::new(call_id.clone(), name.clone(), arguments.clone());
        call.status = ToolCallStatus::Running;
        self.pending_tool_calls.insert(call_id.clone(), call);

        if self.state == SessionState::Active {
            self.transition(SessionState::ToolExecuting);
        }

        self.dispatcher
            .dispatch(call_id, name, arguments, tool_tx.clone());
    }

    async fn handle_tool_resolution(&mut self, resolution: ToolResolution) {
        let output = match &resolution.result {
            Ok(value) => {
                if let Some(call) = self.pending_tool_calls.get_mut(&resolution.call_id) {
                    call.status = ToolCallStatus::Succeeded;
                    call.result = Some(value.clone());
                }
                value.to_string()
            }
            Err(e) => {
                warn!(
                    session_id = %self.id,
                    call_id = %resolution.call_id,
                    "Tool call failed: {e}"
                );
                if let Some(call) = self.pending_tool_calls.get_mut(&resolution.call_id) {
                    call.status = ToolCallStatus::Failed;
                    call.error = Some(e.to_string());
                }
                serde_json::json!({ "error": e.to_string() }).to_string()
            }
        };

        // Exactly one result event per call id, success or error, then the
        // call is done and the AI resumes referencing the result.
        let item = ConversationItem::function_call_output(&resolution.call_id, output);
        self.send_ai(ClientEvent::ConversationItemCreate { item }).await;
        self.send_ai(ClientEvent::ResponseCreate).await;

        self.pending_tool_calls.remove(&resolution.call_id);
        if self.pending_tool_calls.is_empty() && self.state == SessionState::ToolExecuting {
            self.transition(SessionState::Active);
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Begin teardown. Safe to call repeatedly: duplicate `stop` events and
    /// late link failures collapse into one close sequence.
    fn begin_close(&mut self) {
        if self.state.is_closing() {
            self.maybe_finish_close();
            return;
        }
        self.transition(SessionState::Closing);
        self.relay.clear_all();
        // Dropping the command senders makes each link writer send its close
        // frame; the readers then report closure back as events.
        self.to_telephony = None;
        self.to_ai = None;
        self.close_deadline = Some(Instant::now() + CLOSE_GRACE);
    }

    fn maybe_finish_close(&mut self) {
        if self.state == SessionState::Closing && self.telephony_closed && self.ai_closed {
            self.transition(SessionState::Closed);
        }
    }

    fn force_closed(&mut self) {
        if self.state != SessionState::Closed {
            self.transition(SessionState::Closed);
        }
    }

    fn transition(&mut self, to: SessionState) {
        if !transition_allowed(self.state, to) {
            warn!(
                session_id = %self.id,
                from = %self.state,
                to = %to,
                "Ignoring illegal state transition"
            );
            return;
        }
        debug!(session_id = %self.id, from = %self.state, to = %to, "Session state");
        self.state = to;
    }

    fn pump(&mut self) {
        let playback_enabled = self.state != SessionState::ToolExecuting;
        self.relay.pump(
            self.to_ai.as_ref(),
            self.to_telephony.as_ref(),
            playback_enabled,
        );
    }

    async fn send_ai(&self, event: ClientEvent) {
        if let Some(tx) = &self.to_ai {
            if tx.send(event).await.is_err() {
                debug!(session_id = %self.id, "AI link closed, event dropped");
            }
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
