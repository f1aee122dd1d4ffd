//! The dubbing session: one actor owning the timeline and every pipeline.
//!
//! [`DubSession`] is a synchronous state machine. It consumes
//! [`SessionMessage`]s and answers with [`Effect`]s; [`SessionRuntime`] is the
//! tokio task that feeds it and carries the effects out. All state mutation
//! happens on that one task, so the clock scan, demand rounds and the
//! now-playing slot never race each other.

use crate::audio::{AudioPhase, SentenceAudio, SpeechSynthesizer};
use crate::clock::ClockTracker;
use crate::config::EngineConfig;
use crate::error::{SynthesisError, TranslationError};
use crate::events::{EventBus, EventKind, SessionEvent};
use crate::playback::NowPlaying;
use crate::scheduler::{self, BackoffPolicy, InFlight};
use crate::surface::{SOURCE_TRACK_LABEL, TARGET_TRACK_LABEL, VideoSurface};
use crate::timeline::Timeline;
use crate::translation::{
    TranslationBatch, TranslationContext, TranslationOutput, TranslationPipeline, Translator,
};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Requests accepted from a [`SessionHandle`].
#[derive(Debug)]
pub enum SessionCommand {
    TimeUpdate(f64),
    Seeked(f64),
    Pause,
    ActivateSentence(usize),
    TranslateSentences(Vec<usize>),
    SetWindows { translate: usize, dub: usize },
    Snapshot(oneshot::Sender<Vec<SentenceView>>),
    Dispose,
}

/// Read-only view of one span for a sentence list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentenceView {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub source_text: String,
    /// Final translation, the pending placeholder, or reference text.
    pub display_text: Option<String>,
    pub dubbed: bool,
    pub current: bool,
}

/// Outcome of one span inside a dub batch.
#[derive(Debug)]
pub struct DubOutcome {
    pub index: usize,
    pub audio: Arc<SentenceAudio>,
    pub result: Result<(), SynthesisError>,
}

#[derive(Debug)]
pub enum SessionMessage {
    Command(SessionCommand),
    /// Unthrottled clock evaluation.
    Evaluate(f64),
    ThrottleDue,
    TranslationDone {
        batch: TranslationBatch,
        outcome: Result<TranslationOutput, TranslationError>,
    },
    DubDone(Vec<DubOutcome>),
}

/// Work the runtime performs on behalf of the state machine.
#[derive(Debug)]
pub enum Effect {
    ArmThrottle(Instant),
    Translate(TranslationBatch),
    Dub(Vec<(usize, Arc<SentenceAudio>)>),
    Seek(f64),
}

pub struct DubSession {
    timeline: Timeline,
    clock: ClockTracker,
    translation: TranslationPipeline,
    dub_in_flight: InFlight,
    now_playing: NowPlaying,
    events: EventBus,
    translate_window: usize,
    dub_window: usize,
    admission_window_secs: f64,
    pending_placeholder: String,
    cue_placeholder: String,
    /// Time of the previous clock evaluation; `None` after a jump.
    last_tick_time: Option<f64>,
    disposed: bool,
}

impl DubSession {
    pub fn new(
        timeline: Timeline,
        config: &EngineConfig,
        events: EventBus,
        tokens_used: Arc<AtomicU64>,
    ) -> Self {
        let policy = BackoffPolicy {
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
        };
        Self {
            timeline,
            clock: ClockTracker::new(config.throttle_interval()),
            translation: TranslationPipeline::new(policy, tokens_used),
            dub_in_flight: InFlight::new(),
            now_playing: NowPlaying::new(),
            events,
            translate_window: config.translate_window,
            dub_window: config.dub_window,
            admission_window_secs: config.admission_window_secs,
            pending_placeholder: config.pending_placeholder.clone(),
            cue_placeholder: config.cue_placeholder.clone(),
            last_tick_time: None,
            disposed: false,
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn current(&self) -> Option<usize> {
        self.clock.current()
    }

    pub fn translation(&self) -> &TranslationPipeline {
        &self.translation
    }

    pub fn dub_in_flight(&self) -> &InFlight {
        &self.dub_in_flight
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn snapshot(&self) -> Vec<SentenceView> {
        let current = self.clock.current();
        self.timeline
            .iter()
            .enumerate()
            .map(|(index, sentence)| SentenceView {
                index,
                start: sentence.start,
                end: sentence.end,
                source_text: sentence.source_text.clone(),
                display_text: sentence
                    .display_text(&self.pending_placeholder)
                    .map(str::to_string),
                dubbed: sentence.audio().is_some_and(|audio| audio.generated()),
                current: current == Some(index),
            })
            .collect()
    }

    /// Attach the source and target caption tracks, binding each target cue
    /// to its span so later translations update it.
    pub fn attach_captions(&mut self, surface: &dyn VideoSurface) {
        let source = surface.caption_track(SOURCE_TRACK_LABEL, "en");
        let target = surface.caption_track(TARGET_TRACK_LABEL, "zh");
        let mut cues = Vec::with_capacity(self.timeline.len());
        for sentence in self.timeline.iter() {
            source.add_cue(sentence.start, sentence.end, &sentence.source_text);
            let text = sentence.cue_text(&self.cue_placeholder);
            cues.push(target.add_cue(sentence.start, sentence.end, text));
        }
        for (index, cue) in cues.into_iter().enumerate() {
            self.timeline.bind_cue(index, cue);
        }
        target.set_showing(true);
        info!(cues = self.timeline.len(), "Attached caption tracks");
    }

    pub fn handle(&mut self, message: SessionMessage, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.disposed {
            debug!("Dropping message for disposed session");
            return effects;
        }
        match message {
            SessionMessage::Command(command) => self.handle_command(command, now, &mut effects),
            SessionMessage::Evaluate(time) => self.tick(time, now, &mut effects),
            SessionMessage::ThrottleDue => {
                if let Some(time) = self.clock.throttle_mut().take_due(now) {
                    self.tick(time, now, &mut effects);
                }
            }
            SessionMessage::TranslationDone { batch, outcome } => {
                self.finish_translation(batch, outcome, now, &mut effects);
            }
            SessionMessage::DubDone(outcomes) => self.finish_dub(outcomes, &mut effects),
        }
        effects
    }

    fn handle_command(&mut self, command: SessionCommand, now: Instant, effects: &mut Vec<Effect>) {
        match command {
            SessionCommand::TimeUpdate(time) | SessionCommand::Seeked(time) => {
                if let Some(deadline) = self.clock.throttle_mut().offer(now, time) {
                    effects.push(Effect::ArmThrottle(deadline));
                }
            }
            SessionCommand::Pause => self.pause(),
            SessionCommand::ActivateSentence(index) => self.activate(index, now, effects),
            SessionCommand::TranslateSentences(indices) => {
                if let Some(batch) = self.translation.begin(&mut self.timeline, &indices, &self.events)
                {
                    effects.push(Effect::Translate(batch));
                }
            }
            SessionCommand::SetWindows { translate, dub } => {
                info!(translate, dub, "Lookahead windows changed");
                self.translate_window = translate;
                self.dub_window = dub;
                self.run_demand(now, effects);
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::Dispose => self.dispose(),
        }
    }

    fn tick(&mut self, time: f64, now: Instant, effects: &mut Vec<Effect>) {
        let previous_time = self.last_tick_time.replace(time);
        if let Some(index) = self.clock.evaluate(&self.timeline, time) {
            self.events.emit(SessionEvent::CurrentSentenceChanged(index));
            self.run_demand(now, effects);
        }

        let Some(audio) = self
            .clock
            .current()
            .and_then(|index| self.timeline.get(index))
            .and_then(|sentence| sentence.audio())
            .cloned()
        else {
            return;
        };
        let window = self.admission_window_secs;
        if !audio.generated() || !audio.should_play(time, window) {
            return;
        }
        let entered = previous_time.is_none_or(|previous| !audio.should_play(previous, window));
        let idle = !matches!(audio.phase(), AudioPhase::Playing | AudioPhase::Ended);
        if entered || idle {
            self.now_playing.start(&audio);
        }
    }

    fn activate(&mut self, index: usize, now: Instant, effects: &mut Vec<Effect>) {
        let Some(start) = self.timeline.get(index).map(|sentence| sentence.start) else {
            warn!(index, len = self.timeline.len(), "Ignoring activation of unknown sentence");
            return;
        };
        effects.push(Effect::Seek(start));
        self.clock.throttle_mut().reset();
        self.last_tick_time = None;
        self.clock.activate(index);
        self.events.emit(SessionEvent::CurrentSentenceChanged(index));
        self.run_demand(now, effects);
    }

    fn pause(&self) {
        self.now_playing.pause();
        for index in [self.clock.last(), self.clock.current()].into_iter().flatten() {
            if let Some(audio) = self.timeline.get(index).and_then(|s| s.audio()) {
                audio.pause();
            }
        }
    }

    fn run_demand(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        let current = self.clock.current();
        if let Some(indices) = scheduler::translation_demand(
            &self.timeline,
            current,
            self.translate_window,
            self.translation.in_flight(),
            self.translation.retry(),
            now,
        ) {
            if let Some(batch) = self.translation.begin(&mut self.timeline, &indices, &self.events) {
                effects.push(Effect::Translate(batch));
            }
        }
        self.run_dub_demand(effects);
    }

    fn run_dub_demand(&mut self, effects: &mut Vec<Effect>) {
        let Some(indices) = scheduler::dub_demand(
            &self.timeline,
            self.clock.current(),
            self.dub_window,
            &self.dub_in_flight,
            self.translation.in_flight(),
        ) else {
            return;
        };

        let mut batch = Vec::with_capacity(indices.len());
        for index in indices {
            let Some(sentence) = self.timeline.get(index) else {
                continue;
            };
            let Some(text) = sentence.dub_text() else {
                continue;
            };
            let audio = Arc::new(SentenceAudio::new(sentence.start, sentence.end, text));
            if let Some(stale) = sentence.audio().cloned() {
                self.now_playing.release(&stale);
            }
            self.timeline.bind_audio(index, Arc::clone(&audio));
            batch.push((index, audio));
        }
        if batch.is_empty() {
            return;
        }
        let indices: Vec<usize> = batch.iter().map(|(index, _)| *index).collect();
        self.dub_in_flight.insert_all(&indices);
        info!(indices = ?indices, "Dispatching dub batch");
        self.events.emit(SessionEvent::DubSentencesStart(indices));
        effects.push(Effect::Dub(batch));
    }

    fn finish_translation(
        &mut self,
        batch: TranslationBatch,
        outcome: Result<TranslationOutput, TranslationError>,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        let applied =
            match self
                .translation
                .complete(&mut self.timeline, &batch, outcome, &self.events, now)
            {
                Ok(applied) => applied,
                Err(_) => return,
            };
        for stale in &applied.invalidated {
            self.now_playing.release(stale);
        }
        if !applied.invalidated.is_empty() {
            debug!(count = applied.invalidated.len(), "Translation invalidated sentence audio");
        }
        self.run_dub_demand(effects);
    }

    fn finish_dub(&mut self, outcomes: Vec<DubOutcome>, effects: &mut Vec<Effect>) {
        let mut indices = Vec::with_capacity(outcomes.len());
        let mut superseded = false;
        for outcome in outcomes {
            self.dub_in_flight.remove_all(&[outcome.index]);
            indices.push(outcome.index);
            if !self.timeline.is_bound(outcome.index, &outcome.audio) {
                superseded = true;
                continue;
            }
            if let Err(err) = outcome.result {
                warn!(index = outcome.index, "Dropping failed sentence audio: {err}");
                self.timeline.clear_audio_if(outcome.index, &outcome.audio);
            }
        }
        info!(indices = ?indices, "Dub batch finished");
        self.events.emit(SessionEvent::DubSentencesEnd(indices));
        if superseded {
            self.run_dub_demand(effects);
        }
    }

    fn dispose(&mut self) {
        info!("Disposing dubbing session");
        self.now_playing.clear();
        self.timeline.clear();
        self.clock.reset();
        self.last_tick_time = None;
        self.translation.clear();
        self.dub_in_flight.clear();
        self.events.clear();
        self.disposed = true;
    }
}

/// Collaborators the runtime performs effects against.
#[derive(Clone)]
pub struct SessionDeps {
    pub surface: Arc<dyn VideoSurface>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Cloneable control surface of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    events: EventBus,
    tokens_used: Arc<AtomicU64>,
}

impl SessionHandle {
    pub fn time_update(&self, time: f64) {
        self.send(SessionCommand::TimeUpdate(time));
    }

    pub fn seeked(&self, time: f64) {
        self.send(SessionCommand::Seeked(time));
    }

    pub fn pause(&self) {
        self.send(SessionCommand::Pause);
    }

    pub fn activate_sentence(&self, index: usize) {
        self.send(SessionCommand::ActivateSentence(index));
    }

    pub fn translate_sentences(&self, indices: Vec<usize>) {
        self.send(SessionCommand::TranslateSentences(indices));
    }

    pub fn set_windows(&self, translate: usize, dub: usize) {
        self.send(SessionCommand::SetWindows { translate, dub });
    }

    pub fn subscribe(&self, kinds: &[EventKind]) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.events.subscribe(kinds)
    }

    /// Cumulative provider tokens reported so far.
    pub fn token_usage(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    /// `None` once the session has stopped.
    pub async fn snapshot(&self) -> Option<Vec<SentenceView>> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(reply));
        rx.await.ok()
    }

    pub fn dispose(&self) {
        self.send(SessionCommand::Dispose);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            debug!("Session already stopped; command dropped");
        }
    }
}

pub struct SessionRuntime {
    session: DubSession,
    deps: SessionDeps,
    context: TranslationContext,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    completions_tx: mpsc::UnboundedSender<SessionMessage>,
    completions: mpsc::UnboundedReceiver<SessionMessage>,
    translation_gate: Arc<Semaphore>,
    synthesis_gate: Arc<Semaphore>,
    throttle_deadline: Option<Instant>,
}

impl SessionRuntime {
    /// Attach captions, then start the session actor on the current tokio
    /// runtime. Subscribe to `events` beforehand to observe the initial
    /// evaluation.
    pub fn spawn(
        timeline: Timeline,
        config: &EngineConfig,
        context: TranslationContext,
        deps: SessionDeps,
        events: EventBus,
    ) -> (SessionHandle, JoinHandle<()>) {
        let tokens_used = Arc::new(AtomicU64::new(0));
        let mut session =
            DubSession::new(timeline, config, events.clone(), Arc::clone(&tokens_used));
        session.attach_captions(deps.surface.as_ref());

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let runtime = Self {
            session,
            deps,
            context,
            commands,
            completions_tx,
            completions,
            translation_gate: Arc::new(Semaphore::new(config.translation_workers)),
            synthesis_gate: Arc::new(Semaphore::new(config.synthesis_workers)),
            throttle_deadline: None,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            events,
            tokens_used,
        };
        (handle, tokio::spawn(runtime.run()))
    }

    async fn run(mut self) {
        let time = self.deps.surface.current_time();
        info!(time, sentences = self.session.timeline().len(), "Session started");
        self.process(SessionMessage::Evaluate(time));

        loop {
            let deadline = self.throttle_deadline;
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Dispose) | None => {
                        self.process(SessionMessage::Command(SessionCommand::Dispose));
                        break;
                    }
                    Some(command) => self.process(SessionMessage::Command(command)),
                },
                Some(message) = self.completions.recv() => self.process(message),
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.throttle_deadline = None;
                    self.process(SessionMessage::ThrottleDue);
                }
            }
        }
        info!("Session runtime stopped");
    }

    fn process(&mut self, message: SessionMessage) {
        for effect in self.session.handle(message, Instant::now()) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::ArmThrottle(deadline) => self.throttle_deadline = Some(deadline),
            Effect::Seek(time) => self.deps.surface.seek(time),
            Effect::Translate(batch) => self.spawn_translation(batch),
            Effect::Dub(items) => self.spawn_dub(items),
        }
    }

    fn spawn_translation(&self, batch: TranslationBatch) {
        let translator = Arc::clone(&self.deps.translator);
        let gate = Arc::clone(&self.translation_gate);
        let context = self.context.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let Ok(_permit) = gate.acquire_owned().await else {
                return;
            };
            let outcome = translator.translate_batch(&batch.texts, &context).await;
            let _ = tx.send(SessionMessage::TranslationDone { batch, outcome });
        });
    }

    fn spawn_dub(&self, items: Vec<(usize, Arc<SentenceAudio>)>) {
        let synthesizer = Arc::clone(&self.deps.synthesizer);
        let gate = Arc::clone(&self.synthesis_gate);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let jobs = items.into_iter().map(|(index, audio)| {
                let synthesizer = Arc::clone(&synthesizer);
                let gate = Arc::clone(&gate);
                async move {
                    let result = match gate.acquire_owned().await {
                        Ok(_permit) => audio.generate(&synthesizer).await,
                        Err(_) => Err(SynthesisError::Provider("synthesis pool closed".to_string())),
                    };
                    DubOutcome {
                        index,
                        audio,
                        result,
                    }
                }
            });
            let outcomes = join_all(jobs).await;
            let _ = tx.send(SessionMessage::DubDone(outcomes));
        });
    }
}
