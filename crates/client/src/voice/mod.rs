//! Voice Capture Pipeline: microphone → level meter → encoded clip → connection.
//!
//! While recording, one task samples the microphone level at roughly 60 Hz
//! and flushes captured audio into the chunk buffer every 250 ms. Stopping
//! the recording finalizes the chunks into a single `voice_data` event.

mod capture;
mod encode;
pub mod level;
mod push_to_talk;

pub use capture::{CaptureStream, MicrophoneSource, NoMicrophone, Track};
#[cfg(feature = "microphone")]
pub use capture::CpalMicrophone;
pub use encode::{VOICE_FORMAT, VOICE_SAMPLE_RATE, encode_clip, encode_wav, resample};
pub use push_to_talk::{KeyEvent, PushToTalk};

use crate::connection::{ConnectionEvent, ConnectionManager};
use advisory_core::VoicePayload;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, instrument, warn};

pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(16);
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum VoiceError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("microphone unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode recording: {0}")]
    Encode(String),
    #[error("voice clip dropped: not connected")]
    NotConnected,
}

/// Observable pipeline state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceState {
    pub is_recording: bool,
    /// Reply playback is not performed by this client; stays `false`.
    pub is_playing: bool,
    /// A clip was sent and no `voice_response`/`error` has arrived yet.
    pub is_processing: bool,
    /// Latest meter value in `[0, 1]`.
    pub audio_level: f32,
    pub error: Option<String>,
}

pub type LevelCallback = Arc<dyn Fn(f32) + Send + Sync>;

struct Recording {
    stream: CaptureStream,
    stop_tx: oneshot::Sender<()>,
    monitor: JoinHandle<Vec<f32>>,
}

#[derive(Default)]
struct Slot {
    recording: Option<Recording>,
    disabled: bool,
    /// Set while `start_recording` waits on the microphone.
    opening: bool,
    /// Set from taking the recording until its clip has been handed off.
    stopping: bool,
    disposed: bool,
}

#[derive(Debug, Clone, Copy)]
enum Busy {
    Opening,
    Stopping,
}

impl Slot {
    fn flag(&mut self, busy: Busy) -> &mut bool {
        match busy {
            Busy::Opening => &mut self.opening,
            Busy::Stopping => &mut self.stopping,
        }
    }
}

/// Clears a [`Busy`] flag when dropped, so a cancelled start or stop does
/// not leave the slot marked busy.
struct BusyGuard<'a> {
    pipeline: &'a VoicePipeline,
    busy: Busy,
    armed: bool,
}

impl<'a> BusyGuard<'a> {
    fn set(pipeline: &'a VoicePipeline, slot: &mut Slot, busy: Busy) -> Self {
        *slot.flag(busy) = true;
        Self {
            pipeline,
            busy,
            armed: true,
        }
    }

    /// Clears the flag under a lock the caller already holds.
    fn release(mut self, slot: &mut Slot) {
        *slot.flag(self.busy) = false;
        self.armed = false;
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.pipeline.lock().flag(self.busy) = false;
        }
    }
}

pub struct VoicePipeline {
    mic: Arc<dyn MicrophoneSource>,
    connection: ConnectionManager,
    state: watch::Sender<VoiceState>,
    slot: Mutex<Slot>,
    on_level: Option<LevelCallback>,
    ack_listener: JoinHandle<()>,
}

impl VoicePipeline {
    /// Must be called from within a Tokio runtime.
    pub fn new(mic: Arc<dyn MicrophoneSource>, connection: ConnectionManager) -> Self {
        let (state, _) = watch::channel(VoiceState::default());
        let ack_listener = tokio::spawn(listen_for_acks(connection.subscribe(), state.clone()));
        Self {
            mic,
            connection,
            state,
            slot: Mutex::new(Slot::default()),
            on_level: None,
            ack_listener,
        }
    }

    /// Registers a callback fed with every meter sample.
    pub fn with_level_callback(mut self, callback: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.on_level = Some(Arc::new(callback));
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<VoiceState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> VoiceState {
        self.state.borrow().clone()
    }

    pub fn is_recording(&self) -> bool {
        self.lock().recording.is_some()
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.lock().disabled = disabled;
    }

    pub fn is_disabled(&self) -> bool {
        self.lock().disabled
    }

    /// Number of microphone tracks currently held.
    pub fn track_count(&self) -> usize {
        self.lock()
            .recording
            .as_ref()
            .map_or(0, |r| r.stream.track_count())
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the microphone and starts metering and chunk collection.
    /// A no-op while recording, stopping, disabled or disposed.
    #[instrument(skip(self))]
    pub async fn start_recording(&self) -> Result<(), VoiceError> {
        let opening = {
            let mut slot = self.lock();
            if slot.disabled
                || slot.disposed
                || slot.recording.is_some()
                || slot.opening
                || slot.stopping
            {
                debug!("start_recording ignored");
                return Ok(());
            }
            BusyGuard::set(self, &mut slot, Busy::Opening)
        };

        let opened = self.mic.open().await;
        let mut slot = self.lock();
        opening.release(&mut slot);
        if slot.disposed {
            if let Ok(mut stream) = opened {
                stream.stop();
            }
            debug!("Microphone released: pipeline disposed while opening");
            return Ok(());
        }
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Could not open microphone");
                self.state.send_modify(|s| s.error = Some(e.to_string()));
                return Err(e);
            }
        };
        let Some(samples) = stream.take_samples() else {
            stream.stop();
            let e = VoiceError::Unavailable("capture stream has no sample source".to_string());
            self.state.send_modify(|s| s.error = Some(e.to_string()));
            return Err(e);
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor(
            samples,
            stop_rx,
            self.state.clone(),
            self.on_level.clone(),
        ));
        info!(sample_rate = stream.sample_rate(), tracks = stream.track_count(), "Recording started");
        slot.recording = Some(Recording {
            stream,
            stop_tx,
            monitor,
        });
        self.state.send_modify(|s| {
            s.is_recording = true;
            s.error = None;
        });
        Ok(())
    }

    /// Stops capturing and hands the finished clip to the connection.
    ///
    /// Returns `Ok(None)` when nothing was being recorded. When the clip
    /// cannot be sent it is dropped, `error` is set and `is_processing`
    /// falls back to `false`.
    #[instrument(skip(self))]
    pub async fn stop_recording(&self) -> Result<Option<VoicePayload>, VoiceError> {
        let (
            Recording {
                mut stream,
                stop_tx,
                monitor,
            },
            _stopping,
        ) = {
            let mut slot = self.lock();
            let Some(recording) = slot.recording.take() else {
                debug!("stop_recording ignored: not recording");
                return Ok(None);
            };
            (recording, BusyGuard::set(self, &mut slot, Busy::Stopping))
        };

        let _ = stop_tx.send(());
        let samples = monitor.await.unwrap_or_else(|e| {
            warn!(error = %e, "Level monitor ended abnormally");
            Vec::new()
        });
        let sample_rate = stream.sample_rate();
        stream.stop();
        self.state.send_modify(|s| {
            s.is_recording = false;
            s.audio_level = 0.0;
        });

        let payload = match encode_clip(&samples, sample_rate) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Dropping recording");
                self.state.send_modify(|s| s.error = Some(e.to_string()));
                return Err(e);
            }
        };
        info!(duration_ms = payload.duration_ms, "Sending voice clip");

        self.state.send_modify(|s| s.is_processing = true);
        if !self.connection.send_voice(payload.clone()) {
            let e = VoiceError::NotConnected;
            warn!("Voice clip dropped: connection is down");
            self.state.send_modify(|s| {
                s.is_processing = false;
                s.error = Some(e.to_string());
            });
            return Err(e);
        }
        Ok(Some(payload))
    }

    /// Releases the microphone and stops every background task, whatever
    /// the current state. Safe to call more than once.
    pub fn dispose(&self) {
        let taken = {
            let mut slot = self.lock();
            slot.disposed = true;
            slot.recording.take()
        };
        if let Some(mut recording) = taken {
            recording.monitor.abort();
            recording.stream.stop();
            debug!("Recording discarded on dispose");
        }
        self.ack_listener.abort();
        self.state.send_if_modified(|s| {
            let changed = s.is_recording || s.audio_level != 0.0;
            s.is_recording = false;
            s.audio_level = 0.0;
            changed
        });
    }
}

impl Drop for VoicePipeline {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Samples the level at ~60 Hz and flushes captured audio every 250 ms.
/// Returns every sample captured once told to stop.
async fn monitor(
    mut samples: mpsc::UnboundedReceiver<Vec<f32>>,
    mut stop_rx: oneshot::Receiver<()>,
    state: watch::Sender<VoiceState>,
    on_level: Option<LevelCallback>,
) -> Vec<f32> {
    let mut sample_tick = tokio::time::interval(SAMPLE_INTERVAL);
    sample_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut flush_tick = tokio::time::interval(FLUSH_INTERVAL);
    flush_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut analyser: VecDeque<f32> = VecDeque::with_capacity(level::WINDOW);
    let mut pending: Vec<f32> = Vec::new();
    let mut chunks: Vec<Vec<f32>> = Vec::new();

    let mut drain = |pending: &mut Vec<f32>, analyser: &mut VecDeque<f32>| {
        while let Ok(block) = samples.try_recv() {
            for &s in &block {
                if analyser.len() == level::WINDOW {
                    analyser.pop_front();
                }
                analyser.push_back(s);
            }
            pending.extend_from_slice(&block);
        }
    };

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = sample_tick.tick() => {
                drain(&mut pending, &mut analyser);
                let window: Vec<f32> = analyser.iter().copied().collect();
                let value = level::audio_level(&window);
                state.send_if_modified(|s| {
                    let changed = s.audio_level != value;
                    s.audio_level = value;
                    changed
                });
                if let Some(callback) = &on_level {
                    callback(value);
                }
            }
            _ = flush_tick.tick() => {
                drain(&mut pending, &mut analyser);
                if !pending.is_empty() {
                    chunks.push(std::mem::take(&mut pending));
                }
            }
        }
    }

    drain(&mut pending, &mut analyser);
    if !pending.is_empty() {
        chunks.push(pending);
    }
    debug!(chunks = chunks.len(), "Finalizing recording");
    chunks.concat()
}

/// Clears `is_processing` once the server acknowledges a clip.
async fn listen_for_acks(
    mut events: tokio::sync::broadcast::Receiver<ConnectionEvent>,
    state: watch::Sender<VoiceState>,
) {
    use tokio::sync::broadcast::error::RecvError;
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::VoiceResponse(_)) => {
                state.send_if_modified(|s| std::mem::replace(&mut s.is_processing, false));
            }
            Ok(ConnectionEvent::Error { message, .. }) => {
                state.send_if_modified(|s| {
                    if !s.is_processing {
                        return false;
                    }
                    s.is_processing = false;
                    s.error = Some(message);
                    true
                });
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => debug!(skipped = n, "Voice ack listener lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
