//! Microphone access.
//!
//! A [`MicrophoneSource`] hands out a [`CaptureStream`]: a receiver of mono
//! sample blocks plus the hardware tracks feeding it. Stopping the stream
//! releases every track.

use super::VoiceError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One live input track (a device stream).
pub trait Track: Send {
    fn stop(&mut self);
}

pub struct CaptureStream {
    sample_rate: u32,
    samples: Option<mpsc::UnboundedReceiver<Vec<f32>>>,
    tracks: Vec<Box<dyn Track>>,
}

impl CaptureStream {
    pub fn new(
        sample_rate: u32,
        samples: mpsc::UnboundedReceiver<Vec<f32>>,
        tracks: Vec<Box<dyn Track>>,
    ) -> Self {
        Self {
            sample_rate,
            samples: Some(samples),
            tracks,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of tracks still held open.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Takes the sample receiver. Only the first call gets it.
    pub fn take_samples(&mut self) -> Option<mpsc::UnboundedReceiver<Vec<f32>>> {
        self.samples.take()
    }

    /// Stops and releases every track. Idempotent.
    pub fn stop(&mut self) {
        for mut track in self.tracks.drain(..) {
            track.stop();
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Grants access to a microphone.
#[async_trait]
pub trait MicrophoneSource: Send + Sync {
    /// Opens the device. Fails with [`VoiceError::PermissionDenied`] or
    /// [`VoiceError::Unavailable`].
    async fn open(&self) -> Result<CaptureStream, VoiceError>;
}

/// Always refuses. Used when the binary is built without microphone support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMicrophone;

#[async_trait]
impl MicrophoneSource for NoMicrophone {
    async fn open(&self) -> Result<CaptureStream, VoiceError> {
        Err(VoiceError::Unavailable(
            "built without the `microphone` feature".to_string(),
        ))
    }
}

#[cfg(feature = "microphone")]
pub use cpal_source::CpalMicrophone;

#[cfg(feature = "microphone")]
mod cpal_source {
    use super::{CaptureStream, MicrophoneSource, Track};
    use crate::voice::VoiceError;
    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::{sync::mpsc as std_mpsc, thread};
    use tokio::sync::mpsc;
    use tracing::{debug, error, info};

    /// The default input device of the default `cpal` host.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct CpalMicrophone;

    /// `cpal::Stream` is not `Send`, so it lives on its own thread until stopped.
    struct CpalTrack {
        stop_tx: Option<std_mpsc::Sender<()>>,
        thread: Option<thread::JoinHandle<()>>,
    }

    impl Track for CpalTrack {
        fn stop(&mut self) {
            if let Some(tx) = self.stop_tx.take() {
                let _ = tx.send(());
            }
            if let Some(handle) = self.thread.take() {
                let _ = handle.join();
            }
        }
    }

    fn to_mono(data: &[f32], channels: usize) -> Vec<f32> {
        if channels <= 1 {
            return data.to_vec();
        }
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    fn run_stream(
        samples_tx: mpsc::UnboundedSender<Vec<f32>>,
        ready_tx: std_mpsc::SyncSender<Result<u32, VoiceError>>,
        stop_rx: std_mpsc::Receiver<()>,
    ) {
        let host = cpal::default_host();
        let Some(device) = host.default_input_device() else {
            let _ = ready_tx.send(Err(VoiceError::Unavailable(
                "no input device available".to_string(),
            )));
            return;
        };
        let supported = match device.default_input_config() {
            Ok(config) => config,
            Err(e) => {
                let _ = ready_tx.send(Err(VoiceError::Unavailable(e.to_string())));
                return;
            }
        };
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels as usize;
        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate, channels, ?sample_format,
            "Opening microphone"
        );

        let err_fn = |err| error!("Audio input stream error: {}", err);
        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = samples_tx.send(to_mono(data, channels));
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let as_f32: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                    let _ = samples_tx.send(to_mono(&as_f32, channels));
                },
                err_fn,
                None,
            ),
            other => {
                let _ = ready_tx.send(Err(VoiceError::Unavailable(format!(
                    "unsupported sample format {other:?}"
                ))));
                return;
            }
        };
        let stream = match stream {
            Ok(stream) => stream,
            Err(cpal::BuildStreamError::BackendSpecific { err }) => {
                let _ = ready_tx.send(Err(VoiceError::PermissionDenied(err.to_string())));
                return;
            }
            Err(e) => {
                let _ = ready_tx.send(Err(VoiceError::Unavailable(e.to_string())));
                return;
            }
        };
        if let Err(e) = stream.play() {
            let _ = ready_tx.send(Err(VoiceError::PermissionDenied(e.to_string())));
            return;
        }
        let _ = ready_tx.send(Ok(sample_rate));

        // Either an explicit stop or the track being dropped ends the stream.
        let _ = stop_rx.recv();
        drop(stream);
        debug!("Microphone stream released");
    }

    #[async_trait]
    impl MicrophoneSource for CpalMicrophone {
        async fn open(&self) -> Result<CaptureStream, VoiceError> {
            let (samples_tx, samples_rx) = mpsc::unbounded_channel();
            let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
            let (stop_tx, stop_rx) = std_mpsc::channel();
            let thread = thread::Builder::new()
                .name("microphone".to_string())
                .spawn(move || run_stream(samples_tx, ready_tx, stop_rx))
                .map_err(|e| VoiceError::Unavailable(e.to_string()))?;

            let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
                .await
                .map_err(|e| VoiceError::Unavailable(e.to_string()))?
                .map_err(|_| VoiceError::Unavailable("microphone thread exited".to_string()))?;
            let sample_rate = ready?;

            let track = CpalTrack {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            };
            Ok(CaptureStream::new(
                sample_rate,
                samples_rx,
                vec![Box::new(track)],
            ))
        }
    }
}
