//! Hardware output through the system's default `cpal` device.
//!
//! `cpal::Stream` is not `Send`, so each stream lives on its own thread and
//! is driven through a command channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::playback::{AudioOutput, OutputSpec, OutputStream, RenderCallback};
use core_async::sync::{mpsc, oneshot};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, info, warn};

/// Output backed by the default device of the default `cpal` host.
#[derive(Debug, Clone, Default)]
pub struct CpalOutput;

impl CpalOutput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutput for CpalOutput {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&self, spec: OutputSpec, callback: RenderCallback) -> Result<Box<dyn OutputStream>> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let thread = thread::Builder::new()
            .name("opuskit-cpal-output".into())
            .spawn(move || run_stream(spec, callback, ready_tx, command_rx))?;

        match ready_rx.blocking_recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                commands: Some(command_tx),
                playing: AtomicBool::new(false),
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(BridgeError::Device(
                "Output thread exited before the stream was ready".into(),
            )),
        }
    }
}

enum Command {
    Play,
    Pause,
}

struct CpalStream {
    commands: Option<mpsc::UnboundedSender<Command>>,
    playing: AtomicBool,
    thread: Option<JoinHandle<()>>,
}

impl CpalStream {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .as_ref()
            .and_then(|tx| tx.send(command).ok())
            .ok_or_else(|| BridgeError::Device("Output stream is closed".into()))
    }
}

impl OutputStream for CpalStream {
    fn play(&self) -> Result<()> {
        self.send(Command::Play)?;
        self.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.send(Command::Pause)?;
        self.playing.store(false, Ordering::Release);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        // Closing the channel ends the stream thread.
        self.commands.take();

        if let Some(handle) = self.thread.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("cpal output thread panicked");
            }
        }
    }
}

fn run_stream(
    spec: OutputSpec,
    mut callback: RenderCallback,
    ready: oneshot::Sender<Result<()>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        let _ = ready.send(Err(BridgeError::NotAvailable(
            "No audio output device found".into(),
        )));
        return;
    };

    let config = cpal::StreamConfig {
        channels: spec.channels,
        sample_rate: cpal::SampleRate(spec.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback(data),
        |err| warn!(error = %err, "cpal stream error"),
        None,
    ) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(BridgeError::Device(format!(
                "Failed to build output stream: {e}"
            ))));
            return;
        }
    };

    // Some hosts start streams on creation.
    if let Err(e) = stream.pause() {
        debug!(error = %e, "Initial pause not supported by host");
    }

    info!(
        device = %device.name().unwrap_or_default(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        "Opened cpal output"
    );

    if ready.send(Ok(())).is_err() {
        return;
    }

    while let Some(command) = commands.blocking_recv() {
        let result = match command {
            Command::Play => stream.play(),
            Command::Pause => stream.pause(),
        };
        if let Err(e) = result {
            warn!(error = %e, "cpal stream control failed");
        }
    }

    drop(stream);
    debug!("Closed cpal output");
}
