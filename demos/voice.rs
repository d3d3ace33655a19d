//! Interactive voice conversation: microphone in, spoken replies out.
//!
//! Run with `cargo run --example voice` and a `GEMINI_API_KEY` in the
//! environment. Ctrl-C hangs up.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::Level;

use calliope::error::{CalliopeError, Result};
use calliope::live::capture::{f32_to_pcm16, mean_abs_level};
use calliope::live::config::INPUT_SAMPLE_RATE_HZ;
use calliope::live::{CaptureSource, LiveConfig, LiveEvent, LiveSession};

const INPUT_CHUNK_SIZE: usize = 1024;
const OUTPUT_CHUNK_SIZE: usize = 1024;
const OUTPUT_BUFFER_SECONDS: usize = 30;

/// Microphone ownership behind the session's capture seam. cpal streams are
/// not `Send`, so the stream lives on a dedicated thread that holds it until
/// `stop` is called.
struct MicCapture {
    frames: tokio::sync::mpsc::Sender<Vec<f32>>,
    sample_rate: Arc<AtomicU32>,
    stop: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicCapture {
    fn new(frames: tokio::sync::mpsc::Sender<Vec<f32>>, sample_rate: Arc<AtomicU32>) -> Self {
        Self {
            frames,
            sample_rate,
            stop: None,
            thread: None,
        }
    }
}

impl CaptureSource for MicCapture {
    fn start(&mut self) -> Result<()> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<u32>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let frames = self.frames.clone();

        let thread = std::thread::spawn(move || {
            let host = cpal::default_host();
            let Some(device) = host.default_input_device() else {
                let _ = ready_tx.send(Err(CalliopeError::DeviceUnavailable(
                    "No default input device".to_string(),
                )));
                return;
            };
            let supported = match device.default_input_config() {
                Ok(config) => config,
                Err(e) => {
                    let _ = ready_tx.send(Err(map_capture_error(e.to_string())));
                    return;
                }
            };
            let sample_rate = supported.sample_rate().0;
            let channels = supported.channels() as usize;

            let stream = match device.build_input_stream(
                &supported.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Mono: take the first channel of each frame.
                    let mono: Vec<f32> = data.chunks(channels).map(|frame| frame[0]).collect();
                    let _ = frames.try_send(mono);
                },
                |err| eprintln!("input stream error: {err}"),
                None,
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(map_capture_error(e.to_string())));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(CalliopeError::DeviceUnavailable(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(sample_rate));
            // Hold the stream open until the session releases us.
            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(rate)) => {
                self.sample_rate.store(rate, Ordering::SeqCst);
                self.stop = Some(stop_tx);
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CalliopeError::DeviceUnavailable(
                "Capture thread died during setup".to_string(),
            )),
        }
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn map_capture_error(message: String) -> CalliopeError {
    if message.to_ascii_lowercase().contains("permission") {
        CalliopeError::PermissionDenied(message)
    } else {
        CalliopeError::DeviceUnavailable(message)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let (frames_tx, mut frames_rx) = tokio::sync::mpsc::channel::<Vec<f32>>(1024);
    let mic_rate = Arc::new(AtomicU32::new(0));

    let config = LiveConfig {
        voice: Some("Puck".to_string()),
        instructions: Some(
            "You are a friendly voice assistant. Keep replies short and conversational."
                .to_string(),
        ),
        ..LiveConfig::default()
    };
    let mut session = LiveSession::new(config);
    session.attach_capture(Box::new(MicCapture::new(frames_tx, Arc::clone(&mic_rate))));
    session.connect().await?;
    eprintln!("Connected. Speak; Ctrl-C to hang up.");

    // Speaker side: decoded response audio goes through a ring buffer the
    // output callback drains. An interruption flushes whatever is queued.
    let host = cpal::default_host();
    let output = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no default output device"))?;
    let output_config = output.default_output_config()?;
    let output_rate = output_config.sample_rate().0;
    let output_channels = output_config.channels() as usize;

    let (mut speaker_tx, mut speaker_rx) =
        HeapRb::<f32>::new(output_rate as usize * OUTPUT_BUFFER_SECONDS).split();
    let flush = Arc::new(AtomicBool::new(false));
    let flush_out = Arc::clone(&flush);

    let output_stream = output.build_output_stream(
        &output_config.into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if flush_out.swap(false, Ordering::SeqCst) {
                while speaker_rx.try_pop().is_some() {}
            }
            for frame in data.chunks_mut(output_channels) {
                let sample = speaker_rx.try_pop().unwrap_or(0.0);
                for slot in frame {
                    *slot = sample;
                }
            }
        },
        |err| eprintln!("output stream error: {err}"),
        None,
    )?;
    output_stream.play()?;

    let in_rate = mic_rate.load(Ordering::SeqCst).max(1);
    let mut in_resampler = FastFixedIn::<f32>::new(
        INPUT_SAMPLE_RATE_HZ as f64 / in_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        INPUT_CHUNK_SIZE,
        1,
    )?;
    let mut out_resampler: Option<FastFixedIn<f32>> = None;
    let mut pending_input: VecDeque<f32> = VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2);

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        interrupted_signal.store(true, Ordering::SeqCst);
    });

    loop {
        if interrupted.load(Ordering::SeqCst) {
            session.close().await?;
        }

        // Pump captured frames out first; the session drops them if it is
        // no longer active.
        while let Ok(frame) = frames_rx.try_recv() {
            pending_input.extend(frame);
            while pending_input.len() >= INPUT_CHUNK_SIZE {
                let chunk: Vec<f32> = pending_input.drain(..INPUT_CHUNK_SIZE).collect();
                let resampled = in_resampler.process(&[chunk.as_slice()], None)?;
                let Some(mono) = resampled.first() else {
                    continue;
                };
                let pcm = f32_to_pcm16(mono);
                print_level(mean_abs_level(&pcm));
                session.send_audio(&pcm).await?;
            }
        }

        match tokio::time::timeout(Duration::from_millis(20), session.next_event()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(event)) => match event {
                LiveEvent::Segment(segment) => {
                    if out_resampler.is_none() {
                        out_resampler = Some(FastFixedIn::<f32>::new(
                            output_rate as f64 / segment.sample_rate as f64,
                            1.0,
                            PolynomialDegree::Cubic,
                            OUTPUT_CHUNK_SIZE,
                            1,
                        )?);
                    }
                    let Some(resampler) = out_resampler.as_mut() else {
                        continue;
                    };
                    let floats: Vec<f32> = segment
                        .samples
                        .iter()
                        .map(|&s| s as f32 / i16::MAX as f32)
                        .collect();
                    for chunk in floats.chunks(OUTPUT_CHUNK_SIZE) {
                        let mut padded = chunk.to_vec();
                        padded.resize(OUTPUT_CHUNK_SIZE, 0.0);
                        let resampled = resampler.process(&[padded.as_slice()], None)?;
                        if let Some(mono) = resampled.first() {
                            for &sample in mono {
                                let _ = speaker_tx.try_push(sample);
                            }
                        }
                    }
                    session.segment_finished(segment.id);
                }
                LiveEvent::Interrupted { cancelled } => {
                    flush.store(true, Ordering::SeqCst);
                    eprintln!("\n[interrupted: {cancelled} segment(s) flushed]");
                }
                LiveEvent::Text { text } => eprintln!("\n{text}"),
                LiveEvent::TurnComplete => eprintln!("\n[turn complete]"),
                LiveEvent::Closed => {
                    eprintln!("\n[session closed]");
                    break;
                }
                LiveEvent::Error { message } => {
                    eprintln!("\n[transport error: {message}]");
                    break;
                }
            },
        }
    }

    Ok(())
}

fn print_level(level: f32) {
    let bars = (level * 30.0).round() as usize;
    eprint!("\r[{:<30}]", "#".repeat(bars.min(30)));
}
