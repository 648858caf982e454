//! Real-time audio output via cpal.
//!
//! The emulation thread enqueues sample blocks; a dedicated audio
//! thread owns the (non-`Send`) cpal stream.  The stream callback
//! drains the queue into a small internal buffer and pads underruns
//! with silence — the CPU side must never stall on audio, so a glitch
//! beats a block.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{unbounded, Receiver, Sender};

use super::phonemes::SAMPLE_RATE;

pub const CHANNELS: u16 = 1;
pub const BLOCK_FRAMES: u32 = 512;

struct PlayBuffer {
    samples: VecDeque<f32>,
    /// Did the last callback run without underrunning?
    producing: bool,
}

pub struct AudioPlayer {
    tx: Sender<Vec<f32>>,
    rx: Receiver<Vec<f32>>,
    buffer: Arc<Mutex<PlayBuffer>>,
    shutdown: Arc<AtomicBool>,
    running: bool,
}

impl AudioPlayer {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            buffer: Arc::new(Mutex::new(PlayBuffer {
                samples: VecDeque::new(),
                producing: false,
            })),
            shutdown: Arc::new(AtomicBool::new(false)),
            running: false,
        }
    }

    /// Open the output device and start the stream.
    pub fn start(&mut self) -> Result<(), String> {
        if self.running {
            return Ok(());
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        self.shutdown = shutdown.clone();

        let rx = self.rx.clone();
        let buffer = self.buffer.clone();

        let (result_tx, result_rx) = std::sync::mpsc::sync_channel::<Result<(), String>>(1);

        thread::Builder::new()
            .name("ssi263-audio".into())
            .spawn(move || {
                let result = (|| -> Result<cpal::Stream, String> {
                    let host = cpal::default_host();
                    let device = host
                        .default_output_device()
                        .ok_or_else(|| "no audio output device found".to_string())?;

                    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
                    eprintln!("[audio] device '{dev_name}', {SAMPLE_RATE}Hz mono");

                    let config = cpal::StreamConfig {
                        channels: CHANNELS,
                        sample_rate: cpal::SampleRate(SAMPLE_RATE),
                        buffer_size: cpal::BufferSize::Fixed(BLOCK_FRAMES),
                    };

                    let stream = device
                        .build_output_stream(
                            &config,
                            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                                fill_output(&rx, &buffer, data);
                            },
                            move |err| {
                                eprintln!("[audio] stream error: {err}");
                            },
                            None,
                        )
                        .map_err(|e| format!("build_output_stream failed: {e}"))?;

                    stream
                        .play()
                        .map_err(|e| format!("stream.play() failed: {e}"))?;

                    Ok(stream)
                })();

                match result {
                    Ok(stream) => {
                        let _ = result_tx.send(Ok(()));
                        // Park here: this thread owns the stream.
                        while !shutdown.load(Ordering::Relaxed) {
                            thread::park_timeout(Duration::from_millis(100));
                        }
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = result_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| format!("spawn audio thread: {e}"))?;

        result_rx
            .recv()
            .map_err(|_| "audio thread died before reporting status".to_string())??;

        self.running = true;
        Ok(())
    }

    /// Close the device, drop queued samples.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.shutdown.store(true, Ordering::Relaxed);
        self.running = false;

        while self.rx.try_recv().is_ok() {}
        if let Ok(mut buf) = self.buffer.lock() {
            buf.samples.clear();
            buf.producing = false;
        }
    }

    /// Enqueue a block.  Never blocks; a no-op while stopped.
    pub fn play(&self, samples: Vec<f32>) {
        if !self.running || samples.is_empty() {
            return;
        }
        let _ = self.tx.send(samples);
    }

    pub fn is_playing(&self) -> bool {
        let buf = match self.buffer.lock() {
            Ok(b) => b,
            Err(_) => return false,
        };
        buf.producing || !buf.samples.is_empty() || !self.rx.is_empty()
    }
}

impl Default for AudioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Stream callback body: top up the internal buffer from the queue,
/// copy out, pad the tail with silence on underrun.
fn fill_output(rx: &Receiver<Vec<f32>>, buffer: &Arc<Mutex<PlayBuffer>>, data: &mut [f32]) {
    let mut buf = match buffer.lock() {
        Ok(b) => b,
        Err(_) => {
            data.fill(0.0);
            return;
        }
    };

    while buf.samples.len() < data.len() {
        match rx.try_recv() {
            Ok(block) => buf.samples.extend(block),
            Err(_) => break,
        }
    }

    let mut filled = 0;
    while filled < data.len() {
        match buf.samples.pop_front() {
            Some(s) => {
                data[filled] = s;
                filled += 1;
            }
            None => break,
        }
    }
    data[filled..].fill(0.0);
    buf.producing = filled == data.len();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_drains_queue_and_pads() {
        let (tx, rx) = unbounded();
        let buffer = Arc::new(Mutex::new(PlayBuffer {
            samples: VecDeque::new(),
            producing: false,
        }));

        tx.send(vec![0.1f32, 0.2, 0.3]).unwrap();
        let mut out = [9.9f32; 6];
        fill_output(&rx, &buffer, &mut out);

        assert_eq!(&out[..3], &[0.1, 0.2, 0.3]);
        assert_eq!(&out[3..], &[0.0, 0.0, 0.0]);
        // Underrun: not producing.
        assert!(!buffer.lock().unwrap().producing);
    }

    #[test]
    fn test_callback_keeps_leftover_samples() {
        let (tx, rx) = unbounded();
        let buffer = Arc::new(Mutex::new(PlayBuffer {
            samples: VecDeque::new(),
            producing: false,
        }));

        tx.send((0..10).map(|i| i as f32).collect()).unwrap();
        let mut out = [0.0f32; 4];
        fill_output(&rx, &buffer, &mut out);
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0]);
        assert!(buffer.lock().unwrap().producing);

        fill_output(&rx, &buffer, &mut out);
        assert_eq!(out, [4.0, 5.0, 6.0, 7.0]);
        assert_eq!(buffer.lock().unwrap().samples.len(), 2);
    }

    #[test]
    fn test_play_is_noop_while_stopped() {
        let player = AudioPlayer::new();
        player.play(vec![0.5; 128]);
        assert!(!player.is_playing());
    }
}
