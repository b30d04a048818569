// src/writer.rs
//
// Asynchronous output writer. A single worker thread drains a bounded FIFO
// of write/release commands so slow disk I/O never stalls the per-frame
// loop. Backpressure policy: block the producer briefly, then drop the
// frame and keep processing; bounded memory beats a complete output file.

use crate::preview;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Queue bound; throttles the producer when disk I/O falls behind.
pub const WRITE_QUEUE_CAP: usize = 200;
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(2);
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);
/// Worker poll interval; short enough to observe the stop flag while idle.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One frame handed to the writer. Pixels are RGB8, row-major.
#[derive(Debug, Clone)]
pub struct OutputFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_secs: f64,
}

/// Destination for written frames. Codec mechanics live behind this seam;
/// the worker only sees write/finalize.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &OutputFrame) -> Result<()>;
    fn finalize(&mut self) -> Result<()>;
}

enum WriterCommand {
    Write(OutputFrame),
    Release,
}

pub struct AsyncFrameWriter {
    tx: Sender<WriterCommand>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    dropped_frames: Arc<AtomicU64>,
    submit_timeout: Duration,
}

impl AsyncFrameWriter {
    pub fn new(sink: Box<dyn FrameSink>) -> Result<Self> {
        Self::with_submit_timeout(sink, SUBMIT_TIMEOUT)
    }

    /// `submit_timeout` is exposed for tests exercising the drop path
    /// without waiting out the production timeout.
    pub fn with_submit_timeout(sink: Box<dyn FrameSink>, submit_timeout: Duration) -> Result<Self> {
        let (tx, rx) = bounded(WRITE_QUEUE_CAP);
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("frame-writer".to_string())
            .spawn(move || worker(rx, sink, worker_running))
            .context("Failed to spawn frame writer thread")?;

        Ok(Self {
            tx,
            running,
            handle: Some(handle),
            dropped_frames: Arc::new(AtomicU64::new(0)),
            submit_timeout,
        })
    }

    /// Enqueue a frame, blocking up to the submit timeout. On timeout the
    /// frame is dropped with a warning and processing continues.
    pub fn submit(&self, frame: OutputFrame) {
        if !self.running.load(Ordering::Relaxed) {
            return;
        }
        if self
            .tx
            .send_timeout(WriterCommand::Write(frame), self.submit_timeout)
            .is_err()
        {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            warn!("Frame writer queue full, dropping frame to keep the pipeline moving");
        }
    }

    /// Ask the worker to finalize the underlying sink. Best-effort: silently
    /// ignored if the queue cannot accept the command in time.
    pub fn release(&self) {
        let _ = self
            .tx
            .send_timeout(WriterCommand::Release, self.submit_timeout);
    }

    /// Signal the worker to exit after draining the queue. The join is
    /// bounded; a hung sink must not block process shutdown.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("Frame writer did not drain within {:?}, detaching", JOIN_TIMEOUT);
            }
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

impl Drop for AsyncFrameWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker(rx: Receiver<WriterCommand>, mut sink: Box<dyn FrameSink>, running: Arc<AtomicBool>) {
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(WriterCommand::Write(frame)) => {
                if let Err(e) = sink.write_frame(&frame) {
                    error!("Frame write failed: {e:#}");
                }
            }
            Ok(WriterCommand::Release) => {
                if let Err(e) = sink.finalize() {
                    error!("Sink finalize failed: {e:#}");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Frame writer worker exited");
}

// ============================================================================
// SINKS
// ============================================================================

/// Appends JPEG-encoded frames to a single `.mjpeg` file. Deliberately
/// container-free; proper codec work is an external collaborator's job.
pub struct MjpegFileSink {
    out: BufWriter<File>,
    frames_written: u64,
    quality: u8,
}

impl MjpegFileSink {
    pub fn create(path: impl AsRef<Path>, quality: u8) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create output video {}", path.display()))?;
        Ok(Self {
            out: BufWriter::new(file),
            frames_written: 0,
            quality,
        })
    }
}

impl FrameSink for MjpegFileSink {
    fn write_frame(&mut self, frame: &OutputFrame) -> Result<()> {
        let jpeg = preview::encode_jpeg(&frame.pixels, frame.width, frame.height, self.quality)?;
        self.out.write_all(&jpeg)?;
        self.frames_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.out.flush().context("Failed to flush output video")?;
        debug!("Output video finalized ({} frames)", self.frames_written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn frame(tag: u8) -> OutputFrame {
        OutputFrame {
            pixels: vec![tag; 4 * 2 * 3],
            width: 4,
            height: 2,
            timestamp_secs: tag as f64,
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        written: Arc<Mutex<Vec<u8>>>,
        finalized: Arc<AtomicBool>,
    }

    impl FrameSink for RecordingSink {
        fn write_frame(&mut self, frame: &OutputFrame) -> Result<()> {
            self.written.lock().unwrap().push(frame.pixels[0]);
            Ok(())
        }
        fn finalize(&mut self) -> Result<()> {
            self.finalized.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Blocks every write until released, to keep the queue full.
    struct StallingSink {
        unblock: Arc<AtomicBool>,
        written: Arc<AtomicU64>,
    }

    impl FrameSink for StallingSink {
        fn write_frame(&mut self, _frame: &OutputFrame) -> Result<()> {
            while !self.unblock.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(2));
            }
            self.written.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn finalize(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_in_submission_order_and_finalizes_on_release() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let finalized = Arc::new(AtomicBool::new(false));
        let sink = RecordingSink {
            written: Arc::clone(&written),
            finalized: Arc::clone(&finalized),
        };

        let mut writer = AsyncFrameWriter::new(Box::new(sink)).unwrap();
        for tag in 1..=5u8 {
            writer.submit(frame(tag));
        }
        writer.release();
        writer.stop();

        assert_eq!(*written.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(finalized.load(Ordering::Relaxed));
        assert_eq!(writer.dropped_frames(), 0);
    }

    #[test]
    fn full_queue_drops_frames_instead_of_growing() {
        let unblock = Arc::new(AtomicBool::new(false));
        let written = Arc::new(AtomicU64::new(0));
        let sink = StallingSink {
            unblock: Arc::clone(&unblock),
            written: Arc::clone(&written),
        };

        let mut writer =
            AsyncFrameWriter::with_submit_timeout(Box::new(sink), Duration::from_millis(25))
                .unwrap();

        // One frame stalls inside the worker, WRITE_QUEUE_CAP fill the
        // queue; everything past that must be dropped, not buffered.
        let submitted = WRITE_QUEUE_CAP as u64 + 10;
        for i in 0..submitted {
            writer.submit(frame((i % 251) as u8));
        }
        assert!(writer.dropped_frames() >= 1);

        unblock.store(true, Ordering::Relaxed);
        writer.stop();
        assert_eq!(
            written.load(Ordering::Relaxed) + writer.dropped_frames(),
            submitted
        );
    }

    #[test]
    fn stop_drains_pending_commands() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink {
            written: Arc::clone(&written),
            finalized: Arc::new(AtomicBool::new(false)),
        };

        let mut writer = AsyncFrameWriter::new(Box::new(sink)).unwrap();
        for tag in 1..=20u8 {
            writer.submit(frame(tag));
        }
        writer.stop();
        assert_eq!(written.lock().unwrap().len(), 20);
    }

    #[test]
    fn mjpeg_sink_appends_jpeg_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mjpeg");
        let mut sink = MjpegFileSink::create(&path, 50).unwrap();
        sink.write_frame(&frame(1)).unwrap();
        sink.write_frame(&frame(2)).unwrap();
        sink.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        // Two JPEG start markers, one per frame.
        let starts = bytes.windows(2).filter(|w| *w == [0xFF, 0xD8]).count();
        assert_eq!(starts, 2);
    }
}
