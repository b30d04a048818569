// src/source.rs
//
// Frame input seam. The detector/tracker collaborator is external; the
// pipeline only needs something that yields per-frame detection sets in
// order. The JSONL source is the production adapter (one FrameInput per
// line); the static source backs deterministic tests.

use crate::types::FrameInput;
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub trait FrameSource {
    /// Next frame in stream order, `None` at end of stream. Errors are
    /// fatal for the stream.
    fn next_frame(&mut self) -> Result<Option<FrameInput>>;

    /// Total frames in the source, including frames the pipeline will skip.
    /// The analogue of container frame-count metadata.
    fn total_frames(&self) -> u64;
}

pub struct JsonlFrameSource {
    reader: BufReader<File>,
    total: u64,
    line_no: u64,
    path: String,
}

impl JsonlFrameSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let counting = File::open(path)
            .with_context(|| format!("Failed to open detection stream {display}"))?;
        let total = BufReader::new(counting)
            .lines()
            .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
            .count() as u64;

        let file = File::open(path)
            .with_context(|| format!("Failed to open detection stream {display}"))?;
        Ok(Self {
            reader: BufReader::new(file),
            total,
            line_no: 0,
            path: display,
        })
    }
}

impl FrameSource for JsonlFrameSource {
    fn next_frame(&mut self) -> Result<Option<FrameInput>> {
        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .with_context(|| format!("Failed to read {}", self.path))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let frame: FrameInput = serde_json::from_str(line.trim()).with_context(|| {
                format!("Malformed detection record at {}:{}", self.path, self.line_no)
            })?;
            return Ok(Some(frame));
        }
    }

    fn total_frames(&self) -> u64 {
        self.total
    }
}

/// In-memory source for tests and embedding.
pub struct StaticFrameSource {
    frames: VecDeque<FrameInput>,
    total: u64,
}

impl StaticFrameSource {
    pub fn new(frames: Vec<FrameInput>) -> Self {
        let total = frames.len() as u64;
        Self {
            frames: frames.into(),
            total,
        }
    }
}

impl FrameSource for StaticFrameSource {
    fn next_frame(&mut self) -> Result<Option<FrameInput>> {
        Ok(self.frames.pop_front())
    }

    fn total_frames(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrackedObject;
    use std::io::Write;

    fn sample_frame(index: u64) -> FrameInput {
        FrameInput {
            frame_index: index,
            timestamp_secs: index as f64 / 30.0,
            width: 640,
            height: 360,
            objects: vec![TrackedObject {
                track_id: 1,
                class_id: 2,
                cx: 100.0 + index as f32,
                cy: 200.0,
                w: 30.0,
                h: 20.0,
            }],
            pixels: None,
        }
    }

    #[test]
    fn jsonl_source_reads_frames_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for index in 0..3 {
            let line = serde_json::to_string(&sample_frame(index)).unwrap();
            writeln!(file, "{line}").unwrap();
        }
        writeln!(file).unwrap(); // trailing blank line is tolerated

        let mut source = JsonlFrameSource::open(file.path()).unwrap();
        assert_eq!(source.total_frames(), 3);
        assert_eq!(source.next_frame().unwrap().unwrap().frame_index, 0);
        assert_eq!(source.next_frame().unwrap().unwrap().frame_index, 1);
        assert_eq!(source.next_frame().unwrap().unwrap().frame_index, 2);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn malformed_line_is_a_fatal_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{not json").unwrap();
        let mut source = JsonlFrameSource::open(file.path()).unwrap();
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn missing_file_fails_at_open() {
        assert!(JsonlFrameSource::open("no/such/stream.jsonl").is_err());
    }

    #[test]
    fn static_source_drains_once() {
        let mut source = StaticFrameSource::new(vec![sample_frame(0), sample_frame(1)]);
        assert_eq!(source.total_frames(), 2);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }
}
