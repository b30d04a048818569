use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub processing: ProcessingConfig,
    pub video: VideoConfig,
    pub cloud: CloudConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Process only every Nth frame (3 ≈ 3x speedup on 30fps sources).
    pub skip_frames: u64,
    /// Attach a JPEG preview to every Nth processed frame record.
    pub preview_interval: u64,
    /// Fixed reference heading in degrees. When unset, the majority flow
    /// estimate is used instead.
    pub manual_direction: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub input_dir: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub enabled: bool,
    pub base_url: String,
    pub upload_preset: String,
    pub folder: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            processing: ProcessingConfig {
                skip_frames: 3,
                preview_interval: 10,
                manual_direction: None,
            },
            video: VideoConfig {
                input_dir: "uploads".to_string(),
                output_dir: "processed_videos".to_string(),
            },
            cloud: CloudConfig {
                enabled: false,
                base_url: "https://api.cloudinary.com/v1_1/traffisense".to_string(),
                upload_preset: "traffisense_unsigned".to_string(),
                folder: "traffisense/processed".to_string(),
                max_retries: 3,
                timeout_secs: 120,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

// ============================================================================
// DETECTOR INPUT
// ============================================================================

/// One tracked detection as supplied by the external detector/tracker.
/// Track ids are assumed stable across frames; the core never verifies
/// identity continuity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackedObject {
    pub track_id: u64,
    pub class_id: u32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

/// One frame's worth of detector output plus optional pixel data for the
/// output writer and periodic previews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameInput {
    pub frame_index: u64,
    pub timestamp_secs: f64,
    pub width: u32,
    pub height: u32,
    pub objects: Vec<TrackedObject>,
    /// Raw RGB8 pixels, row-major. Detection-only sources leave this unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixels: Option<Vec<u8>>,
}

// ============================================================================
// EMITTED RECORDS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ObjectRecord {
    pub id: u64,
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
    pub direction: f64,
    pub speed: f64,
    pub is_wrong_way: bool,
    pub is_new_violation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    pub frame_width: u32,
    pub frame_height: u32,
    pub current_frame: u64,
    pub total_frames: u64,
    pub majority_direction: Option<f64>,
    pub objects: Vec<ObjectRecord>,
    /// Base64 JPEG preview, attached every `preview_interval` frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub message: String,
}

impl StatusRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            record_type: "status",
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ViolationDetail {
    pub id: u64,
    #[serde(rename = "type")]
    pub class_name: String,
    pub start_time: f64,
    pub end_time: f64,
    pub start_frame: u64,
    pub end_frame: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportSummary {
    pub total: usize,
    pub forward: usize,
    pub backward: usize,
    pub stationary: usize,
    pub violations: usize,
    pub violation_list: Vec<ViolationDetail>,
    pub average_speed: f64,
    pub class_breakdown: BTreeMap<String, usize>,
    pub full_video: String,
    pub cloud_video_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRecord {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub summary: ReportSummary,
}

impl ReportRecord {
    pub fn new(summary: ReportSummary) -> Self {
        Self {
            record_type: "report",
            summary,
        }
    }
}

/// Everything the pipeline stream can yield: one `Frame` per processed frame,
/// `Status` for long-running side effects, one terminal `Report`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StreamRecord {
    Frame(FrameRecord),
    Status(StatusRecord),
    Report(ReportRecord),
}
