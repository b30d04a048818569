// src/pipeline.rs
//
// The per-run processing loop. All mutable run state lives in an explicit
// RunContext passed through every stage; nothing is process-global. The
// loop itself is strictly sequential; the async writer is the only
// concurrent component. Results are exposed as a finite, non-restartable
// stream over a bounded channel, and a dropped consumer is the cooperative
// cancellation signal, checked between frames.

use crate::cloud::CloudStorage;
use crate::preview;
use crate::report::{self, RunStats, MIN_TRACK_FRAMES};
use crate::source::FrameSource;
use crate::tracking::{flow::DirectionCache, history::TrackHistoryStore, kinematics};
use crate::types::{
    FrameInput, FrameRecord, ObjectRecord, ReportRecord, StatusRecord, StreamRecord,
};
use crate::violation::{lifecycle::ViolationLedger, state_machine};
use crate::writer::{AsyncFrameWriter, OutputFrame};
use anyhow::Result;
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const RESULT_CHANNEL_CAP: usize = 64;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub skip_frames: u64,
    pub preview_interval: u64,
    pub manual_direction: Option<f64>,
    /// Base name of the source video, used for upload public ids.
    pub video_name: String,
    /// Where the async writer persists the processed output.
    pub output_video: PathBuf,
    pub cloud_folder: String,
}

#[derive(Debug, Default)]
pub struct RunContext {
    pub history: TrackHistoryStore,
    pub flow: DirectionCache,
    pub stats: RunStats,
    pub violations: ViolationLedger,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Start the processing stream. The caller pulls one record at a time from
/// the returned receiver; dropping it cancels the run between frames.
pub fn spawn<S>(
    source: S,
    writer: AsyncFrameWriter,
    cloud: Option<CloudStorage>,
    options: PipelineOptions,
) -> mpsc::Receiver<Result<StreamRecord>>
where
    S: FrameSource + Send + 'static,
{
    let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAP);
    tokio::spawn(run(source, writer, cloud, options, tx));
    rx
}

async fn run<S: FrameSource>(
    mut source: S,
    mut writer: AsyncFrameWriter,
    cloud: Option<CloudStorage>,
    options: PipelineOptions,
    tx: mpsc::Sender<Result<StreamRecord>>,
) {
    let mut ctx = RunContext::new();
    let total_frames = source.total_frames();
    let skip = options.skip_frames.max(1);
    let preview_interval = options.preview_interval.max(1);

    info!(
        "Processing {} ({} frames, skip {})",
        options.video_name, total_frames, skip
    );

    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                // Settle partial progress before surfacing the fault.
                error!("Frame source failed: {e:#}");
                ctx.violations.finalize_all(&mut ctx.stats);
                writer.release();
                writer.stop();
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        if frame.frame_index % skip != 0 {
            continue;
        }

        let mut record = process_frame(&mut ctx, &frame, options.manual_direction, total_frames);

        if frame.frame_index % preview_interval == 0 {
            if let Some(pixels) = &frame.pixels {
                match preview::encode_preview(pixels, frame.width, frame.height) {
                    Ok(image) => record.image = Some(image),
                    Err(e) => warn!(
                        "Preview encoding failed on frame {}: {e:#}",
                        frame.frame_index
                    ),
                }
            }
        }

        if let Some(pixels) = frame.pixels {
            writer.submit(OutputFrame {
                pixels,
                width: frame.width,
                height: frame.height,
                timestamp_secs: frame.timestamp_secs,
            });
        }

        if tx.send(Ok(StreamRecord::Frame(record))).await.is_err() {
            info!("Consumer disconnected, cancelling stream");
            cancel(&mut ctx, &mut writer, cloud.as_ref(), &options).await;
            return;
        }
    }

    // End of stream: flush the output, settle remaining violations.
    writer.release();
    ctx.violations.finalize_all(&mut ctx.stats);
    writer.stop();

    let cloud_url = match &cloud {
        Some(cloud) if options.output_video.exists() => {
            let status = StatusRecord::new("Uploading video to cloud (this may take a moment)...");
            if tx.send(Ok(StreamRecord::Status(status))).await.is_err() {
                // Consumer left during shutdown; still persist the upload.
                upload_output(cloud, &options).await;
                return;
            }
            upload_output(cloud, &options).await
        }
        _ => None,
    };

    let full_video = options
        .output_video
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| options.output_video.display().to_string());
    let summary = report::aggregate(&mut ctx.stats, &full_video, cloud_url);
    let _ = tx
        .send(Ok(StreamRecord::Report(ReportRecord::new(summary))))
        .await;
}

/// Consumer went away: finalize open violations, drain and stop the writer,
/// attempt the best-effort upload, then terminate. Nothing is retried.
async fn cancel(
    ctx: &mut RunContext,
    writer: &mut AsyncFrameWriter,
    cloud: Option<&CloudStorage>,
    options: &PipelineOptions,
) {
    ctx.violations.finalize_all(&mut ctx.stats);
    writer.release();
    writer.stop();
    if let Some(cloud) = cloud {
        if options.output_video.exists() {
            let _ = upload_output(cloud, options).await;
        }
    }
}

async fn upload_output(cloud: &CloudStorage, options: &PipelineOptions) -> Option<String> {
    cloud
        .upload(
            &options.output_video,
            &format!("processed_{}", options.video_name),
            &options.cloud_folder,
        )
        .await
}

/// Advance every tracking stage by one frame and build its output record.
pub fn process_frame(
    ctx: &mut RunContext,
    frame: &FrameInput,
    manual_direction: Option<f64>,
    total_frames: u64,
) -> FrameRecord {
    let mut record = FrameRecord {
        frame_width: frame.width,
        frame_height: frame.height,
        current_frame: frame.frame_index,
        total_frames,
        majority_direction: None,
        objects: Vec::with_capacity(frame.objects.len()),
        image: None,
    };

    let mut current_ids: HashSet<u64> = HashSet::with_capacity(frame.objects.len());

    for obj in &frame.objects {
        current_ids.insert(obj.track_id);

        let track = ctx
            .history
            .observe(obj.track_id, obj.class_id, (obj.cx, obj.cy));
        let kin = kinematics::estimate(track);

        if track.len() >= MIN_TRACK_FRAMES {
            ctx.stats.mark_counted(obj.track_id, track.class_id);
        }
        if track.len() >= kinematics::MIN_SAMPLES {
            ctx.stats.record_speed(obj.track_id, kin.speed);
            if kin.is_moving() {
                ctx.flow.insert(obj.track_id, kin.heading);
            }
        }

        // Each object sees the flow estimate with its own heading already
        // inserted; a detection-free frame reports no majority at all.
        record.majority_direction = ctx.flow.majority_direction();
        let reference = manual_direction.or(record.majority_direction);

        let state = state_machine::assess(track, kin.speed, kin.heading, reference);
        let is_wrong_way = state.is_wrong_way();
        let mut is_new_violation = false;
        if is_wrong_way {
            ctx.violations
                .record_wrong_way(obj.track_id, frame.timestamp_secs, frame.frame_index);
            is_new_violation = ctx.stats.mark_wrong_way(obj.track_id);
        } else {
            ctx.stats.mark_with_flow(obj.track_id);
            ctx.violations.close_if_clear(obj.track_id, &mut ctx.stats);
        }

        record.objects.push(ObjectRecord {
            id: obj.track_id,
            bbox: [obj.cx, obj.cy, obj.w, obj.h],
            direction: kin.heading,
            speed: kin.speed,
            is_wrong_way,
            is_new_violation,
        });
    }

    ctx.violations.close_vanished(&current_ids, &mut ctx.stats);
    record
}
