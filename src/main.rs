// src/main.rs

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use traffisense::cloud::CloudStorage;
use traffisense::pipeline::{self, PipelineOptions};
use traffisense::source::JsonlFrameSource;
use traffisense::types::{Config, ReportSummary, StreamRecord};
use traffisense::writer::{AsyncFrameWriter, MjpegFileSink};
use walkdir::WalkDir;

/// JPEG quality for the persisted output video. Previews embedded in the
/// result stream use their own, lower setting.
const OUTPUT_JPEG_QUALITY: u8 = 80;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("traffisense={}", config.logging.level))
        .init();

    info!("🚦 TraffiSense Wrong-Way Detection Starting");
    info!("✓ Configuration loaded from {config_path}");

    fs::create_dir_all(&config.video.output_dir)
        .with_context(|| format!("Failed to create output dir {}", config.video.output_dir))?;

    let cloud = if config.cloud.enabled {
        match CloudStorage::from_config(&config.cloud) {
            Ok(storage) => Some(storage),
            Err(e) => {
                warn!("Cloud storage unavailable, continuing without uploads: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let streams = find_detection_streams(&config.video.input_dir)?;
    if streams.is_empty() {
        error!("No detection streams found in {}", config.video.input_dir);
        return Ok(());
    }
    info!("Found {} detection stream(s) to process", streams.len());

    for (idx, stream_path) in streams.iter().enumerate() {
        info!("========================================");
        info!(
            "Processing stream {}/{}: {}",
            idx + 1,
            streams.len(),
            stream_path.display()
        );
        info!("========================================");

        match process_stream(stream_path, &config, cloud.clone()).await {
            Ok(summary) => {
                info!("✓ Stream processed successfully!");
                info!("  🚗 Vehicles counted: {}", summary.total);
                info!(
                    "  ➡️  With flow: {}   ⬅️  Against flow: {}   ⏸ Stationary: {}",
                    summary.forward, summary.backward, summary.stationary
                );
                if summary.violations > 0 {
                    warn!(
                        "  🚨 WRONG-WAY VIOLATIONS: {} vehicle(s), {} record(s)",
                        summary.violations,
                        summary.violation_list.len()
                    );
                } else {
                    info!("  🚨 Wrong-way violations: 0");
                }
                info!("  📈 Average max speed: {:.1}", summary.average_speed);
                match &summary.cloud_video_url {
                    Some(url) => info!("  ☁️  Uploaded: {url}"),
                    None => info!("  ☁️  Cloud upload: skipped"),
                }
            }
            Err(e) => {
                error!("Failed to process {}: {e:#}", stream_path.display());
            }
        }
    }

    Ok(())
}

/// Detection streams are JSONL files anywhere under the input directory.
fn find_detection_streams(input_dir: &str) -> Result<Vec<PathBuf>> {
    let mut streams: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("jsonl"))
                .unwrap_or(false)
        })
        .collect();
    streams.sort();
    Ok(streams)
}

async fn process_stream(
    stream_path: &Path,
    config: &Config,
    cloud: Option<CloudStorage>,
) -> Result<ReportSummary> {
    let name = stream_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stream".to_string());

    let output_dir = Path::new(&config.video.output_dir);
    let output_video = output_dir.join(format!("processed_{name}.mjpeg"));
    let results_path = output_dir.join(format!("{name}_results.jsonl"));

    let source = JsonlFrameSource::open(stream_path)?;
    let sink = MjpegFileSink::create(&output_video, OUTPUT_JPEG_QUALITY)?;
    let writer = AsyncFrameWriter::new(Box::new(sink))?;

    let options = PipelineOptions {
        skip_frames: config.processing.skip_frames,
        preview_interval: config.processing.preview_interval,
        manual_direction: config.processing.manual_direction,
        video_name: name,
        output_video,
        cloud_folder: config.cloud.folder.clone(),
    };

    let results_file = File::create(&results_path)
        .with_context(|| format!("Failed to create {}", results_path.display()))?;
    let mut results = BufWriter::new(results_file);

    let mut rx = pipeline::spawn(source, writer, cloud, options);
    let mut summary: Option<ReportSummary> = None;
    while let Some(record) = rx.recv().await {
        let record = record?;
        let line = serde_json::to_string(&record)?;
        writeln!(results, "{line}")
            .with_context(|| format!("Failed to write {}", results_path.display()))?;
        if let StreamRecord::Report(report) = record {
            summary = Some(report.summary);
        }
    }
    results.flush()?;

    summary.context("Stream ended without a final report")
}
