//! The compress command: select inputs, run one batch job, report.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clarity_core::{
    CompressionSummary, Config, ImageRecompressor, InputSelection, JobEvent, JobEvents,
    JobRequest, JobSlot, JobTotals, Settings,
};

use crate::cli::Args;
use crate::render::{OutputMode, Renderer};

/// Compress the images named by `args`, writing progress to `out`.
pub async fn run<W: Write>(
    args: &Args,
    config: &Config,
    out: &mut W,
) -> Result<CompressionSummary> {
    let settings = Settings::load(&config.settings_file);

    let recursive = settings.recursive && !args.no_recursive;
    let selection = select_inputs(&args.paths, &settings.extensions, recursive)?;
    if selection.is_empty() {
        bail!("No images: the given paths contain no supported image files");
    }
    tracing::info!("{} image(s) selected", selection.len());

    let output_dir = args
        .output
        .clone()
        .or_else(|| settings.last_output_dir.clone())
        .context("No save location: choose one with --output <DIR>")?;
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output folder {}", output_dir.display()))?;

    remember_output_dir(config, &settings, &output_dir);

    let effective = Settings {
        jpeg_quality: args.jpeg_quality.unwrap_or(settings.jpeg_quality),
        png_compression: args.png_compression.unwrap_or(settings.png_compression),
        ..settings.clone()
    };
    let processor = ImageRecompressor::from_settings(&effective);
    let request = JobRequest::new(selection.into_inputs(), output_dir, Arc::new(processor));

    let mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let mut slot = JobSlot::new();
    let events = slot.submit(request)?;
    let renderer = Renderer::new(&mut *out, mode);
    let totals = match follow(events, &slot, renderer, ctrl_c()).await {
        Ok(totals) => totals,
        Err(e) => {
            // Never leave the worker writing files behind us
            slot.shutdown().await?;
            return Err(e);
        }
    };
    slot.finish().await?;

    Ok(CompressionSummary::from_totals(&totals))
}

/// Expand the given paths into an ordered, deduplicated input list.
///
/// Folders are scanned for supported extensions; explicit files are taken
/// as-is. Paths that do not exist, and files whose name an earlier input
/// already uses, are skipped with a warning.
pub fn select_inputs(
    paths: &[PathBuf],
    extensions: &[String],
    recursive: bool,
) -> Result<InputSelection> {
    let mut selection = InputSelection::with_extensions(extensions);

    for path in paths {
        if path.is_dir() {
            let added = selection.add_folder(path, recursive)?;
            if added == 0 {
                tracing::warn!("No supported images found in {}", path.display());
            }
        } else if path.is_file() {
            selection.add_files([path.clone()]);
        } else {
            tracing::warn!("Path does not exist: {}", path.display());
        }
    }

    Ok(selection)
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Render events until `Completed`, turning `interrupt` into a cancel request.
///
/// An interrupt does not end the loop: the job still reports `Completed`.
async fn follow<W: Write>(
    mut events: JobEvents,
    slot: &JobSlot,
    mut renderer: Renderer<W>,
    interrupt: impl Future<Output = ()>,
) -> Result<JobTotals> {
    tokio::pin!(interrupt);
    let mut interrupted = false;

    loop {
        tokio::select! {
            biased;

            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                tracing::info!("Interrupted - stopping after the current image");
                slot.cancel();
            }

            event = events.recv() => {
                let Some(event) = event else {
                    bail!("Job ended without a completion event");
                };
                renderer.event(&event)?;

                if let JobEvent::Completed {
                    processed_count,
                    original_size_total,
                    compressed_size_total,
                } = event
                {
                    return Ok(JobTotals {
                        processed_count,
                        original_size_total,
                        compressed_size_total,
                    });
                }
            }
        }
    }
}

/// Persist the chosen output folder for next time. Failures are not fatal.
fn remember_output_dir(config: &Config, settings: &Settings, output_dir: &Path) {
    if settings.last_output_dir.as_deref() == Some(output_dir) {
        return;
    }

    let updated = Settings {
        last_output_dir: Some(output_dir.to_path_buf()),
        ..settings.clone()
    };
    let saved = config
        .ensure_dirs()
        .map_err(anyhow::Error::from)
        .and_then(|_| updated.save(&config.settings_file));
    if let Err(e) = saved {
        tracing::warn!("Failed to save settings: {:#}", e);
    }
}
