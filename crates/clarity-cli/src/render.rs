//! Terminal rendering of job events.

use std::io::Write;

use clarity_core::{CompressionSummary, JobEvent, JobTotals};

/// How events are written to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    /// One JSON object per event
    Json,
}

/// Writes each job event as it arrives.
pub struct Renderer<W: Write> {
    out: W,
    mode: OutputMode,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, mode: OutputMode) -> Self {
        Self { out, mode }
    }

    pub fn event(&mut self, event: &JobEvent) -> anyhow::Result<()> {
        match self.mode {
            OutputMode::Json => {
                serde_json::to_writer(&mut self.out, event)?;
                writeln!(self.out)?;
            }
            OutputMode::Human => match event {
                JobEvent::StatusChanged { message } => writeln!(self.out, "{}", message)?,
                JobEvent::ProgressChanged { percent } => {
                    writeln!(self.out, "[{}] {:>3}%", bar(*percent), percent)?
                }
                JobEvent::Completed {
                    processed_count,
                    original_size_total,
                    compressed_size_total,
                } => {
                    let summary = CompressionSummary::from_totals(&JobTotals {
                        processed_count: *processed_count,
                        original_size_total: *original_size_total,
                        compressed_size_total: *compressed_size_total,
                    });
                    writeln!(self.out)?;
                    writeln!(self.out, "{}", summary)?;
                }
            },
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

const BAR_WIDTH: usize = 20;

fn bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) * BAR_WIDTH / 100;
    format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}
