//! Background batch compression jobs.
//!
//! Architecture:
//!
//! ```text
//! host context                       worker (blocking pool thread)
//! ────────────                       ─────────────────────────────
//! JobSlot::submit(request)
//!   └─ BatchJob::start() ──spawn──▶  for each input, in order:
//!                                      StatusChanged("Compressing: ..")
//!                                      cancelled? ─yes─▶ break
//!                                      ItemProcessor::process()
//!                                      [StatusChanged("Error ..")]
//!                                      ProgressChanged(percent)
//!   events.recv() ◀──── mpsc ─────   Completed{totals}   (exactly once)
//!
//! CancelHandle::request_cancel() ──▶ CancellationToken, read at each boundary
//! ```
//!
//! Items are processed strictly one at a time. Cancellation never preempts an
//! in-flight processor call.

mod job;
mod slot;
mod types;

pub use job::{BatchJob, CancelHandle, JobError, JobEvents, JobRequest};
pub use slot::JobSlot;
pub use types::{ItemResult, JobEvent, JobPhase, JobTotals};
