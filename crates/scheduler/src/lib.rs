//! Pageflow Scheduler Library
//!
//! Render task plumbing for tile rendering: cancellation tokens, the one-shot
//! result channel behind each [`RenderTask`], the [`RenderEngine`] boundary,
//! and a [`TaskTracker`] that keeps one task in flight per key and enforces a
//! render timeout.
//!
//! # Example
//!
//! ```
//! use pageflow_core::Rect;
//! use pageflow_scheduler::{CancellationToken, InlineEngine, RenderEngine, RenderRequest, TaskTracker};
//! use std::time::{Duration, Instant};
//!
//! let engine = InlineEngine::solid([255, 255, 255, 255]);
//! let mut tracker = TaskTracker::new(Duration::from_secs(10));
//!
//! let request = RenderRequest {
//!     page_index: 0,
//!     rect: Rect::new(0.0, 0.0, 256.0, 256.0),
//!     scale_factor: 1.0,
//!     dpr: 1.0,
//! };
//! let task = engine.render_page_rect(request, CancellationToken::new());
//! tracker.start("p0-tile", task, Instant::now()).unwrap();
//!
//! for finished in tracker.poll(Instant::now()) {
//!     assert!(finished.result.is_ok());
//! }
//! ```

mod cancel;
mod task;
mod tracker;

pub use cancel::CancellationToken;
pub use task::{
    InlineEngine, RenderEngine, RenderError, RenderRequest, RenderResult, RenderTask, RenderedRaster,
    TaskCompleter, ThreadedEngine,
};
pub use tracker::{Finished, TaskTracker, TrackerStats};
