//! Render tasks and the engine boundary
//!
//! A [`RenderTask`] is the receiving half of a one-shot result channel plus
//! the task's [`CancellationToken`]. The engine keeps the matching
//! [`TaskCompleter`] and resolves it from wherever the work actually runs.

use crate::cancel::CancellationToken;
use pageflow_core::Rect;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// What to rasterize
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// 0-based page index
    pub page_index: u32,

    /// Region of the page in unscaled page units
    pub rect: Rect,

    /// Zoom level the raster is produced for
    pub scale_factor: f64,

    /// Device pixel ratio of the paint surface
    pub dpr: f64,
}

impl RenderRequest {
    /// Pixel dimensions of the raster this request produces
    pub fn output_size(&self) -> (u32, u32) {
        let factor = self.scale_factor * self.dpr;
        let width = (self.rect.size.width * factor).round().max(0.0) as u32;
        let height = (self.rect.size.height * factor).round().max(0.0) as u32;
        (width, height)
    }
}

/// RGBA pixels produced by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRaster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderedRaster {
    /// A raster of the given size filled with one RGBA color
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat(width as usize * height as usize);
        Self { width, height, pixels }
    }

    /// Size of the pixel buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Why a render task produced no raster
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("render task was aborted")]
    Aborted,

    #[error("render task timed out after {0:?}")]
    TimedOut(Duration),

    #[error("render engine failed: {0}")]
    Engine(String),

    #[error("render engine dropped the task without a result")]
    Disconnected,
}

pub type RenderResult = Result<RenderedRaster, RenderError>;

/// Receiving side of a render in progress
#[derive(Debug)]
pub struct RenderTask {
    receiver: Receiver<RenderResult>,
    token: CancellationToken,
}

impl RenderTask {
    /// Create a task and the completer the engine resolves it with
    pub fn channel(token: CancellationToken) -> (RenderTask, TaskCompleter) {
        let (sender, receiver) = mpsc::channel();
        let completer = TaskCompleter { sender, token: token.clone() };
        (RenderTask { receiver, token }, completer)
    }

    /// A task that is already resolved
    pub fn ready(result: RenderResult) -> RenderTask {
        let (task, completer) = RenderTask::channel(CancellationToken::new());
        completer.complete(result);
        task
    }

    /// Non-blocking check for the result
    ///
    /// Returns `None` while the engine is still working. A completer dropped
    /// without resolving yields [`RenderError::Disconnected`].
    pub fn try_result(&self) -> Option<RenderResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(RenderError::Disconnected)),
        }
    }

    /// Block until the engine resolves the task or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> Option<RenderResult> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(Err(RenderError::Disconnected)),
        }
    }

    /// Ask the engine to stop working on this task
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Whether [`abort`](Self::abort) has been called
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The token the engine checks for cancellation
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Sending side of a render task, held by the engine
#[derive(Debug)]
pub struct TaskCompleter {
    sender: Sender<RenderResult>,
    token: CancellationToken,
}

impl TaskCompleter {
    /// Deliver the outcome
    ///
    /// An aborted task always resolves to [`RenderError::Aborted`]. A task
    /// whose owner has gone away is resolved silently.
    pub fn complete(self, result: RenderResult) {
        let result = if self.token.is_cancelled() { Err(RenderError::Aborted) } else { result };
        let _ = self.sender.send(result);
    }

    /// Whether the requester has given up on this render
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Produces rasters for page regions
pub trait RenderEngine {
    /// Start rendering `request`; the returned task resolves once
    fn render_page_rect(&self, request: RenderRequest, token: CancellationToken) -> RenderTask;
}

type RenderFn = dyn Fn(&RenderRequest, &CancellationToken) -> RenderResult + Send + Sync;

/// Runs the render function synchronously inside `render_page_rect`
///
/// The returned task is already resolved, which keeps hosts without a
/// worker pool (and tests) deterministic.
pub struct InlineEngine {
    render: Box<RenderFn>,
}

impl InlineEngine {
    /// Engine that renders on the calling thread before returning the task
    pub fn new(render: impl Fn(&RenderRequest, &CancellationToken) -> RenderResult + Send + Sync + 'static) -> Self {
        Self { render: Box::new(render) }
    }

    /// An engine that fills every raster with one color
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new(move |request, _| {
            let (width, height) = request.output_size();
            Ok(RenderedRaster::filled(width, height, rgba))
        })
    }
}

impl RenderEngine for InlineEngine {
    fn render_page_rect(&self, request: RenderRequest, token: CancellationToken) -> RenderTask {
        let (task, completer) = RenderTask::channel(token.clone());
        let result = if token.is_cancelled() { Err(RenderError::Aborted) } else { (self.render)(&request, &token) };
        completer.complete(result);
        task
    }
}

impl std::fmt::Debug for InlineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InlineEngine").finish_non_exhaustive()
    }
}

/// Runs each render on its own thread
///
/// The render function should poll the token and return
/// [`RenderError::Aborted`] early when it is cancelled.
pub struct ThreadedEngine {
    render: Arc<RenderFn>,
}

impl ThreadedEngine {
    /// Engine that renders each request on its own worker thread
    pub fn new(render: impl Fn(&RenderRequest, &CancellationToken) -> RenderResult + Send + Sync + 'static) -> Self {
        Self { render: Arc::new(render) }
    }
}

impl RenderEngine for ThreadedEngine {
    fn render_page_rect(&self, request: RenderRequest, token: CancellationToken) -> RenderTask {
        let (task, completer) = RenderTask::channel(token.clone());
        let render = Arc::clone(&self.render);

        let spawned = thread::Builder::new()
            .name(format!("render-page-{}", request.page_index))
            .spawn(move || {
                let result = render(&request, &token);
                completer.complete(result);
            });

        // The completer moved into the closure is dropped on failure, so the
        // task reports Disconnected on its first poll.
        if let Err(error) = spawned {
            tracing::warn!(%error, page = request.page_index, "failed to spawn render thread");
        }
        task
    }
}

impl std::fmt::Debug for ThreadedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RenderRequest {
        RenderRequest { page_index: 0, rect: Rect::new(0.0, 0.0, 100.0, 50.0), scale_factor: 2.0, dpr: 1.5 }
    }

    #[test]
    fn test_output_size_applies_scale_and_dpr() {
        assert_eq!(request().output_size(), (300, 150));
    }

    #[test]
    fn test_pending_task_has_no_result() {
        let (task, completer) = RenderTask::channel(CancellationToken::new());
        assert!(task.try_result().is_none());

        completer.complete(Ok(RenderedRaster::filled(1, 1, [0, 0, 0, 255])));
        assert_eq!(task.try_result().unwrap().unwrap().byte_len(), 4);
    }

    #[test]
    fn test_dropped_completer_reports_disconnected() {
        let (task, completer) = RenderTask::channel(CancellationToken::new());
        drop(completer);
        assert_eq!(task.try_result(), Some(Err(RenderError::Disconnected)));
    }

    #[test]
    fn test_aborted_task_resolves_as_aborted() {
        let (task, completer) = RenderTask::channel(CancellationToken::new());
        task.abort();
        assert!(completer.is_cancelled());

        completer.complete(Ok(RenderedRaster::filled(1, 1, [0; 4])));
        assert_eq!(task.try_result(), Some(Err(RenderError::Aborted)));
    }

    #[test]
    fn test_inline_engine_resolves_immediately() {
        let engine = InlineEngine::solid([255, 255, 255, 255]);
        let task = engine.render_page_rect(request(), CancellationToken::new());

        let raster = task.try_result().unwrap().unwrap();
        assert_eq!((raster.width, raster.height), (300, 150));
        assert_eq!(raster.byte_len(), 300 * 150 * 4);
    }

    #[test]
    fn test_inline_engine_skips_cancelled_requests() {
        let engine = InlineEngine::new(|_, _| Err(RenderError::Engine("should not run".into())));
        let token = CancellationToken::new();
        token.cancel();

        let task = engine.render_page_rect(request(), token);
        assert_eq!(task.try_result(), Some(Err(RenderError::Aborted)));
    }

    #[test]
    fn test_threaded_engine_delivers_through_the_channel() {
        let engine = ThreadedEngine::new(|request, _| {
            let (width, height) = request.output_size();
            Ok(RenderedRaster::filled(width, height, [1, 2, 3, 4]))
        });

        let task = engine.render_page_rect(request(), CancellationToken::new());
        let raster = task.wait(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(raster.pixels[..4], [1, 2, 3, 4]);
    }

    #[test]
    fn test_engine_errors_are_surfaced() {
        let engine = InlineEngine::new(|_, _| Err(RenderError::Engine("corrupt page".into())));
        let task = engine.render_page_rect(request(), CancellationToken::new());

        let error = task.try_result().unwrap().unwrap_err();
        assert_eq!(error.to_string(), "render engine failed: corrupt page");
    }
}
