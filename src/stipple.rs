// stipple.rs — The iteration controller.
//
// Drives a relaxation backend through repeated Lloyd steps:
//
//   Init ──step──▶ Running { iteration: 1 } ──step──▶ … ──finish──▶ Done
//
// Two drive modes:
//   batch        a fixed number of steps, no presentation, progress callback
//   interactive  step, render a preview, present it; repeat until the
//                surface reports it was closed
//
// Cancellation is only observed between iterations. A step, once started,
// always completes, so the site buffer is never left half-updated.
//
// The controller is generic over the backend (static dispatch): the CPU
// reference and the GPU pipeline are interchangeable.

use std::fmt;
use std::time::Instant;

use crate::site::Site;

/// One implementation of the relaxation step.
pub trait RelaxationBackend {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Image size `(width, height)` in pixels.
    fn size(&self) -> (usize, usize);

    /// One full assign → reduce → feedback cycle.
    fn step(&mut self) -> Result<(), Self::Error>;

    /// Current site positions and masses.
    fn sites(&mut self) -> Result<Vec<Site>, Self::Error>;

    /// Compose the preview frame as `0x00RRGGBB` pixels, row-major,
    /// top row first.
    fn render_preview(&mut self, out: &mut Vec<u32>) -> Result<(), Self::Error>;
}

/// Something that can show preview frames (a window).
pub trait PreviewSurface {
    /// False once the user asked to stop.
    fn is_open(&self) -> bool;

    /// Show one frame of `width * height` packed pixels.
    fn present(&mut self, frame: &[u32], width: usize, height: usize) -> Result<(), SurfaceError>;
}

/// Failure to present a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceError(pub String);

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preview surface: {}", self.0)
    }
}

impl std::error::Error for SurfaceError {}

/// Where the controller is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    Init,
    Running { iteration: u32 },
    Done { iterations: u32 },
}

impl IterationState {
    /// Completed iterations.
    pub fn iterations(self) -> u32 {
        match self {
            IterationState::Init => 0,
            IterationState::Running { iteration } => iteration,
            IterationState::Done { iterations } => iterations,
        }
    }
}

/// Error from an interactive run.
#[derive(Debug)]
pub enum RunError<E> {
    Backend(E),
    Surface(SurfaceError),
}

impl<E: fmt::Display> fmt::Display for RunError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Backend(e) => write!(f, "{e}"),
            RunError::Surface(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RunError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Backend(e) => Some(e),
            RunError::Surface(e) => Some(e),
        }
    }
}

pub struct IterationController<B: RelaxationBackend> {
    backend: B,
    state: IterationState,
}

impl<B: RelaxationBackend> IterationController<B> {
    pub fn new(backend: B) -> Self {
        IterationController { backend, state: IterationState::Init }
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Run one iteration.
    ///
    /// # Panics
    /// Panics if called after [`IterationController::finish`].
    pub fn step(&mut self) -> Result<(), B::Error> {
        let next = match self.state {
            IterationState::Init => 1,
            IterationState::Running { iteration } => iteration + 1,
            IterationState::Done { .. } => panic!("step() called on a finished controller"),
        };
        let start = Instant::now();
        self.backend.step()?;
        log::debug!("iteration {next}: {:.2} ms", start.elapsed().as_secs_f64() * 1000.0);
        self.state = IterationState::Running { iteration: next };
        Ok(())
    }

    /// Stop iterating and return the final sites.
    pub fn finish(&mut self) -> Result<Vec<Site>, B::Error> {
        let iterations = self.state.iterations();
        self.state = IterationState::Done { iterations };
        let sites = self.backend.sites()?;
        let empty = sites.iter().filter(|s| s.mass == 0.0).count();
        log::info!("finished after {iterations} iterations ({} sites, {empty} in empty cells)", sites.len());
        Ok(sites)
    }

    /// Run exactly `iterations` steps, calling `progress(done, total)`
    /// after each, then finish.
    pub fn run_batch(
        &mut self,
        iterations: u32,
        mut progress: impl FnMut(u32, u32),
    ) -> Result<Vec<Site>, B::Error> {
        let start = Instant::now();
        for i in 1..=iterations {
            self.step()?;
            progress(i, iterations);
        }
        if iterations > 0 {
            log::info!(
                "{iterations} iterations in {:.2} s ({:.2} ms/iteration)",
                start.elapsed().as_secs_f64(),
                start.elapsed().as_secs_f64() * 1000.0 / iterations as f64
            );
        }
        self.finish()
    }

    /// Step and present previews until `surface` closes, then finish.
    pub fn run_interactive<S: PreviewSurface>(&mut self, surface: &mut S) -> Result<Vec<Site>, RunError<B::Error>> {
        let (width, height) = self.backend.size();
        let mut frame = Vec::with_capacity(width * height);
        while surface.is_open() {
            self.step().map_err(RunError::Backend)?;
            self.backend.render_preview(&mut frame).map_err(RunError::Backend)?;
            surface.present(&frame, width, height).map_err(RunError::Surface)?;
        }
        self.finish().map_err(RunError::Backend)
    }
}
