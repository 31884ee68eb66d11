// tests/test_controller.rs — Iteration controller driving the CPU backend.

use cone_stipple::config::{Config, Seeding};
use cone_stipple::lloyd::CpuPipeline;
use cone_stipple::site::seed_sites;
use cone_stipple::stipple::{IterationController, IterationState, PreviewSurface, RunError, SurfaceError};
use cone_stipple::weight::WeightField;

/// Surface that closes itself after `frames` presented frames.
struct ScriptedSurface {
    frames: usize,
    presented: Vec<(usize, usize, usize)>,
    fail: bool,
}

impl ScriptedSurface {
    fn closing_after(frames: usize) -> Self {
        ScriptedSurface { frames, presented: Vec::new(), fail: false }
    }
}

impl PreviewSurface for ScriptedSurface {
    fn is_open(&self) -> bool {
        self.presented.len() < self.frames
    }

    fn present(&mut self, frame: &[u32], width: usize, height: usize) -> Result<(), SurfaceError> {
        if self.fail {
            return Err(SurfaceError("lost".into()));
        }
        self.presented.push((frame.len(), width, height));
        Ok(())
    }
}

fn backend(samples: u32) -> CpuPipeline {
    let wf = WeightField::uniform(24, 16, 1.0);
    let config = Config::new(24, 16, samples).unwrap().with_seeding(Seeding::Uniform, 3);
    let sites = seed_sites(samples, &wf, config.seeding, config.seed);
    CpuPipeline::new(&config, wf, sites)
}

#[test]
fn batch_runs_exact_iteration_count() {
    let mut controller = IterationController::new(backend(6));
    let mut last = 0;
    let sites = controller.run_batch(7, |i, _| last = i).unwrap();
    assert_eq!(last, 7);
    assert_eq!(sites.len(), 6);
    assert_eq!(controller.state(), IterationState::Done { iterations: 7 });
    assert!(sites.iter().all(|s| s.is_finite()));
}

#[test]
fn interactive_stops_when_surface_closes() {
    let mut controller = IterationController::new(backend(5));
    let mut surface = ScriptedSurface::closing_after(3);
    let sites = controller.run_interactive(&mut surface).unwrap();
    assert_eq!(sites.len(), 5);
    assert_eq!(controller.state(), IterationState::Done { iterations: 3 });
    assert_eq!(surface.presented, vec![(24 * 16, 24, 16); 3]);
}

#[test]
fn interactive_with_closed_surface_runs_nothing() {
    let mut controller = IterationController::new(backend(2));
    let mut surface = ScriptedSurface::closing_after(0);
    controller.run_interactive(&mut surface).unwrap();
    assert_eq!(controller.state(), IterationState::Done { iterations: 0 });
}

#[test]
fn surface_errors_are_reported() {
    let mut controller = IterationController::new(backend(2));
    let mut surface = ScriptedSurface { frames: 1, presented: Vec::new(), fail: true };
    match controller.run_interactive(&mut surface) {
        Err(RunError::Surface(e)) => assert_eq!(e, SurfaceError("lost".into())),
        other => panic!("expected a surface error, got ok={}", other.is_ok()),
    }
    assert_eq!(controller.state(), IterationState::Running { iteration: 1 });
}
