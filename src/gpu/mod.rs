// gpu/mod.rs — GPU relaxation pipeline.
//
// The three stages of one weighted Lloyd step, each a wgpu pass that
// mirrors a CPU function in `lloyd.rs`:
//
//   cone.rs      ConeRasterizer     render pass  → W×H id raster
//   reduce.rs    WeightedReducer    render pass  → N×H accumulator
//   feedback.rs  CentroidFeedback   compute pass → site buffer (in place)
//
// plus the shared plumbing (device.rs, texture.rs, sites.rs), the preview
// composer (preview.rs) and the composition of all of it (pipeline.rs).
//
// The CPU implementations remain the authoritative reference: every GPU
// kernel is validated against them in the `#[ignore]`d tests of its module.

pub mod cone;
pub mod device;
pub mod feedback;
pub mod pipeline;
pub mod preview;
pub mod reduce;
pub mod sites;
pub mod texture;

pub use device::{GpuDevice, GpuError};
pub use pipeline::{GpuBackend, GpuPipeline};

// GPU tests run in a child process: dzn (WSL2) and some Vulkan drivers
// crash on process exit after a device was created, which would take the
// whole test binary down with it. Inner `inner_*` tests do the work and
// print "GPU_TEST_OK"; the outer `test_*` wrappers spawn them and check.
#[cfg(test)]
pub(crate) fn run_gpu_test_in_subprocess(test_name: &str) -> String {
    let output = std::process::Command::new("cargo")
        .args(["test", "--lib", "--", test_name, "--exact", "--ignored", "--nocapture"])
        .output()
        .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    print!("{stdout}");
    eprint!("{stderr}");
    stdout + &stderr
}
