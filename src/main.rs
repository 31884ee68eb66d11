use anyhow::{Context, Result};
use clap::Parser;

use cone_stipple::cli::Cli;
use cone_stipple::config::RunMode;
use cone_stipple::gpu::{GpuBackend, GpuDevice};
use cone_stipple::image::load_grayscale;
use cone_stipple::site::seed_sites;
use cone_stipple::stipple::IterationController;
use cone_stipple::svg;
use cone_stipple::weight::WeightField;
use cone_stipple::window::MinifbSurface;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let image_path = cli.image.clone();
    let image = load_grayscale(&image_path)?;
    let config = cli
        .into_config(image.width() as u32, image.height() as u32)
        .context("invalid configuration")?;
    let weights = WeightField::from_image(&image, config.weight_floor);
    let sites = seed_sites(config.samples, &weights, config.seeding, config.seed);

    let gpu = GpuDevice::new().context("failed to initialise the GPU")?;
    let backend = GpuBackend::new(&gpu, &config, &weights, &sites).context("failed to build the GPU pipeline")?;
    let mut controller = IterationController::new(backend);

    let sites = match config.mode {
        RunMode::Batch { iterations } => controller.run_batch(iterations, |i, n| {
            eprint!("\rIteration {i}/{n}");
            if i == n {
                eprintln!();
            }
        })?,
        RunMode::Interactive => {
            let title = format!("cone-stipple: {}", image_path.display());
            let mut surface = MinifbSurface::create(&title, config.width as usize, config.height as usize)
                .context("failed to open the preview window")?;
            controller.run_interactive(&mut surface)?
        }
    };

    svg::export(&config, &sites, std::io::stdout().lock()).with_context(|| match &config.output {
        Some(path) => format!("failed to write {}", path.display()),
        None => "failed to write SVG to stdout".to_string(),
    })?;
    Ok(())
}
