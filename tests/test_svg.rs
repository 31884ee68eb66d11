// tests/test_svg.rs — SVG export.

use cone_stipple::config::{Config, RunMode};
use cone_stipple::site::Site;
use cone_stipple::svg::{export, to_svg, Destination};

#[test]
fn centred_site_maps_to_image_centre() {
    let config = Config::new(100, 100, 1).unwrap();
    assert_eq!((config.sx, config.sy), (1.0, 1.0));
    let svg = to_svg(&config, &[Site::with_mass(0.5, 0.5, 1.0)]);
    assert!(svg.contains(r#"<circle cx="50" cy="50" r="1" fill="black"/>"#), "{svg}");
}

#[test]
fn header_carries_size_and_viewbox() {
    let config = Config::new(320, 200, 1).unwrap();
    let svg = to_svg(&config, &[Site::new(0.1, 0.1)]);
    assert!(svg.contains(r#"width="320" height="200" viewBox="0 0 320 200""#), "{svg}");
    assert!(svg.trim_end().ends_with("</svg>"));
}

#[test]
fn one_circle_per_site_including_empty_cells() {
    let config = Config::new(64, 64, 3).unwrap();
    let sites = [Site::with_mass(0.1, 0.2, 1.0), Site::with_mass(0.5, 0.5, 0.0), Site::with_mass(0.9, 0.9, 0.3)];
    let svg = to_svg(&config, &sites);
    assert_eq!(svg.matches("<circle").count(), 3);
    assert!(svg.contains(r#"r="0""#));
}

#[test]
fn radius_uses_shorter_side_and_aspect() {
    // 200×100: sx = 1, sy = 2, min(sx, sy) = 1, min(W, H) = 100.
    let config = Config::new(200, 100, 1).unwrap().with_base_radius(0.05).unwrap();
    let svg = to_svg(&config, &[Site::with_mass(0.5, 0.25, 0.5)]);
    assert!(svg.contains(r#"<circle cx="100" cy="75" r="2.5" fill="black"/>"#), "{svg}");
}

// ---- Output target ----------------------------------------------------------

fn scratch_svg(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("cone_stipple_{}_{name}.svg", std::process::id()))
}

#[test]
fn batch_without_output_streams_the_document() {
    let config = Config::new(100, 100, 1).unwrap().with_mode(RunMode::Batch { iterations: 3 });
    let sites = [Site::with_mass(0.5, 0.5, 1.0)];
    let mut stream = Vec::new();
    assert_eq!(export(&config, &sites, &mut stream).unwrap(), Destination::Stream);
    assert_eq!(String::from_utf8(stream).unwrap(), to_svg(&config, &sites));
}

#[test]
fn interactive_with_output_writes_the_file_only() {
    let path = scratch_svg("interactive");
    let config = Config::new(100, 100, 1)
        .unwrap()
        .with_mode(RunMode::Interactive)
        .with_output(Some(path.clone()));
    let sites = [Site::with_mass(0.25, 0.75, 0.5)];
    let mut stream = Vec::new();
    assert_eq!(export(&config, &sites, &mut stream).unwrap(), Destination::File);
    assert!(stream.is_empty());
    let written = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(written, to_svg(&config, &sites));
}

#[test]
fn batch_with_output_prefers_the_file() {
    let path = scratch_svg("batch");
    let config = Config::new(50, 40, 1)
        .unwrap()
        .with_mode(RunMode::Batch { iterations: 1 })
        .with_output(Some(path.clone()));
    let mut stream = Vec::new();
    assert_eq!(export(&config, &[Site::new(0.5, 0.5)], &mut stream).unwrap(), Destination::File);
    assert!(stream.is_empty());
    assert!(path.exists());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn interactive_without_output_writes_nothing() {
    let config = Config::new(10, 10, 1).unwrap().with_mode(RunMode::Interactive);
    let mut stream = Vec::new();
    assert_eq!(export(&config, &[Site::new(0.5, 0.5)], &mut stream).unwrap(), Destination::Skipped);
    assert!(stream.is_empty());
}
