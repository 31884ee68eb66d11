// svg.rs — Export the relaxed sites as vector stipples.
//
// Site space has its origin at the bottom-left; SVG user space has it at the
// top-left. Each site becomes one black circle:
//
//   cx = x · W
//   cy = H − y · H
//   r  = baseRadius · min(sx, sy) · min(W, H) · mass
//
// A site with mass 0 (a cell that covered only zero-weight pixels) is still
// written, with r = 0, so the circle count always equals the site count.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use crate::config::{Config, RunMode};
use crate::site::Site;

/// Render the SVG document for the given sites.
pub fn to_svg(config: &Config, sites: &[Site]) -> String {
    let w = config.width;
    let h = config.height;
    let mut svg = String::with_capacity(128 + sites.len() * 64);

    // write! into a String cannot fail.
    let _ = writeln!(svg, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    for site in sites {
        let (cx, cy, r) = circle(config, site);
        let _ = writeln!(
            svg,
            r#"<circle cx="{}" cy="{}" r="{}" fill="black"/>"#,
            fmt_num(cx),
            fmt_num(cy),
            fmt_num(r),
        );
    }
    svg.push_str("</svg>\n");
    svg
}

/// `(cx, cy, r)` of one site in output pixels.
pub fn circle(config: &Config, site: &Site) -> (f32, f32, f32) {
    let w = config.width as f32;
    let h = config.height as f32;
    (site.x * w, h - site.y * h, config.stipple_radius(site.mass))
}

/// Write the document to `path`.
pub fn write_svg(path: &Path, config: &Config, sites: &[Site]) -> io::Result<()> {
    fs::write(path, to_svg(config, sites))?;
    log::info!("wrote {} stipples to {}", sites.len(), path.display());
    Ok(())
}

/// Where `export` sent the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// The `-o` path from the config.
    File,
    /// The caller's stream (stdout in the binary).
    Stream,
    /// Interactive run without an output path: nothing written.
    Skipped,
}

/// Write the final sites to wherever the run asks for them.
///
/// An output path always wins, in both modes. Without one, a batch run
/// streams the document to `stream`; an interactive run writes nothing.
pub fn export<W: io::Write>(config: &Config, sites: &[Site], mut stream: W) -> io::Result<Destination> {
    match (&config.output, config.mode) {
        (Some(path), _) => {
            write_svg(path, config, sites)?;
            Ok(Destination::File)
        }
        (None, RunMode::Batch { .. }) => {
            stream.write_all(to_svg(config, sites).as_bytes())?;
            stream.flush()?;
            Ok(Destination::Stream)
        }
        (None, RunMode::Interactive) => Ok(Destination::Skipped),
    }
}

/// Fixed three-decimal formatting with trailing zeros trimmed, so output is
/// stable and compact (`50`, `0.5`, `12.346`).
fn fmt_num(v: f32) -> String {
    let s = format!("{v:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(50.0), "50");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(1.0), "1");
        assert_eq!(fmt_num(12.34567), "12.346");
        assert_eq!(fmt_num(0.0), "0");
        assert_eq!(fmt_num(-0.0001), "0");
    }

    #[test]
    fn test_vertical_flip() {
        let cfg = Config::new(200, 100, 1).unwrap();
        let (cx, cy, _) = circle(&cfg, &Site::with_mass(0.25, 0.9, 1.0));
        assert!((cx - 50.0).abs() < 1e-4);
        assert!((cy - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_mass_circle_is_emitted_with_zero_radius() {
        let cfg = Config::new(10, 10, 1).unwrap();
        let svg = to_svg(&cfg, &[Site::with_mass(0.5, 0.5, 0.0)]);
        assert!(svg.contains(r#"<circle cx="5" cy="5" r="0" fill="black"/>"#), "{svg}");
    }
}
