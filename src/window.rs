// window.rs — minifb preview window for interactive runs.
//
// The window stays open until it is closed or Escape is pressed. Its
// `is_open` is polled by the iteration controller between iterations only,
// so the last step always completes before the run ends.

use minifb::{Key, ScaleMode, Window, WindowOptions};

use crate::stipple::{PreviewSurface, SurfaceError};

pub struct MinifbSurface {
    window: Window,
}

impl MinifbSurface {
    /// Open a window sized to the image.
    pub fn create(title: &str, width: usize, height: usize) -> Result<Self, SurfaceError> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: true,
                scale_mode: ScaleMode::AspectRatioStretch,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| SurfaceError(e.to_string()))?;
        log::info!("preview window open: press Escape or close it to stop");
        Ok(MinifbSurface { window })
    }
}

impl PreviewSurface for MinifbSurface {
    fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    fn present(&mut self, frame: &[u32], width: usize, height: usize) -> Result<(), SurfaceError> {
        self.window
            .update_with_buffer(frame, width, height)
            .map_err(|e| SurfaceError(e.to_string()))
    }
}
