// image.rs — Runtime-sized row-major raster, generic over pixel type, plus
// the image-decoding boundary.
//
// Every CPU-side raster in the crate is an `Image<T>`:
//   Image<u8>  — decoded grayscale source
//   Image<f32> — weight field
//   Image<u32> — assignment raster read back from the GPU or produced by
//                the CPU reference
//
// Rows are stored top-down (row 0 is the top of the picture), the same
// order `image::open` produces and the same order wgpu textures use. The
// bottom-left site space is handled where coordinates are computed
// (lloyd.rs, reduce.wgsl), never by flipping the data.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::MAX_DIMENSION;

/// Marker trait for pixel element types.
pub trait Pixel: Copy + Default + Send + Sync + PartialEq + 'static {}

impl Pixel for u8 {}
impl Pixel for u32 {}
impl Pixel for f32 {}

/// A 2D raster with runtime dimensions. Stride always equals width.
#[derive(Clone, PartialEq)]
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Pixel> Image<T> {
    /// Zero-initialised image.
    pub fn new(width: usize, height: usize) -> Self {
        Image { data: vec![T::default(); width * height], width, height }
    }

    /// Image filled with one value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Image { data: vec![value; width * height], width, height }
    }

    /// Wrap an existing row-major pixel vector.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image { data, width, height }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at column `x`, row `y` (top-down).
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.bounds_check(x, y);
        self.data[y * self.width + x] = value;
    }

    /// Borrow one row as a slice.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image<{}> {{ {}×{} }}", std::any::type_name::<T>(), self.width, self.height)?;
        for y in 0..self.height.min(8) {
            let row = &self.row(y)[..self.width.min(16)];
            write!(f, "  row {y}: {row:?}")?;
            if self.width > 16 {
                write!(f, " ...")?;
            }
            writeln!(f)?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode any format supported by the `image` crate into 8-bit grayscale.
///
/// Rejects images whose sides exceed `MAX_DIMENSION`, before any GPU
/// resource is created.
pub fn load_grayscale(path: &Path) -> Result<Image<u8>, LoadError> {
    let decoded = image::open(path).map_err(|source| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let luma = decoded.to_luma8();
    let (w, h) = luma.dimensions();
    if w > MAX_DIMENSION || h > MAX_DIMENSION {
        return Err(LoadError::TooLarge { width: w, height: h });
    }
    log::info!("loaded {} ({w}×{h})", path.display());
    Ok(Image::from_vec(w as usize, h as usize, luma.into_raw()))
}

/// Failure to turn an image file into a grayscale raster.
#[derive(Debug)]
pub enum LoadError {
    /// The decoder rejected the file; carries its reason.
    Decode { path: PathBuf, source: image::ImageError },
    /// A side exceeds what the id encoding and the GPU targets support.
    TooLarge { width: u32, height: u32 },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Decode { path, source } => {
                write!(f, "failed to load {}: {source}", path.display())
            }
            LoadError::TooLarge { width, height } => write!(
                f,
                "image is {width}×{height}; each side must be at most {MAX_DIMENSION}"
            ),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Decode { source, .. } => Some(source),
            LoadError::TooLarge { .. } => None,
        }
    }
}
