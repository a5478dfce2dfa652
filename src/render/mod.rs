pub mod pdf;
pub mod raster;
pub mod text;

pub use raster::render_image;
pub use text::render_text;

/// A finished PDF held in memory.
#[derive(Debug)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub pages: usize,
}
