//! PNG export of rasters, behind the `png` feature

use crate::error::Result;
use crate::raster::Raster;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write `raster` as an 8-bit RGBA PNG
pub fn save_png(raster: &Raster, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let writer = BufWriter::new(file);

    let mut encoder = png::Encoder::new(writer, raster.width(), raster.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder.write_header().map_err(std::io::Error::other)?;
    writer
        .write_image_data(raster.data())
        .map_err(std::io::Error::other)?;

    tracing::debug!(
        path = %path.as_ref().display(),
        width = raster.width(),
        height = raster.height(),
        "exported raster"
    );
    Ok(())
}
