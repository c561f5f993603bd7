//! Placeholder image generation.
//!
//! Stands in for an inference backend: the prompt's first characters are drawn
//! onto a solid canvas and written to a temporary PNG that the caller uploads.

use crate::config::{GenerationConfig, MAX_TEXT_SCALE};
use crate::font::{self, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Errors produced while rendering or writing a placeholder
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Temporary file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A rendered image on disk.
///
/// The file is removed when this value is dropped.
#[derive(Debug)]
pub struct GeneratedImage {
    file: NamedTempFile,
}

impl GeneratedImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Basename of the temporary file
    pub fn file_name(&self) -> String {
        self.file
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "generated.png".to_string())
    }
}

/// Renders prompt text onto a fixed-size canvas
pub struct PlaceholderGenerator {
    config: GenerationConfig,
}

impl PlaceholderGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }

    /// Draw the truncated prompt onto a fresh canvas
    pub fn render(&self, prompt: &str) -> RgbImage {
        let cfg = &self.config;
        let text_color = Rgb(cfg.text_color);
        let mut canvas = RgbImage::from_pixel(cfg.width, cfg.height, Rgb(cfg.background));

        let scale = cfg.text_scale.clamp(1, MAX_TEXT_SCALE);

        for (index, c) in prompt.chars().take(cfg.max_prompt_chars).enumerate() {
            let advance = (index as u32).saturating_mul(GLYPH_ADVANCE.saturating_mul(scale));
            let origin_x = cfg.text_x.saturating_add(advance);
            // Everything further right is clipped anyway
            if origin_x >= cfg.width || cfg.text_y >= cfg.height {
                break;
            }
            let glyph = font::glyph(c);

            for gy in 0..GLYPH_HEIGHT {
                for gx in 0..GLYPH_WIDTH {
                    if !font::is_set(&glyph, gx, gy) {
                        continue;
                    }

                    for dy in 0..scale {
                        for dx in 0..scale {
                            let x = origin_x.saturating_add(gx * scale + dx);
                            let y = cfg.text_y.saturating_add(gy * scale + dy);
                            // Clip anything past the canvas edge
                            if x < cfg.width && y < cfg.height {
                                canvas.put_pixel(x, y, text_color);
                            }
                        }
                    }
                }
            }
        }

        canvas
    }

    /// Render `prompt` and write it to a uniquely named temporary PNG
    pub fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        let canvas = self.render(prompt);

        let mut builder = tempfile::Builder::new();
        builder.prefix("gen-").suffix(".png");
        let mut file = match &self.config.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        canvas.write_to(file.as_file_mut(), ImageFormat::Png)?;
        file.flush()?;

        debug!(
            path = %file.path().display(),
            width = canvas.width(),
            height = canvas.height(),
            "Placeholder image written"
        );

        Ok(GeneratedImage { file })
    }
}
