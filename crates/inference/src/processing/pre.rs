use super::post::TransformParams;
use crate::config::DEFAULT_INPUT_SIZE;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::RgbImage;
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;

/// Letterboxes decoded frames into the square model input.
///
/// Buffers are reused across frames, so one instance belongs to one engine.
pub struct PreProcessor {
    pub input_size: u32,
    rgb_buffer: Vec<u8>,
    letterboxed_buffer: Vec<u8>,
}

impl PreProcessor {
    pub fn new(input_size: u32) -> Self {
        Self {
            input_size,
            rgb_buffer: Vec::with_capacity(1920 * 1080 * 3),
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size * input_size * 3) as usize],
        }
    }

    /// Returns the `[1, 3, S, S]` tensor scaled to `[0, 1]` and the transform
    /// needed to map boxes back onto the original frame.
    #[tracing::instrument(level = "trace", skip_all, fields(width = image.width(), height = image.height()))]
    pub fn preprocess(
        &mut self,
        image: &RgbImage,
    ) -> anyhow::Result<(Array<f32, IxDyn>, TransformParams)> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("Frame has no pixels ({}x{})", width, height);
        }

        self.rgb_buffer.clear();
        self.rgb_buffer.extend_from_slice(image.as_raw());

        let transform = self.resize_and_letterbox(width, height)?;
        let input = Self::normalize(&self.letterboxed_buffer, self.input_size)?;

        Ok((input, transform))
    }

    fn resize_and_letterbox(&mut self, width: u32, height: u32) -> anyhow::Result<TransformParams> {
        let size = self.input_size;
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).clamp(1, size);
        let new_height = ((height as f32 * scale) as u32).clamp(1, size);

        let offset_x = (size - new_width) / 2;
        let offset_y = (size - new_height) / 2;

        let src = Image::from_slice_u8(width, height, &mut self.rgb_buffer, PixelType::U8x3)?;
        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let row_bytes = (new_width * 3) as usize;
        let stride = size * 3;

        for y in 0..new_height {
            let src_row = y as usize * row_bytes;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            self.letterboxed_buffer[dst_row..dst_row + row_bytes]
                .copy_from_slice(&resized_data[src_row..src_row + row_bytes]);
        }

        Ok(TransformParams {
            orig_width: width,
            orig_height: height,
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        })
    }

    fn normalize(buffer: &[u8], size: u32) -> anyhow::Result<Array<f32, IxDyn>> {
        let side = size as usize;
        let spatial = side * side;
        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in buffer.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Ok(Array::from_shape_vec(IxDyn(&[1, 3, side, side]), output)?)
    }
}

impl Default for PreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_output_shape_matches_input_size() {
        let image = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let mut preprocessor = PreProcessor::new(64);

        let (output, _) = preprocessor.preprocess(&image).unwrap();
        assert_eq!(output.shape(), &[1, 3, 64, 64]);
    }

    #[test]
    fn test_letterboxing_preserves_aspect_ratio() {
        // 800x600 into 640: width-limited, scale 0.8, 640x480 centred vertically
        let image = RgbImage::from_pixel(800, 600, Rgb([128, 128, 128]));
        let mut preprocessor = PreProcessor::default();

        let (output, transform) = preprocessor.preprocess(&image).unwrap();

        assert!((transform.scale - 0.8).abs() < 1e-6);
        assert_eq!(transform.offset_x, 0.0);
        assert_eq!(transform.offset_y, 80.0);
        assert_eq!((transform.orig_width, transform.orig_height), (800, 600));

        let pad = LETTERBOX_COLOR as f32 / 255.0;
        let content = 128.0 / 255.0;
        assert!((output[[0, 0, 10, 320]] - pad).abs() < 1e-6, "Top band is padding");
        assert!((output[[0, 0, 320, 320]] - content).abs() < 0.01, "Centre is image");
        assert!((output[[0, 2, 630, 320]] - pad).abs() < 1e-6, "Bottom band is padding");
    }

    #[test]
    fn test_channels_are_planar_and_scaled() {
        let image = RgbImage::from_pixel(8, 8, Rgb([255, 0, 51]));
        let mut preprocessor = PreProcessor::new(8);

        let (output, transform) = preprocessor.preprocess(&image).unwrap();

        assert_eq!(transform.scale, 1.0);
        assert!((output[[0, 0, 4, 4]] - 1.0).abs() < 1e-6);
        assert!(output[[0, 1, 4, 4]].abs() < 1e-6);
        assert!((output[[0, 2, 4, 4]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_extreme_aspect_ratio_keeps_one_pixel() {
        let image = RgbImage::from_pixel(4000, 1, Rgb([0, 0, 0]));
        let mut preprocessor = PreProcessor::new(32);

        let (output, transform) = preprocessor.preprocess(&image).unwrap();
        assert_eq!(output.shape(), &[1, 3, 32, 32]);
        assert!(transform.offset_y <= 16.0);
    }

    #[test]
    fn test_buffers_are_reused_across_sizes() {
        let mut preprocessor = PreProcessor::new(32);

        let wide = RgbImage::from_pixel(64, 16, Rgb([0, 0, 0]));
        let (_, first) = preprocessor.preprocess(&wide).unwrap();
        assert_eq!(first.offset_y, 12.0);

        // Stale content from the previous frame must be overwritten by padding
        let tall = RgbImage::from_pixel(16, 64, Rgb([255, 255, 255]));
        let (output, second) = preprocessor.preprocess(&tall).unwrap();
        assert_eq!(second.offset_x, 12.0);
        let pad = LETTERBOX_COLOR as f32 / 255.0;
        assert!((output[[0, 0, 16, 2]] - pad).abs() < 1e-6);
    }
}
