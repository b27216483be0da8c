use anyhow::{Result, ensure};
use image::DynamicImage;
use image::imageops::FilterType;

use super::{FeatureExtractor, l2_normalize};

/// 缩略图特征：将图片缩放为 N×N 的 RGB 图像，按通道去均值后归一化
///
/// 纯色图片去均值后为零向量，此时退回未去均值的向量
pub struct ThumbnailExtractor {
    side: u32,
    name: String,
}

impl ThumbnailExtractor {
    pub fn new(side: u32) -> Result<Self> {
        ensure!((1..=64).contains(&side), "缩略图尺寸必须在 1 到 64 之间: {}", side);
        Ok(Self { side, name: format!("thumbnail-{}", side) })
    }
}

impl FeatureExtractor for ThumbnailExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn dim(&self) -> usize {
        (self.side * self.side * 3) as usize
    }

    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        ensure!(image.width() > 0 && image.height() > 0, "图片尺寸为空");

        let thumb = image.resize_exact(self.side, self.side, FilterType::Triangle).to_rgb8();
        let raw = thumb.as_raw().iter().map(|&p| p as f32 / 255.0).collect::<Vec<_>>();
        debug_assert_eq!(raw.len(), self.dim());

        // 按通道去均值，忽略整体色偏
        let npixels = (self.side * self.side) as f32;
        let mut mean = [0.0f32; 3];
        for px in raw.chunks_exact(3) {
            for c in 0..3 {
                mean[c] += px[c] / npixels;
            }
        }
        let mut v = raw
            .chunks_exact(3)
            .flat_map(|px| [px[0] - mean[0], px[1] - mean[1], px[2] - mean[2]])
            .collect::<Vec<_>>();
        if l2_normalize(&mut v) > 1e-6 {
            return Ok(v);
        }

        let mut v = raw;
        if l2_normalize(&mut v) > 0.0 {
            return Ok(v);
        }
        // 全黑图片
        Ok(vec![1.0 / (v.len() as f32).sqrt(); v.len()])
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn gradient(w: u32, h: u32, invert: bool) -> DynamicImage {
        let img = RgbImage::from_fn(w, h, |x, y| {
            let v = ((x + y) * 255 / (w + h - 2)) as u8;
            let v = if invert { 255 - v } else { v };
            Rgb([v, v / 2, 255 - v / 3])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn output_is_unit_vector_of_fixed_dim() {
        let extractor = ThumbnailExtractor::new(16).unwrap();
        let v = extractor.embed(&gradient(100, 60, false)).unwrap();
        assert_eq!(v.len(), 768);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn deterministic_and_scale_tolerant() {
        let extractor = ThumbnailExtractor::new(16).unwrap();
        let a = extractor.embed(&gradient(128, 128, false)).unwrap();
        let b = extractor.embed(&gradient(128, 128, false)).unwrap();
        assert_eq!(a, b);

        // 同一图案的不同尺寸依然高度相似
        let c = extractor.embed(&gradient(256, 256, false)).unwrap();
        assert!(dot(&a, &c) > 0.95);
    }

    #[test]
    fn different_content_is_dissimilar() {
        let extractor = ThumbnailExtractor::new(16).unwrap();
        let a = extractor.embed(&gradient(128, 128, false)).unwrap();
        let b = extractor.embed(&gradient(128, 128, true)).unwrap();
        assert!(dot(&a, &b) < 0.5);
    }

    #[test]
    fn flat_images_still_embed() {
        let extractor = ThumbnailExtractor::new(4).unwrap();
        let gray = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([128, 128, 128])));
        let black = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        for img in [gray, black] {
            let v = extractor.embed(&img).unwrap();
            assert_eq!(v.len(), 48);
            assert!((dot(&v, &v) - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn side_is_bounded() {
        assert!(ThumbnailExtractor::new(0).is_err());
        assert!(ThumbnailExtractor::new(65).is_err());
    }
}
