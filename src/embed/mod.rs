mod thumbnail;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use image::DynamicImage;
use log::{info, warn};

pub use thumbnail::ThumbnailExtractor;

/// 默认特征模型，16×16×3 = 768 维
pub const DEFAULT_MODEL: &str = "thumbnail-16";

/// 图片特征提取器
///
/// 对于固定的模型参数，输出必须是确定的单位向量，长度恒为 `dim()`
pub trait FeatureExtractor: Send + Sync {
    /// 模型标识
    fn name(&self) -> &str;

    /// 特征向量维度
    fn dim(&self) -> usize;

    /// 计算一张已解码图片的特征向量，无法处理时返回错误
    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>>;
}

/// 计算设备
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

/// 根据模型标识创建特征提取器，未知模型视为启动失败
pub fn create_extractor(model: &str, device: Device) -> Result<Arc<dyn FeatureExtractor>> {
    if device == Device::Cuda {
        warn!("模型 {} 不支持 CUDA，回退到 CPU", model);
    }

    let extractor = match model.split_once('-') {
        Some(("thumbnail", side)) => {
            let side = side.parse().map_err(|_| anyhow!("无效的缩略图尺寸: {}", model))?;
            ThumbnailExtractor::new(side)?
        }
        _ => return Err(anyhow!("未知的特征模型: {}", model)),
    };

    info!("加载特征模型 {}，维度 {}", extractor.name(), extractor.dim());
    Ok(Arc::new(extractor))
}

/// 将向量原地归一化为单位向量，返回原始模长
///
/// 零向量保持不变
pub fn l2_normalize(v: &mut [f32]) -> f32 {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        let scale = (1.0 / norm) as f32;
        v.iter_mut().for_each(|x| *x *= scale);
    }
    norm as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_to_unit_length() {
        let mut v = [3.0, 4.0];
        let norm = l2_normalize(&mut v);
        assert!((norm - 5.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector() {
        let mut v = [0.0; 4];
        assert_eq!(l2_normalize(&mut v), 0.0);
        assert_eq!(v, [0.0; 4]);
    }

    #[test]
    fn create_known_and_unknown_models() {
        let extractor = create_extractor(DEFAULT_MODEL, Device::Cpu).unwrap();
        assert_eq!(extractor.dim(), 768);
        assert_eq!(extractor.name(), "thumbnail-16");

        assert!(create_extractor("thumbnail-8", Device::Cuda).is_ok());
        assert!(create_extractor("ViT-B-16-SigLIP", Device::Cpu).is_err());
        assert!(create_extractor("thumbnail-x", Device::Cpu).is_err());
    }
}
