mod tasks;

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, UNIX_EPOCH};

use anyhow::{Result, anyhow, ensure};
use indicatif::ProgressBar;
use log::info;
use regex::Regex;
use tokio::task::spawn_blocking;

use self::tasks::*;
use crate::IMDB;
use crate::embed::FeatureExtractor;
use crate::utils::pb_style;

/// 判断修改时间是否变化的容差，单位为秒
const MTIME_EPSILON: f64 = 1e-3;

/// 索引参数
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// 图片所在目录
    pub root: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    pub suffix: String,
    /// 最多扫描的文件数量，0 表示不限制
    pub limit: usize,
    /// 忽略文件指纹，强制重新计算
    pub force: bool,
    /// 每个事务写入的图片数量
    pub batch_size: usize,
    /// 同时读取的文件数量
    pub prefetch: usize,
}

impl IndexConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            suffix: "jpg,jpeg".to_owned(),
            limit: 0,
            force: false,
            batch_size: 32,
            prefetch: num_cpus::get() * 2,
        }
    }

    /// 匹配文件后缀的正则表达式，忽略大小写
    pub fn suffix_regex(&self) -> Result<Regex> {
        let alternatives = self
            .suffix
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| regex::escape(s.trim_start_matches('.')))
            .collect::<Vec<_>>();
        ensure!(!alternatives.is_empty(), "后缀名列表为空");
        Ok(Regex::new(&format!("(?i)^({})$", alternatives.join("|")))?)
    }
}

/// 文件指纹
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fingerprint {
    /// 修改时间，单位为秒
    pub mtime: f64,
    pub size: i64,
}

impl Fingerprint {
    pub fn from_metadata(metadata: &Metadata) -> Result<Self> {
        let mtime = metadata.modified()?.duration_since(UNIX_EPOCH)?.as_secs_f64();
        Ok(Self { mtime, size: metadata.len() as i64 })
    }
}

/// 判断文件是否需要（重新）计算特征
pub fn needs_processing(stored: Option<Fingerprint>, current: Fingerprint, force: bool) -> bool {
    match stored {
        _ if force => true,
        None => true,
        Some(stored) => {
            (stored.mtime - current.mtime).abs() >= MTIME_EPSILON || stored.size != current.size
        }
    }
}

/// 一次索引的统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// 扫描到的文件数量
    pub scanned: usize,
    /// 未变化而跳过的文件数量
    pub skipped: usize,
    /// 写入数据库的图片数量
    pub upserted: usize,
    /// 无法访问、读取、解码或特征计算失败的文件数量
    pub failed: usize,
}

/// 扫描目录并为新增或变化的图片计算特征，按批写入数据库
pub async fn index_images(
    db: Arc<IMDB>,
    extractor: Arc<dyn FeatureExtractor>,
    config: &IndexConfig,
) -> Result<IndexStats> {
    ensure!(config.root.is_dir(), "目录不存在: {}", config.root.display());
    ensure!(config.batch_size > 0, "batch size 必须大于 0");
    let regex_suf = config.suffix_regex()?;

    db.bind_model(extractor.name(), extractor.dim()).await?;

    let start = Instant::now();
    let stored = db.fingerprints().await?;

    let root = config.root.canonicalize()?;
    let limit = config.limit;
    let (files, scan_failed) = spawn_blocking(move || scan_directory(&root, &regex_suf, limit))
        .await
        .map_err(|e| anyhow!("扫描目录失败: {}", e))?;

    let mut stats = IndexStats { scanned: files.len(), failed: scan_failed, ..Default::default() };
    let files = filter_changed(files, &stored, config.force);
    stats.skipped = stats.scanned - files.len();
    info!("扫描到 {} 张图片，{} 张需要处理", stats.scanned, files.len());

    let pb = ProgressBar::new(files.len() as u64).with_style(pb_style());

    let (t_read, mut rx) = task_read(files, config.prefetch.max(1), config.batch_size, pb.clone());

    let mut buffer = Vec::with_capacity(config.batch_size);
    while recv_batch(&mut rx, &mut buffer, config.batch_size).await != 0 {
        let batch = std::mem::take(&mut buffer);
        let extractor = extractor.clone();
        let pb2 = pb.clone();
        let (images, failed) = spawn_blocking(move || embed_batch(batch, extractor.as_ref(), &pb2)).await?;
        stats.failed += failed;

        if !images.is_empty() {
            db.upsert_batch(&images).await?;
            stats.upserted += images.len();
        }
        pb.inc((images.len() + failed) as u64);
    }
    stats.failed += t_read.await?;

    pb.finish_with_message("索引完成");
    info!(
        "索引完成：扫描 {}，跳过 {}，写入 {}，失败 {}，耗时 {:.2?}",
        stats.scanned,
        stats.skipped,
        stats.upserted,
        stats.failed,
        start.elapsed()
    );
    Ok(stats)
}

fn filter_changed(
    files: Vec<ScannedFile>,
    stored: &HashMap<String, (f64, i64)>,
    force: bool,
) -> Vec<ScannedFile> {
    files
        .into_iter()
        .filter(|file| {
            let prev = stored.get(&file.path).map(|&(mtime, size)| Fingerprint { mtime, size });
            needs_processing(prev, file.fingerprint, force)
        })
        .collect()
}
