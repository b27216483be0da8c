use std::path::Path;

use futures::StreamExt;
use indicatif::ProgressBar;
use log::{info, warn};
use rayon::prelude::*;
use regex::Regex;
use tokio::sync::mpsc::{Receiver, channel};
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use super::Fingerprint;
use crate::db::NewImage;
use crate::embed::{FeatureExtractor, l2_normalize};
use crate::utils::hash_bytes;

/// 扫描得到的图片文件
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: String,
    pub fingerprint: Fingerprint,
}

/// 已读入内存的图片文件
pub struct FileData {
    pub file: ScannedFile,
    pub data: Vec<u8>,
}

/// 按文件名顺序扫描目录，跟随符号链接，返回后缀匹配的文件与无法访问的文件数量
pub fn scan_directory(root: &Path, regex_suf: &Regex, limit: usize) -> (Vec<ScannedFile>, usize) {
    info!("开始扫描目录: {}", root.display());
    let limit = if limit == 0 { usize::MAX } else { limit };
    let mut files = vec![];
    let mut failed = 0;

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        if files.len() >= limit {
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("无法访问: {}", e);
                failed += 1;
                continue;
            }
        };
        if !entry.file_type().is_file()
            || !entry.path().extension().is_some_and(|ext| regex_suf.is_match(&ext.to_string_lossy()))
        {
            continue;
        }

        let path = entry.path().to_string_lossy().to_string();
        match entry.metadata().map_err(anyhow::Error::from).and_then(|m| Fingerprint::from_metadata(&m)) {
            Ok(fingerprint) => files.push(ScannedFile { path, fingerprint }),
            Err(e) => {
                warn!("读取文件信息失败: {}: {}", path, e);
                failed += 1;
            }
        }
    }
    (files, failed)
}

/// 并发读取文件内容，保持扫描顺序，返回读取失败的文件数量
pub fn task_read(
    files: Vec<ScannedFile>,
    prefetch: usize,
    capacity: usize,
    pb: ProgressBar,
) -> (JoinHandle<usize>, Receiver<FileData>) {
    let (tx, rx) = channel(capacity.max(1));
    let t = tokio::spawn(async move {
        let tx = &tx;
        let pb = &pb;
        futures::stream::iter(files)
            .map(move |file| async move {
                match tokio::fs::read(&file.path).await {
                    Ok(data) => {
                        // 接收端提前退出时直接丢弃
                        let _ = tx.send(FileData { file, data }).await;
                        0
                    }
                    Err(e) => {
                        warn!("读取文件失败: {}: {}", file.path, e);
                        pb.inc(1);
                        1
                    }
                }
            })
            .buffered(prefetch)
            .fold(0, |acc, n| async move { acc + n })
            .await
    });
    (t, rx)
}

/// 从通道中读取最多 `limit` 个元素，直到凑满一批或通道关闭
pub async fn recv_batch<T>(rx: &mut Receiver<T>, buffer: &mut Vec<T>, limit: usize) -> usize {
    while buffer.len() < limit {
        if rx.recv_many(buffer, limit - buffer.len()).await == 0 {
            break;
        }
    }
    buffer.len()
}

/// 并行解码并计算一批图片的特征，返回成功的图片与失败数量
pub fn embed_batch(
    batch: Vec<FileData>,
    extractor: &dyn FeatureExtractor,
    pb: &ProgressBar,
) -> (Vec<NewImage>, usize) {
    let results = batch
        .into_par_iter()
        .map(|FileData { file, data }| {
            let embedding = image::load_from_memory(&data)
                .map_err(anyhow::Error::from)
                .and_then(|img| extractor.embed(&img))
                .and_then(|mut v| {
                    anyhow::ensure!(v.len() == extractor.dim(), "特征维度错误: {}", v.len());
                    l2_normalize(&mut v);
                    Ok(v)
                });
            match embedding {
                Ok(embedding) => {
                    pb.set_message(file.path.clone());
                    Some(NewImage {
                        file_hash: hash_bytes(&data),
                        path: file.path,
                        size_bytes: file.fingerprint.size,
                        mtime: file.fingerprint.mtime,
                        embedding,
                    })
                }
                Err(e) => {
                    warn!("计算特征失败: {}: {}", file.path, e);
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    let failed = results.iter().filter(|r| r.is_none()).count();
    (results.into_iter().flatten().collect(), failed)
}
