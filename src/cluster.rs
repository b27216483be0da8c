use std::time::Instant;

use anyhow::{Result, ensure};
use log::{info, warn};
use ndarray::{Array2, ArrayView2};
use tokio::task::spawn_blocking;

use crate::IMDB;
use crate::graph::connected_components;
use crate::knn::{IndexBackend, RangeSearchResult};

/// 默认相似度阈值
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.95;

/// 聚类参数
#[derive(Debug, Clone, Copy)]
pub struct ClusterConfig {
    /// 余弦相似度严格大于该值的两张图片视为相似
    pub threshold: f32,
    pub backend: IndexBackend,
}

impl ClusterConfig {
    pub fn new(threshold: f32, backend: IndexBackend) -> Result<Self> {
        ensure!(threshold > 0.0 && threshold < 1.0, "阈值必须在 (0, 1) 之间: {}", threshold);
        Ok(Self { threshold, backend })
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { threshold: DEFAULT_SIMILARITY_THRESHOLD, backend: IndexBackend::Flat }
    }
}

/// 一次聚类的统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    /// 参与聚类的图片数量
    pub images: usize,
    /// 生成的聚类数量
    pub clusters: usize,
    /// 属于某个聚类的图片数量
    pub clustered_images: usize,
}

/// 将每一行归一化为单位向量，零向量保持不变
pub fn normalize_rows(vectors: &mut Array2<f32>) {
    for mut row in vectors.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
    }
}

/// 由范围搜索结果构造无向边，每对节点只出现一次，且不含自环
pub fn similarity_edges(result: &RangeSearchResult) -> Vec<(usize, usize)> {
    let mut edges = (0..result.nq())
        .flat_map(|i| {
            result.neighbors(i).filter(move |&(j, _)| j != i).map(move |(j, _)| (i.min(j), i.max(j)))
        })
        .collect::<Vec<_>>();
    edges.sort_unstable();
    edges.dedup();
    edges
}

/// 找出所有相似图片组，返回行号列表，不包含单独成组的向量
///
/// 输入向量会先被归一化，组之间按最小行号排序
pub fn find_clusters(vectors: ArrayView2<f32>, config: &ClusterConfig) -> Result<Vec<Vec<usize>>> {
    let n = vectors.nrows();
    if n == 0 {
        return Ok(vec![]);
    }

    let mut vectors = vectors.to_owned();
    normalize_rows(&mut vectors);

    let start = Instant::now();
    let index = config.backend.build(vectors.view())?;
    let result = index.range_search(vectors.view(), config.threshold)?;
    info!("范围搜索完成，共 {} 个结果，耗时 {:.2?}", result.labels.len(), start.elapsed());

    let edges = similarity_edges(&result);
    let clusters = connected_components(n, &edges)
        .into_iter()
        .filter(|component| component.len() > 1)
        .collect();
    Ok(clusters)
}

/// 对数据库中的全部图片重新聚类
///
/// 旧的聚类会在同一事务中被清空，失败时数据库保持原状
pub async fn cluster_images(db: &IMDB, config: &ClusterConfig) -> Result<ClusterStats> {
    let (ids, vectors) = db.embeddings().await?;
    if ids.is_empty() {
        warn!("数据库中没有特征向量，跳过聚类");
        return Ok(ClusterStats::default());
    }
    info!("加载 {} 个特征向量，维度 {}", ids.len(), vectors.ncols());

    let config = *config;
    let rows = spawn_blocking(move || find_clusters(vectors.view(), &config)).await??;

    let clusters = rows
        .into_iter()
        .map(|component| component.into_iter().map(|i| ids[i]).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    db.replace_clusters(&clusters).await?;

    let stats = ClusterStats {
        images: ids.len(),
        clusters: clusters.len(),
        clustered_images: clusters.iter().map(Vec::len).sum(),
    };
    info!(
        "聚类完成：{} 张图片，{} 个聚类，{} 张图片存在重复",
        stats.images, stats.clusters, stats.clustered_images
    );
    Ok(stats)
}
