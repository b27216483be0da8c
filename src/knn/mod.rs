mod flat;
mod usearch;

use anyhow::Result;
use clap::ValueEnum;
use ndarray::ArrayView2;

pub use self::flat::FlatIpIndex;
pub use self::usearch::USearchIndex;

/// 基于内积的近邻索引，输入向量需事先归一化，此时内积即余弦相似度
pub trait NeighborIndex {
    /// 使用一组向量构建索引，向量的行号即其标签
    fn build(vectors: ArrayView2<f32>) -> Result<Self>
    where
        Self: Sized;

    /// 索引中的向量数量
    fn ntotal(&self) -> usize;

    /// 范围搜索：为每个查询向量返回所有相似度**严格大于** `threshold` 的向量
    fn range_search(&self, queries: ArrayView2<f32>, threshold: f32) -> Result<RangeSearchResult>;
}

/// 近邻搜索方式
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    /// 暴力搜索，结果精确
    Flat,
    /// HNSW 图搜索，速度快但可能漏掉部分近邻
    Hnsw,
}

impl IndexBackend {
    pub fn build(self, vectors: ArrayView2<f32>) -> Result<Box<dyn NeighborIndex + Send + Sync>> {
        Ok(match self {
            Self::Flat => Box::new(FlatIpIndex::build(vectors)?),
            Self::Hnsw => Box::new(USearchIndex::build(vectors)?),
        })
    }
}

/// 范围搜索结果，布局与 faiss 的 RangeSearchResult 相同
///
/// 第 i 个查询的结果位于 `labels[lims[i]..lims[i + 1]]`
#[derive(Debug, Clone, Default)]
pub struct RangeSearchResult {
    pub lims: Vec<usize>,
    pub labels: Vec<usize>,
    pub scores: Vec<f32>,
}

impl RangeSearchResult {
    /// 由每个查询的 `(label, score)` 列表构造
    pub fn from_lists<I>(lists: I) -> Self
    where
        I: IntoIterator<Item = Vec<(usize, f32)>>,
    {
        let mut result = Self { lims: vec![0], ..Default::default() };
        for list in lists {
            for (label, score) in list {
                result.labels.push(label);
                result.scores.push(score);
            }
            result.lims.push(result.labels.len());
        }
        result
    }

    /// 查询数量
    pub fn nq(&self) -> usize {
        self.lims.len().saturating_sub(1)
    }

    /// 第 i 个查询的所有近邻
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let range = self.lims[i]..self.lims[i + 1];
        self.labels[range.clone()].iter().copied().zip(self.scores[range].iter().copied())
    }
}
