use anyhow::{Result, anyhow, ensure};
use ndarray::ArrayView2;
use rayon::prelude::*;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{NeighborIndex, RangeSearchResult};

/// 首次搜索的近邻数量，结果全部超过阈值时翻倍重试
const INITIAL_K: usize = 32;

/// 基于 usearch HNSW 的近似内积索引
pub struct USearchIndex {
    index: Index,
    dim: usize,
}

impl USearchIndex {
    fn new(dim: usize) -> Result<Self> {
        let options = IndexOptions {
            dimensions: dim,
            metric: MetricKind::IP,
            quantization: ScalarKind::F32,
            connectivity: 32,
            expansion_add: 128,
            expansion_search: 64,
            ..Default::default()
        };
        let index = Index::new(&options)?;
        Ok(Self { index, dim })
    }

    /// 搜索单个向量
    ///
    /// 大量完全相同的向量会使 HNSW 图出现孤立的区域，搜索可能连查询向量自身都找不到，
    /// 近似搜索没有任何结果时改用精确搜索
    fn search_one(&self, query: &[f32], threshold: f32) -> Result<Vec<(usize, f32)>> {
        let hits = self.search_until(query, threshold, false)?;
        if !hits.is_empty() {
            return Ok(hits);
        }
        self.search_until(query, threshold, true)
    }

    /// 逐步扩大 k 直到出现不满足阈值的结果
    fn search_until(&self, query: &[f32], threshold: f32, exact: bool) -> Result<Vec<(usize, f32)>> {
        let n = self.ntotal();
        if n == 0 {
            return Ok(vec![]);
        }
        let mut k = INITIAL_K.min(n);
        loop {
            let matches = if exact { self.index.exact_search(query, k)? } else { self.index.search(query, k)? };
            // usearch 的内积距离为 1 - dot
            let hits = matches
                .keys
                .iter()
                .zip(&matches.distances)
                .map(|(&key, &distance)| (key as usize, 1.0 - distance))
                .filter(|(_, score)| *score > threshold)
                .collect::<Vec<_>>();
            if hits.len() < matches.keys.len() || k >= n {
                return Ok(hits);
            }
            k = (k * 2).min(n);
        }
    }
}

impl NeighborIndex for USearchIndex {
    fn build(vectors: ArrayView2<f32>) -> Result<Self> {
        let dim = vectors.ncols();
        ensure!(dim > 0, "向量维度不能为 0");
        let s = Self::new(dim)?;
        s.index.reserve(vectors.nrows())?;

        let vectors = vectors.as_standard_layout();
        let data = vectors.as_slice().ok_or_else(|| anyhow!("向量内存不连续"))?;
        data.par_chunks_exact(dim).enumerate().try_for_each(|(i, v)| {
            s.index.add(i as u64, v)?;
            Ok::<_, anyhow::Error>(())
        })?;
        Ok(s)
    }

    fn ntotal(&self) -> usize {
        self.index.size()
    }

    fn range_search(&self, queries: ArrayView2<f32>, threshold: f32) -> Result<RangeSearchResult> {
        ensure!(
            queries.ncols() == self.dim,
            "查询向量维度 {} 与索引维度 {} 不一致",
            queries.ncols(),
            self.dim
        );
        let queries = queries.as_standard_layout();
        let data = queries.as_slice().ok_or_else(|| anyhow!("向量内存不连续"))?;
        let lists = data
            .par_chunks_exact(self.dim)
            .map(|q| self.search_one(q, threshold))
            .collect::<Result<Vec<_>>>()?;
        Ok(RangeSearchResult::from_lists(lists))
    }
}
