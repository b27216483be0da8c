use anyhow::{Result, ensure};
use ndarray::{Array2, ArrayView2, s};
use rayon::prelude::*;

use super::{NeighborIndex, RangeSearchResult};

/// 每次矩阵乘法处理的查询数量
const QUERY_BLOCK: usize = 256;

/// 精确内积索引，对应 faiss 的 IndexFlatIP
pub struct FlatIpIndex {
    data: Array2<f32>,
}

impl NeighborIndex for FlatIpIndex {
    fn build(vectors: ArrayView2<f32>) -> Result<Self> {
        Ok(Self { data: vectors.to_owned() })
    }

    fn ntotal(&self) -> usize {
        self.data.nrows()
    }

    fn range_search(&self, queries: ArrayView2<f32>, threshold: f32) -> Result<RangeSearchResult> {
        ensure!(
            queries.ncols() == self.data.ncols(),
            "查询向量维度 {} 与索引维度 {} 不一致",
            queries.ncols(),
            self.data.ncols()
        );

        let nq = queries.nrows();
        let starts = (0..nq).step_by(QUERY_BLOCK).collect::<Vec<_>>();
        let blocks = starts
            .into_par_iter()
            .map(|start| {
                let end = (start + QUERY_BLOCK).min(nq);
                let scores = queries.slice(s![start..end, ..]).dot(&self.data.t());
                scores
                    .outer_iter()
                    .map(|row| {
                        row.iter()
                            .enumerate()
                            .filter(|(_, score)| **score > threshold)
                            .map(|(label, score)| (label, *score))
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        Ok(RangeSearchResult::from_lists(blocks.into_iter().flatten()))
    }
}
