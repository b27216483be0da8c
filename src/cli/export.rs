use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use ndarray::Array1;
use ndarray_npy::write_npy;

use crate::cli::SubCommandExtend;
use crate::{IMDBBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    /// 特征向量输出路径，格式为 n × d 的 f32 数组
    #[arg(short, long, default_value = "embeddings.npy")]
    pub output: PathBuf,
    /// 图片 ID 输出路径，顺序与特征向量一致
    #[arg(long, value_name = "PATH")]
    pub ids: Option<PathBuf>,
}

impl SubCommandExtend for ExportCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = IMDBBuilder::new(opts.conf_dir.clone()).open().await?;
        let (ids, data) = db.embeddings().await?;
        if ids.is_empty() {
            warn!("数据库中没有特征向量");
        }
        write_npy(&self.output, &data)?;
        if let Some(path) = &self.ids {
            write_npy(path, &Array1::from_vec(ids.clone()))?;
        }
        info!("导出 {} 个特征向量到 {}", ids.len(), self.output.display());
        Ok(())
    }
}
