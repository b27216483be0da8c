use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::ModelOptions;
use crate::embed::create_extractor;
use crate::indexer::{IndexConfig, index_images};
use crate::{IMDBBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct IndexCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg")]
    pub suffix: String,
    /// 最多扫描的文件数量，0 表示不限制
    #[arg(short, long, default_value_t = 0)]
    pub limit: usize,
    /// 忽略文件指纹，重新计算所有图片
    #[arg(long)]
    pub force: bool,
    /// 每个事务写入的图片数量
    #[arg(short, long, default_value_t = 32)]
    pub batch_size: usize,
    /// 同时读取的文件数量，默认为 CPU 核心数的两倍
    #[arg(long)]
    pub prefetch: Option<usize>,
}

impl IndexCommand {
    pub fn config(&self) -> IndexConfig {
        IndexConfig {
            root: self.path.clone(),
            suffix: self.suffix.clone(),
            limit: self.limit,
            force: self.force,
            batch_size: self.batch_size,
            prefetch: self.prefetch.unwrap_or(num_cpus::get() * 2),
        }
    }
}

impl SubCommandExtend for IndexCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        // 模型与数据库均在扫描前检查，任何一个不可用都不会写入数据
        let extractor = create_extractor(&self.model.model, self.model.device)?;
        let db = Arc::new(IMDBBuilder::new(opts.conf_dir.clone()).open().await?);
        let stats = index_images(db, extractor, &self.config()).await?;
        println!(
            "scanned: {}, skipped: {}, upserted: {}, failed: {}",
            stats.scanned, stats.skipped, stats.upserted, stats.failed
        );
        Ok(())
    }
}
