use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use log::info;
use serde::Serialize;

use crate::cli::SubCommandExtend;
use crate::db::ImageRecord;
use crate::{IMDB, IMDBBuilder, Opts, utils};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReviewCommand {
    /// 列出所有未审核的聚类
    List {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// 显示聚类中的所有图片
    Show {
        cluster_id: i64,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// 保留 ID 最小的图片，其余标记为删除
    KeepFirst { cluster_id: i64 },
    /// 只保留指定图片，其余标记为删除
    Keep { cluster_id: i64, image_id: i64 },
    /// 标记为已审核，不删除任何图片
    Ignore { cluster_id: i64 },
    /// 将聚类中的所有图片标记为删除
    DeleteAll {
        cluster_id: i64,
        /// 跳过确认
        #[arg(short, long)]
        yes: bool,
    },
    /// 将图片标记为删除
    Mark { image_id: i64 },
    /// 取消图片的删除标记
    Unmark { image_id: i64 },
    /// 撤销所有审核结果
    Revert {
        /// 跳过确认
        #[arg(short, long)]
        yes: bool,
    },
    /// 将标记为删除的图片重命名为 `<path>._deleted`
    Apply {
        /// 跳过确认
        #[arg(short, long)]
        yes: bool,
    },
}

impl SubCommandExtend for ReviewCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = IMDBBuilder::new(opts.conf_dir.clone()).open().await?;
        match *self {
            Self::List { format } => {
                let clusters = db.pending_cluster_sizes().await?;
                match format {
                    OutputFormat::Json => print_json(&clusters)?,
                    OutputFormat::Table => {
                        for cluster in &clusters {
                            println!("cluster {}: {} images", cluster.cluster_id, cluster.count);
                        }
                        println!("{} pending clusters", clusters.len());
                    }
                }
            }
            Self::Show { cluster_id, format } => {
                let images = db.cluster_images(cluster_id).await?;
                match format {
                    OutputFormat::Json => print_json(&images)?,
                    OutputFormat::Table => print_images(&images),
                }
            }
            Self::KeepFirst { cluster_id } => db.keep_first(cluster_id).await?,
            Self::Keep { cluster_id, image_id } => db.keep_only(cluster_id, image_id).await?,
            Self::Ignore { cluster_id } => db.ignore(cluster_id).await?,
            Self::DeleteAll { cluster_id, yes } => {
                let n = db.cluster_images(cluster_id).await?.len();
                if yes || utils::confirm(&format!("将聚类 {} 中的 {} 张图片全部标记为删除？", cluster_id, n))? {
                    db.delete_all(cluster_id).await?;
                }
            }
            Self::Mark { image_id } => db.mark(image_id).await?,
            Self::Unmark { image_id } => db.unmark(image_id).await?,
            Self::Revert { yes } => {
                if yes || utils::confirm("撤销所有审核结果？")? {
                    db.revert_all().await?;
                }
            }
            Self::Apply { yes } => apply(&db, yes).await?,
        }
        Ok(())
    }
}

async fn apply(db: &IMDB, yes: bool) -> Result<()> {
    if !yes && !utils::confirm("重命名所有标记为删除的图片？")? {
        return Ok(());
    }
    let report = db.apply_deletions().await?;
    info!(
        "已删除 {} 张图片，{} 张文件不存在，{} 张失败",
        report.renamed.len(),
        report.missing.len(),
        report.failed.len()
    );
    for (path, reason) in &report.failed {
        eprintln!("{}: {}", path, reason);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_images(images: &[ImageRecord]) {
    for image in images {
        let mut flags = vec![];
        if image.reviewed {
            flags.push("reviewed");
        }
        if image.to_delete {
            flags.push("delete");
        }
        println!("{:>8}  {:>10}  {:<16}  {}", image.id, image.size_bytes, flags.join(","), image.path);
    }
}
