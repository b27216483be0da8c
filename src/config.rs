use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::cluster::DEFAULT_SIMILARITY_THRESHOLD;
use crate::embed::{DEFAULT_MODEL, Device};
use crate::knn::IndexBackend;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "imdedup", "imdedup").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
pub struct ModelOptions {
    /// 特征模型，thumbnail-N 表示 N×N RGB 缩略图（维度 N*N*3）
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,
    /// 计算设备，不可用时回退到 CPU
    #[arg(long, value_enum, default_value_t = Device::Cpu)]
    pub device: Device,
}

#[derive(Parser, Debug, Clone)]
pub struct ClusterOptions {
    /// 余弦相似度阈值，严格大于该值的两张图片视为相似，范围 (0, 1)
    #[arg(short, long, value_name = "SIMILARITY", default_value_t = DEFAULT_SIMILARITY_THRESHOLD, value_parser = parse_threshold)]
    pub threshold: f32,
    /// 近邻搜索方式，flat 为精确搜索，hnsw 为近似搜索
    #[arg(long, value_enum, default_value_t = IndexBackend::Flat)]
    pub index: IndexBackend,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imdedup", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imdedup 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 初始化数据库
    Init(InitCommand),
    /// 扫描目录并计算图片特征向量
    Index(IndexCommand),
    /// 根据特征向量对相似图片进行聚类
    Cluster(ClusterCommand),
    /// 人工审核重复图片
    #[command(subcommand)]
    Review(ReviewCommand),
    /// 启动 HTTP 审核服务
    Server(ServerCommand),
    /// 导出所有特征向量到 npy 文件
    Export(ExportCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("imdedup.db")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

impl From<PathBuf> for ConfDir {
    fn from(path: PathBuf) -> Self {
        Self { path }
    }
}

fn parse_threshold(s: &str) -> Result<f32, String> {
    let v: f32 = s.parse().map_err(|e| format!("无效的阈值 {s}: {e}"))?;
    if v > 0.0 && v < 1.0 {
        Ok(v)
    } else {
        Err(format!("阈值必须在 (0, 1) 之间: {s}"))
    }
}
