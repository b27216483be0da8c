use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::cluster::{ClusterConfig, cluster_images};
use crate::config::ClusterOptions;
use crate::{IMDBBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct ClusterCommand {
    #[command(flatten)]
    pub cluster: ClusterOptions,
}

impl SubCommandExtend for ClusterCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let config = ClusterConfig::new(self.cluster.threshold, self.cluster.index)?;
        let db = IMDBBuilder::new(opts.conf_dir.clone()).open().await?;
        let stats = cluster_images(&db, &config).await?;
        println!(
            "images: {}, clusters: {}, clustered images: {}",
            stats.images, stats.clusters, stats.clustered_images
        );
        Ok(())
    }
}
