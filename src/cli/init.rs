use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::ModelOptions;
use crate::embed::create_extractor;
use crate::{IMDBBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct InitCommand {
    #[command(flatten)]
    pub model: ModelOptions,
}

impl SubCommandExtend for InitCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let extractor = create_extractor(&self.model.model, self.model.device)?;
        let db = IMDBBuilder::new(opts.conf_dir.clone()).open().await?;
        db.bind_model(extractor.name(), extractor.dim()).await?;
        info!("数据库初始化完成: {}", opts.conf_dir.database().display());
        Ok(())
    }
}
