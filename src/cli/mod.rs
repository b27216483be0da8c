mod cluster;
mod export;
mod index;
mod init;
mod review;
pub mod server;

pub use cluster::*;
pub use export::*;
pub use index::*;
pub use init::*;
pub use review::*;
pub use server::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
