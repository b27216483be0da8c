pub mod cli;
pub mod cluster;
pub mod config;
pub mod db;
pub mod embed;
pub mod graph;
pub mod imdb;
pub mod indexer;
pub mod knn;
pub mod review;
mod server;
pub mod utils;

pub use config::Opts;
pub use imdb::{IMDB, IMDBBuilder};
