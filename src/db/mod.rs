use std::path::Path;

use log::info;
use sqlx::{SqlitePool, sqlite::*};

pub mod crud;
mod error;
pub mod model;

pub use error::*;
pub use model::*;

pub type Database = SqlitePool;

/// 以 WAL 模式打开（或创建）SQLite 数据库并执行迁移
pub async fn init_db(filename: impl AsRef<Path>) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

/// 将特征向量编码为小端序字节
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// 从小端序字节解码特征向量，长度不是 4 的倍数时返回 None
pub fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    let v = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_are_little_endian() {
        let bytes = encode_embedding(&[1.0, -0.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_embedding(&bytes), Some(vec![1.0, -0.5]));
    }

    #[test]
    fn truncated_blob_is_rejected() {
        assert_eq!(decode_embedding(&[0, 0, 128]), None);
    }
}
