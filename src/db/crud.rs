use sqlx::{Executor, QueryBuilder, Result, Sqlite, SqliteConnection, SqlitePool};

use super::{ClusterSizeRecord, EmbeddingRecord, FingerprintRecord, ImageRecord};

/// 单条 UPDATE 语句中最多绑定的 ID 数量
const MAX_BIND_IDS: usize = 900;

macro_rules! select_image {
    ($tail:literal) => {
        concat!(
            "SELECT id, path, file_hash, size_bytes, mtime, cluster_id, reviewed, to_delete, ",
            "created_at, updated_at FROM image ",
            $tail
        )
    };
}

/// 读取元数据
pub async fn get_meta<'c, E>(executor: E, key: &str) -> Result<Option<String>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
        .bind(key)
        .fetch_optional(executor)
        .await
}

/// 写入元数据，已存在时覆盖
pub async fn set_meta<'c, E>(executor: E, key: &str, value: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO meta (key, value) VALUES (?, ?)
        ON CONFLICT (key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;
    Ok(())
}

/// 获取所有图片的文件指纹
pub async fn get_fingerprints(executor: &SqlitePool) -> Result<Vec<FingerprintRecord>> {
    sqlx::query_as("SELECT path, mtime, size_bytes FROM image")
        .fetch_all(executor)
        .await
}

/// 按路径插入或更新图片记录，同时重置聚类与审核状态
pub async fn upsert_image<'c, E>(
    executor: E,
    path: &str,
    file_hash: &str,
    size_bytes: i64,
    mtime: f64,
    embedding: &[u8],
) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO image (path, file_hash, size_bytes, mtime, embedding)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (path) DO UPDATE SET
            file_hash = excluded.file_hash,
            size_bytes = excluded.size_bytes,
            mtime = excluded.mtime,
            embedding = excluded.embedding,
            cluster_id = NULL,
            reviewed = 0,
            to_delete = 0,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        RETURNING id
        "#,
    )
    .bind(path)
    .bind(file_hash)
    .bind(size_bytes)
    .bind(mtime)
    .bind(embedding)
    .fetch_one(executor)
    .await
}

pub async fn get_image<'c, E>(executor: E, id: i64) -> Result<Option<ImageRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(select_image!("WHERE id = ?"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn get_image_by_path(executor: &SqlitePool, path: &str) -> Result<Option<ImageRecord>> {
    sqlx::query_as(select_image!("WHERE path = ?"))
        .bind(path)
        .fetch_optional(executor)
        .await
}

/// 获取所有非空特征向量
pub async fn get_embeddings(executor: &SqlitePool) -> Result<Vec<EmbeddingRecord>> {
    sqlx::query_as("SELECT id, embedding FROM image WHERE embedding IS NOT NULL ORDER BY id")
        .fetch_all(executor)
        .await
}

/// 清空所有聚类
pub async fn clear_clusters<'c, E>(executor: E) -> Result<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE image SET cluster_id = NULL WHERE cluster_id IS NOT NULL")
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// 将一组图片设为同一聚类，只会写入存在特征向量的记录
pub async fn set_cluster(conn: &mut SqliteConnection, cluster_id: i64, ids: &[i64]) -> Result<u64> {
    let mut affected = 0;
    for chunk in ids.chunks(MAX_BIND_IDS) {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE image SET cluster_id = ");
        qb.push_bind(cluster_id);
        qb.push(" WHERE embedding IS NOT NULL AND id IN (");
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        affected += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(affected)
}

/// 列出所有未审核的聚类 ID
pub async fn get_pending_clusters(executor: &SqlitePool) -> Result<Vec<i64>> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT cluster_id FROM image
        WHERE cluster_id IS NOT NULL AND reviewed = 0
        ORDER BY cluster_id
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 列出所有未审核的聚类及其图片数量
pub async fn get_pending_cluster_sizes(executor: &SqlitePool) -> Result<Vec<ClusterSizeRecord>> {
    sqlx::query_as(
        r#"
        SELECT cluster_id, COUNT(*) AS count FROM image
        WHERE cluster_id IN (
            SELECT DISTINCT cluster_id FROM image WHERE cluster_id IS NOT NULL AND reviewed = 0
        )
        GROUP BY cluster_id
        ORDER BY cluster_id
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 按 ID 顺序列出某个聚类的所有图片
pub async fn get_cluster_images<'c, E>(executor: E, cluster_id: i64) -> Result<Vec<ImageRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(select_image!("WHERE cluster_id = ? ORDER BY id"))
        .bind(cluster_id)
        .fetch_all(executor)
        .await
}

pub async fn set_reviewed<'c, E>(executor: E, id: i64, reviewed: bool) -> Result<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE image SET reviewed = ? WHERE id = ?")
        .bind(reviewed)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn set_to_delete<'c, E>(executor: E, id: i64, to_delete: bool) -> Result<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE image SET to_delete = ? WHERE id = ?")
        .bind(to_delete)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// 重置全库的审核与删除标记
pub async fn reset_flags<'c, E>(executor: E) -> Result<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE image SET reviewed = 0, to_delete = 0")
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// 列出所有标记为删除的图片
pub async fn get_images_to_delete(executor: &SqlitePool) -> Result<Vec<ImageRecord>> {
    sqlx::query_as(select_image!("WHERE to_delete = 1 ORDER BY id"))
        .fetch_all(executor)
        .await
}

pub async fn update_image_path<'c, E>(executor: E, id: i64, path: &str) -> Result<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE image SET path = ? WHERE id = ?")
        .bind(path)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// 查询图片总数、已索引数量与已聚类数量
pub async fn get_count(executor: &SqlitePool) -> Result<(i64, i64, i64)> {
    sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COUNT(embedding),
            COUNT(cluster_id)
        FROM image
        "#,
    )
    .fetch_one(executor)
    .await
}
