use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Result;
use log::{info, warn};
use ndarray::Array2;

use crate::config::ConfDir;
use crate::db::*;

const META_MODEL: &str = "model";
const META_DIM: &str = "dim";

pub struct IMDBBuilder {
    conf_dir: ConfDir,
}

impl IMDBBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self { conf_dir }
    }

    pub async fn open(self) -> Result<IMDB> {
        std::fs::create_dir_all(self.conf_dir.path())?;
        let db = init_db(self.conf_dir.database()).await?;
        Ok(IMDB { db, dim: OnceLock::new() })
    }
}

/// 图片特征数据库
pub struct IMDB {
    db: Database,
    /// 当前绑定的特征维度
    dim: OnceLock<usize>,
}

impl IMDB {
    pub fn pool(&self) -> &Database {
        &self.db
    }

    /// 将数据库绑定到指定的特征模型
    ///
    /// 首次调用时记录模型与维度，之后模型或维度不一致时返回错误
    pub async fn bind_model(&self, model: &str, dim: usize) -> Result<()> {
        let mut tx = self.db.begin().await?;
        let stored_model = crud::get_meta(&mut *tx, META_MODEL).await?;
        let stored_dim = crud::get_meta(&mut *tx, META_DIM).await?;

        match (stored_model, stored_dim) {
            (Some(stored), _) if stored != model => {
                return Err(Error::ModelMismatch { stored, current: model.to_owned() }.into());
            }
            (_, Some(stored)) if stored.parse::<usize>().ok() != Some(dim) => {
                let expected = stored.parse().unwrap_or(0);
                return Err(Error::DimensionMismatch { expected, actual: dim }.into());
            }
            (Some(_), Some(_)) => {}
            _ => {
                info!("数据库绑定特征模型 {}，维度 {}", model, dim);
                crud::set_meta(&mut *tx, META_MODEL, model).await?;
                crud::set_meta(&mut *tx, META_DIM, &dim.to_string()).await?;
            }
        }
        tx.commit().await?;

        if let Some(&bound) = self.dim.get() {
            if bound != dim {
                return Err(Error::DimensionMismatch { expected: bound, actual: dim }.into());
            }
        }
        let _ = self.dim.set(dim);
        Ok(())
    }

    /// 数据库记录的特征模型与维度
    pub async fn model(&self) -> Result<Option<(String, usize)>> {
        let model = crud::get_meta(&self.db, META_MODEL).await?;
        let dim = crud::get_meta(&self.db, META_DIM).await?;
        Ok(model.zip(dim.and_then(|d| d.parse().ok())))
    }

    /// 所有已索引文件的指纹，`path -> (mtime, size)`
    pub async fn fingerprints(&self) -> Result<HashMap<String, (f64, i64)>> {
        let records = crud::get_fingerprints(&self.db).await?;
        Ok(records.into_iter().map(|r| (r.path, (r.mtime, r.size_bytes))).collect())
    }

    /// 在同一事务中写入一批图片，返回各自的 ID
    ///
    /// 任意一条记录的维度不一致时整批拒绝
    pub async fn upsert_batch(&self, images: &[NewImage]) -> Result<Vec<i64>> {
        let dim = *self.dim.get().ok_or(Error::ModelUnbound)?;
        if let Some(image) = images.iter().find(|image| image.embedding.len() != dim) {
            warn!("拒绝写入维度不一致的特征向量: {}", image.path);
            return Err(Error::DimensionMismatch { expected: dim, actual: image.embedding.len() }.into());
        }

        let mut tx = self.db.begin().await?;
        let mut ids = Vec::with_capacity(images.len());
        for image in images {
            let id = crud::upsert_image(
                &mut *tx,
                &image.path,
                &image.file_hash,
                image.size_bytes,
                image.mtime,
                &encode_embedding(&image.embedding),
            )
            .await?;
            ids.push(id);
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// 读取全部特征向量，返回 ID 列表与对应的 n × d 矩阵
    ///
    /// 维度与数据库不一致的记录会被跳过
    pub async fn embeddings(&self) -> Result<(Vec<i64>, Array2<f32>)> {
        let records = crud::get_embeddings(&self.db).await?;
        let dim = match self.dim.get() {
            Some(&dim) => Some(dim),
            None => self.model().await?.map(|(_, dim)| dim),
        };
        let Some(dim) = dim.or_else(|| records.first().map(|r| r.embedding.len() / 4)) else {
            return Ok((vec![], Array2::zeros((0, 0))));
        };

        let mut ids = Vec::with_capacity(records.len());
        let mut data = Vec::with_capacity(records.len() * dim);
        for record in records {
            match decode_embedding(&record.embedding) {
                Some(v) if v.len() == dim => {
                    ids.push(record.id);
                    data.extend_from_slice(&v);
                }
                _ => warn!("跳过维度不一致的特征向量: id = {}", record.id),
            }
        }
        let matrix = Array2::from_shape_vec((ids.len(), dim), data)?;
        Ok((ids, matrix))
    }

    /// 清空所有聚类并写入新的聚类，聚类 ID 从 1 开始
    pub async fn replace_clusters(&self, clusters: &[Vec<i64>]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        let cleared = crud::clear_clusters(&mut *tx).await?;
        info!("清空 {} 条旧聚类记录", cleared);
        for (i, ids) in clusters.iter().enumerate() {
            crud::set_cluster(&mut *tx, i as i64 + 1, ids).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// 所有未审核的聚类 ID
    pub async fn pending_clusters(&self) -> Result<Vec<i64>> {
        Ok(crud::get_pending_clusters(&self.db).await?)
    }

    /// 所有未审核的聚类及其大小
    pub async fn pending_cluster_sizes(&self) -> Result<Vec<ClusterSizeRecord>> {
        Ok(crud::get_pending_cluster_sizes(&self.db).await?)
    }

    /// 按 ID 顺序列出聚类中的图片
    pub async fn cluster_images(&self, cluster_id: i64) -> Result<Vec<ImageRecord>> {
        Ok(crud::get_cluster_images(&self.db, cluster_id).await?)
    }

    pub async fn get_image(&self, id: i64) -> Result<Option<ImageRecord>> {
        Ok(crud::get_image(&self.db, id).await?)
    }

    pub async fn image_by_path(&self, path: &str) -> Result<Option<ImageRecord>> {
        Ok(crud::get_image_by_path(&self.db, path).await?)
    }

    pub async fn set_reviewed(&self, id: i64, reviewed: bool) -> Result<()> {
        match crud::set_reviewed(&self.db, id, reviewed).await? {
            0 => Err(Error::ImageNotFound(id).into()),
            _ => Ok(()),
        }
    }

    pub async fn set_to_delete(&self, id: i64, to_delete: bool) -> Result<()> {
        match crud::set_to_delete(&self.db, id, to_delete).await? {
            0 => Err(Error::ImageNotFound(id).into()),
            _ => Ok(()),
        }
    }

    /// 重置全库的审核与删除标记，返回受影响的记录数
    pub async fn reset_flags(&self) -> Result<u64> {
        Ok(crud::reset_flags(&self.db).await?)
    }

    /// 图片总数、已索引数量与已聚类数量
    pub async fn count(&self) -> Result<(i64, i64, i64)> {
        Ok(crud::get_count(&self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(path: &str, embedding: Vec<f32>) -> NewImage {
        NewImage {
            path: path.to_owned(),
            file_hash: "h".to_owned(),
            size_bytes: 1,
            mtime: 0.0,
            embedding,
        }
    }

    #[tokio::test]
    async fn upsert_requires_bound_model() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = IMDBBuilder::new(dir.path().to_path_buf().into()).open().await?;
        let err = db.upsert_batch(&[image("/a.jpg", vec![1.0, 0.0])]).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ModelUnbound)));
        Ok(())
    }

    #[tokio::test]
    async fn bind_model_is_persistent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let conf_dir: ConfDir = dir.path().to_path_buf().into();
        {
            let db = IMDBBuilder::new(conf_dir.clone()).open().await?;
            db.bind_model("thumbnail-2", 12).await?;
            db.bind_model("thumbnail-2", 12).await?;
        }

        let db = IMDBBuilder::new(conf_dir).open().await?;
        assert_eq!(db.model().await?, Some(("thumbnail-2".to_owned(), 12)));
        let err = db.bind_model("thumbnail-4", 48).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ModelMismatch { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn embeddings_matrix_follows_id_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = IMDBBuilder::new(dir.path().to_path_buf().into()).open().await?;
        db.bind_model("test", 2).await?;
        let ids = db
            .upsert_batch(&[image("/b.jpg", vec![0.0, 1.0]), image("/a.jpg", vec![1.0, 0.0])])
            .await?;

        let (loaded, matrix) = db.embeddings().await?;
        assert_eq!(loaded, ids);
        assert_eq!(matrix.row(0).to_vec(), vec![0.0, 1.0]);
        assert_eq!(matrix.row(1).to_vec(), vec![1.0, 0.0]);
        Ok(())
    }
}
