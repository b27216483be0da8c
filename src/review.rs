//! 基于审核接口的批量操作

use std::path::Path;

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use utoipa::ToSchema;

use crate::IMDB;
use crate::db::{Error, ImageRecord, crud};

/// 被删除文件的后缀
pub const DELETED_SUFFIX: &str = "._deleted";

/// 应用删除标记的结果
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct DeletionReport {
    /// 成功重命名的文件
    pub renamed: Vec<String>,
    /// 文件已不存在而跳过的记录
    pub missing: Vec<String>,
    /// 处理失败的文件及原因
    pub failed: Vec<(String, String)>,
}

impl IMDB {
    /// 按顺序为聚类中的每张图片设置审核与删除标记
    async fn review_cluster<F>(&self, cluster_id: i64, to_delete: F) -> Result<Vec<ImageRecord>>
    where
        F: Fn(usize, &ImageRecord) -> bool,
    {
        let mut tx = self.pool().begin().await?;
        let images = crud::get_cluster_images(&mut *tx, cluster_id).await?;
        if images.is_empty() {
            return Err(Error::ClusterNotFound(cluster_id).into());
        }
        for (i, image) in images.iter().enumerate() {
            crud::set_reviewed(&mut *tx, image.id, true).await?;
            crud::set_to_delete(&mut *tx, image.id, to_delete(i, image)).await?;
        }
        tx.commit().await?;
        Ok(images)
    }

    /// 保留聚类中 ID 最小的图片，其余标记为删除
    pub async fn keep_first(&self, cluster_id: i64) -> Result<()> {
        self.review_cluster(cluster_id, |i, _| i != 0).await?;
        Ok(())
    }

    /// 只保留指定图片，其余标记为删除
    pub async fn keep_only(&self, cluster_id: i64, image_id: i64) -> Result<()> {
        match self.get_image(image_id).await? {
            Some(image) if image.cluster_id == Some(cluster_id) => {}
            Some(_) => return Err(Error::NotInCluster { cluster_id, image_id }.into()),
            None => return Err(Error::ImageNotFound(image_id).into()),
        }
        self.review_cluster(cluster_id, |_, image| image.id != image_id).await?;
        Ok(())
    }

    /// 将聚类标记为已审核，不删除任何图片
    pub async fn ignore(&self, cluster_id: i64) -> Result<()> {
        self.review_cluster(cluster_id, |_, _| false).await?;
        Ok(())
    }

    /// 将聚类中的所有图片标记为删除
    pub async fn delete_all(&self, cluster_id: i64) -> Result<()> {
        self.review_cluster(cluster_id, |_, _| true).await?;
        Ok(())
    }

    pub async fn mark(&self, image_id: i64) -> Result<()> {
        self.set_to_delete(image_id, true).await
    }

    pub async fn unmark(&self, image_id: i64) -> Result<()> {
        self.set_to_delete(image_id, false).await
    }

    /// 同时修改一张图片的审核与删除标记，未指定的标记保持不变
    pub async fn update_flags(
        &self,
        image_id: i64,
        reviewed: Option<bool>,
        to_delete: Option<bool>,
    ) -> Result<ImageRecord> {
        let mut tx = self.pool().begin().await?;
        let Some(image) = crud::get_image(&mut *tx, image_id).await? else {
            return Err(Error::ImageNotFound(image_id).into());
        };
        if let Some(reviewed) = reviewed {
            crud::set_reviewed(&mut *tx, image.id, reviewed).await?;
        }
        if let Some(to_delete) = to_delete {
            crud::set_to_delete(&mut *tx, image.id, to_delete).await?;
        }
        let image = crud::get_image(&mut *tx, image_id).await?.ok_or(Error::ImageNotFound(image_id))?;
        tx.commit().await?;
        Ok(image)
    }

    /// 撤销全部审核结果
    pub async fn revert_all(&self) -> Result<u64> {
        let n = self.reset_flags().await?;
        info!("已重置 {} 张图片的审核状态", n);
        Ok(n)
    }

    /// 将所有标记为删除的图片重命名为 `<path>._deleted`，并更新数据库中的路径
    ///
    /// 单个文件失败不会中断整个过程
    pub async fn apply_deletions(&self) -> Result<DeletionReport> {
        let mut report = DeletionReport::default();
        for image in crud::get_images_to_delete(self.pool()).await? {
            if image.path.ends_with(DELETED_SUFFIX) {
                continue;
            }
            if !Path::new(&image.path).exists() {
                warn!("文件不存在，跳过: {}", image.path);
                report.missing.push(image.path);
                continue;
            }
            match self.rename_deleted(&image).await {
                Ok(new_path) => {
                    info!("删除图片: {} -> {}", image.path, new_path);
                    report.renamed.push(image.path);
                }
                Err(e) => {
                    warn!("删除图片失败: {}: {}", image.path, e);
                    report.failed.push((image.path, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    async fn rename_deleted(&self, image: &ImageRecord) -> Result<String> {
        let new_path = format!("{}{}", image.path, DELETED_SUFFIX);
        if Path::new(&new_path).exists() || self.image_by_path(&new_path).await?.is_some() {
            return Err(Error::PathConflict(new_path).into());
        }

        tokio::fs::rename(&image.path, &new_path).await?;
        if let Err(e) = crud::update_image_path(self.pool(), image.id, &new_path).await {
            // 数据库更新失败时恢复原文件名
            tokio::fs::rename(&new_path, &image.path).await?;
            let unique = e.as_database_error().is_some_and(|e| e.is_unique_violation());
            return Err(if unique { Error::PathConflict(new_path).into() } else { e.into() });
        }
        Ok(new_path)
    }
}
