use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use imdedup::embed::{FeatureExtractor, ThumbnailExtractor};
use imdedup::indexer::{IndexConfig, index_images};
use imdedup::{IMDB, IMDBBuilder};
use rstest::*;
use tempfile::TempDir;

/// 统计调用次数的特征提取器
struct CountingExtractor {
    inner: ThumbnailExtractor,
    calls: AtomicUsize,
}

impl FeatureExtractor for CountingExtractor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(image)
    }
}

struct Env {
    images: TempDir,
    _conf: TempDir,
    db: Arc<IMDB>,
    extractor: Arc<CountingExtractor>,
}

impl Env {
    fn config(&self) -> IndexConfig {
        IndexConfig { batch_size: 2, ..IndexConfig::new(self.images.path()) }
    }

    async fn index(&self, config: &IndexConfig) -> imdedup::indexer::IndexStats {
        index_images(self.db.clone(), self.extractor.clone(), config).await.unwrap()
    }

    fn calls(&self) -> usize {
        self.extractor.calls.load(Ordering::SeqCst)
    }

    fn path(&self, name: &str) -> String {
        self.images.path().canonicalize().unwrap().join(name).to_string_lossy().to_string()
    }
}

#[fixture]
async fn env() -> Env {
    let images = tempfile::tempdir().unwrap();
    let conf = tempfile::tempdir().unwrap();
    let db = Arc::new(IMDBBuilder::new(conf.path().to_path_buf().into()).open().await.unwrap());
    let extractor =
        Arc::new(CountingExtractor { inner: ThumbnailExtractor::new(4).unwrap(), calls: AtomicUsize::new(0) });
    Env { images, _conf: conf, db, extractor }
}

fn write_gradient(path: &Path, size: u32, invert: bool) {
    let img = RgbImage::from_fn(size, size, |x, y| {
        let v = ((x + y) * 255 / (2 * size - 2)) as u8;
        let v = if invert { 255 - v } else { v };
        Rgb([v, 255 - v, v / 2])
    });
    img.save(path).unwrap();
}

#[rstest]
#[tokio::test]
async fn index_new_files(#[future] env: Env) {
    let env = env.await;
    write_gradient(&env.images.path().join("a.jpg"), 32, false);
    write_gradient(&env.images.path().join("b.JPEG"), 32, true);
    std::fs::create_dir(env.images.path().join("sub")).unwrap();
    write_gradient(&env.images.path().join("sub/c.jpg"), 40, false);
    write_gradient(&env.images.path().join("d.png"), 32, false);
    std::fs::write(env.images.path().join("broken.jpg"), b"").unwrap();

    let stats = env.index(&env.config()).await;
    assert_eq!(stats.scanned, 4);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.upserted, 3);
    assert_eq!(stats.failed, 1);

    assert!(env.db.image_by_path(&env.path("broken.jpg")).await.unwrap().is_none());
    assert!(env.db.image_by_path(&env.path("d.png")).await.unwrap().is_none());

    let record = env.db.image_by_path(&env.path("sub/c.jpg")).await.unwrap().unwrap();
    let data = std::fs::read(env.path("sub/c.jpg")).unwrap();
    assert_eq!(record.file_hash, blake3::hash(&data).to_hex().to_string());
    assert_eq!(record.size_bytes, data.len() as i64);
    assert_eq!(record.cluster_id, None);

    // 特征向量为单位向量
    let (ids, matrix) = env.db.embeddings().await.unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(matrix.ncols(), 48);
    for row in matrix.rows() {
        assert!((row.dot(&row) - 1.0).abs() < 1e-4);
    }
}

/// 文件未变化时不重新计算，也不写入数据库
#[rstest]
#[tokio::test]
async fn unchanged_file_is_untouched(#[future] env: Env) {
    let env = env.await;
    write_gradient(&env.images.path().join("a.jpg"), 32, false);

    let stats = env.index(&env.config()).await;
    assert_eq!(stats.upserted, 1);
    assert_eq!(env.calls(), 1);

    let before = env.db.image_by_path(&env.path("a.jpg")).await.unwrap().unwrap();
    env.db.set_reviewed(before.id, true).await.unwrap();

    let stats = env.index(&env.config()).await;
    assert_eq!(stats.scanned, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.upserted, 0);
    assert_eq!(env.calls(), 1);

    let after = env.db.image_by_path(&env.path("a.jpg")).await.unwrap().unwrap();
    assert_eq!(after.updated_at, before.updated_at);
    assert!(after.reviewed);

    // force 时总是重新计算
    let config = IndexConfig { force: true, ..env.config() };
    let stats = env.index(&config).await;
    assert_eq!(stats.upserted, 1);
    assert_eq!(env.calls(), 2);
    let forced = env.db.image_by_path(&env.path("a.jpg")).await.unwrap().unwrap();
    assert_eq!(forced.id, before.id);
    assert!(!forced.reviewed);
}

/// 文件大小变化时更新记录并重置审核状态
#[rstest]
#[tokio::test]
async fn changed_file_is_refreshed(#[future] env: Env) {
    let env = env.await;
    let file = env.images.path().join("a.jpg");
    write_gradient(&file, 32, false);
    env.index(&env.config()).await;

    let before = env.db.image_by_path(&env.path("a.jpg")).await.unwrap().unwrap();
    let (_, old_matrix) = env.db.embeddings().await.unwrap();
    env.db.replace_clusters(&[vec![before.id]]).await.unwrap();
    env.db.set_reviewed(before.id, true).await.unwrap();
    env.db.set_to_delete(before.id, true).await.unwrap();

    write_gradient(&file, 64, true);
    let stats = env.index(&env.config()).await;
    assert_eq!(stats.upserted, 1);

    let after = env.db.image_by_path(&env.path("a.jpg")).await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_ne!(after.size_bytes, before.size_bytes);
    assert_ne!(after.file_hash, before.file_hash);
    assert_eq!(after.cluster_id, None);
    assert!(!after.reviewed);
    assert!(!after.to_delete);

    let (_, new_matrix) = env.db.embeddings().await.unwrap();
    assert_ne!(old_matrix, new_matrix);
}

#[rstest]
#[tokio::test]
async fn limit_and_suffix(#[future] env: Env) {
    let env = env.await;
    for name in ["a.jpg", "b.jpg", "c.png", "d.jpg"] {
        write_gradient(&env.images.path().join(name), 16, false);
    }

    let config = IndexConfig { limit: 2, ..env.config() };
    let stats = env.index(&config).await;
    assert_eq!(stats.scanned, 2);
    assert!(env.db.image_by_path(&env.path("a.jpg")).await.unwrap().is_some());
    assert!(env.db.image_by_path(&env.path("d.jpg")).await.unwrap().is_none());

    let config = IndexConfig { suffix: "png".to_owned(), ..env.config() };
    let stats = env.index(&config).await;
    assert_eq!((stats.scanned, stats.upserted), (1, 1));
}

#[rstest]
#[tokio::test]
async fn startup_failures_write_nothing(#[future] env: Env) {
    let env = env.await;
    write_gradient(&env.images.path().join("a.jpg"), 16, false);

    let missing = IndexConfig::new(env.images.path().join("missing"));
    assert!(index_images(env.db.clone(), env.extractor.clone(), &missing).await.is_err());

    // 数据库已绑定到其他模型
    env.db.bind_model("thumbnail-8", 192).await.unwrap();
    assert!(index_images(env.db.clone(), env.extractor.clone(), &env.config()).await.is_err());
    assert_eq!(env.db.count().await.unwrap().0, 0);
    assert_eq!(env.calls(), 0);
}

/// 符号链接按链接路径索引
#[cfg(unix)]
#[rstest]
#[tokio::test]
async fn symlinked_image_is_indexed(#[future] env: Env) {
    let env = env.await;
    let other = tempfile::tempdir().unwrap();
    write_gradient(&other.path().join("real.jpg"), 16, false);
    std::os::unix::fs::symlink(other.path().join("real.jpg"), env.images.path().join("link.jpg")).unwrap();

    let stats = env.index(&env.config()).await;
    assert_eq!((stats.scanned, stats.upserted, stats.failed), (1, 1, 0));
    assert!(env.db.image_by_path(&env.path("link.jpg")).await.unwrap().is_some());
}
