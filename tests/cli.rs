use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use rstest::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

fn write_gradient(path: &Path, size: u32, invert: bool) {
    let img = RgbImage::from_fn(size, size, |x, y| {
        let v = ((x + y) * 255 / (2 * size - 2)) as u8;
        let v = if invert { 255 - v } else { v };
        Rgb([v, v / 2, 255 - v / 3])
    });
    img.save(path).unwrap();
}

/// 两张相同的图片、一张反色图片、一个损坏的文件和一个无关文件
#[fixture]
fn dataset() -> assert_fs::TempDir {
    let dir = assert_fs::TempDir::new().unwrap();
    write_gradient(dir.child("a.jpg").path(), 64, false);
    write_gradient(dir.child("b.jpg").path(), 64, false);
    write_gradient(dir.child("c.jpg").path(), 64, true);
    dir.child("broken.jpg").touch().unwrap();
    dir.child("notes.txt").write_str("not an image").unwrap();
    dir
}

#[rstest]
fn index_cluster_review(dataset: assert_fs::TempDir) -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;

    cargo_run!("imdedup", "-c", conf_dir.path(), "index", dataset.path())
        .success()
        .stdout(predicate::str::contains("scanned: 4, skipped: 0, upserted: 3, failed: 1"));

    conf_dir.child("imdedup.db").assert(predicate::path::exists());

    // 再次运行时跳过已索引的图片，损坏的文件仍会重试
    cargo_run!("imdedup", "-c", conf_dir.path(), "index", dataset.path())
        .success()
        .stdout(predicate::str::contains("skipped: 3, upserted: 0, failed: 1"));

    cargo_run!("imdedup", "-c", conf_dir.path(), "cluster", "--threshold", "0.95")
        .success()
        .stdout(predicate::str::contains("images: 3, clusters: 1, clustered images: 2"));

    cargo_run!("imdedup", "-c", conf_dir.path(), "review", "list")
        .success()
        .stdout(predicate::str::contains("cluster 1: 2 images"));

    cargo_run!("imdedup", "-c", conf_dir.path(), "review", "show", "1")
        .success()
        .stdout(predicate::str::contains("a.jpg").and(predicate::str::contains("b.jpg")))
        .stdout(predicate::str::contains("c.jpg").not());

    cargo_run!("imdedup", "-c", conf_dir.path(), "review", "keep-first", "1").success();
    cargo_run!("imdedup", "-c", conf_dir.path(), "review", "list")
        .success()
        .stdout(predicate::str::contains("0 pending clusters"));

    cargo_run!("imdedup", "-c", conf_dir.path(), "review", "apply", "--yes").success();
    dataset.child("a.jpg").assert(predicate::path::exists());
    dataset.child("b.jpg").assert(predicate::path::missing());
    dataset.child("b.jpg._deleted").assert(predicate::path::exists());

    Ok(())
}

#[rstest]
fn export_embeddings(dataset: assert_fs::TempDir) -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    let output = conf_dir.child("out.npy");
    let ids = conf_dir.child("ids.npy");

    cargo_run!("imdedup", "-c", conf_dir.path(), "index", dataset.path(), "--model", "thumbnail-8").success();
    cargo_run!("imdedup", "-c", conf_dir.path(), "export", "-o", output.path(), "--ids", ids.path()).success();

    let data: ndarray::Array2<f32> = ndarray_npy::read_npy(output.path())?;
    assert_eq!(data.shape(), &[3, 192]);
    let ids: ndarray::Array1<i64> = ndarray_npy::read_npy(ids.path())?;
    assert_eq!(ids.to_vec(), vec![1, 2, 3]);
    Ok(())
}

#[test]
fn startup_errors() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;

    cargo_run!("imdedup", "-c", conf_dir.path(), "index", images.path().join("missing")).failure();
    cargo_run!("imdedup", "-c", conf_dir.path(), "index", images.path(), "--model", "resnet").failure();
    cargo_run!("imdedup", "-c", conf_dir.path(), "cluster", "--threshold", "1.5").failure();

    // 模型与数据库记录不一致
    cargo_run!("imdedup", "-c", conf_dir.path(), "init").success();
    cargo_run!("imdedup", "-c", conf_dir.path(), "index", images.path(), "--model", "thumbnail-8")
        .failure()
        .stderr(predicate::str::contains("thumbnail-16"));

    Ok(())
}
