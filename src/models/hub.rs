// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 模型文件获取: 本地路径 → 缓存目录 → 下载

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;

const CACHE_SUBDIR: &str = "yolov8-track";

/// 模型缓存目录 (`~/.cache/yolov8-track` 或平台对应位置)
pub fn cache_dir() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .context("无法确定用户缓存目录")?
        .join(CACHE_SUBDIR);
    fs::create_dir_all(&dir).with_context(|| format!("创建缓存目录失败: {}", dir.display()))?;
    Ok(dir)
}

/// 返回可用的模型路径
///
/// 本地文件存在时直接使用; 否则在缓存目录中查找同名文件;
/// 仍不存在且给出了 `url` 时下载到缓存目录。
pub fn ensure_model(path: &Path, url: Option<&str>) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let file_name = match path.file_name() {
        Some(name) => name.to_owned(),
        None => bail!("无效的模型路径: {}", path.display()),
    };
    let cached = cache_dir()?.join(&file_name);
    if cached.is_file() {
        info!("📦 使用缓存模型: {}", cached.display());
        return Ok(cached);
    }

    match url {
        Some(url) => {
            download(url, &cached)?;
            Ok(cached)
        }
        None => bail!(
            "模型文件不存在: {} (可用 --model-url 指定下载地址)",
            path.display()
        ),
    }
}

fn download(url: &str, dst: &Path) -> Result<()> {
    info!("⬇️ 下载模型: {} → {}", url, dst.display());
    let resp = ureq::get(url)
        .call()
        .with_context(|| format!("下载失败: {}", url))?;

    // 写入 .part 临时文件, 完成后改名
    let tmp = dst.with_extension("part");
    let mut file =
        fs::File::create(&tmp).with_context(|| format!("创建文件失败: {}", tmp.display()))?;
    let bytes = io::copy(&mut resp.into_reader(), &mut file)
        .with_context(|| format!("写入模型失败: {}", tmp.display()))?;
    drop(file);
    fs::rename(&tmp, dst).with_context(|| format!("重命名失败: {}", dst.display()))?;

    info!("✅ 模型下载完成: {:.1} MB", bytes as f64 / 1024.0 / 1024.0);
    Ok(())
}
