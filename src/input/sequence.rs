/// 图片序列帧源
/// Image directory frame source (frame_000.png, frame_001.png, ...)
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{info, warn};

use super::{Frame, FrameSource};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

pub struct ImageSequence {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    size: Option<(u32, u32)>,
}

impl ImageSequence {
    /// 打开目录; 目录不存在或没有图片时失败
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .with_context(|| format!("读取目录失败: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        if files.is_empty() {
            bail!("目录中没有图片: {}", dir.display());
        }
        files.sort();
        info!("✅ 图片序列: {} ({}帧)", dir.display(), files.len());

        Ok(Self {
            dir,
            files,
            next: 0,
            size: None,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequence {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let image = image::open(path)
            .with_context(|| format!("图片解码失败: {}", path.display()))?
            .into_rgb8();

        // 整个流的分辨率固定,尺寸不一致的图片视为流结束
        let dims = image.dimensions();
        match self.size {
            None => self.size = Some(dims),
            Some(size) if size != dims => {
                warn!(
                    "⚠️ 分辨率变化 {:?} → {:?}, 停止读取: {}",
                    size,
                    dims,
                    path.display()
                );
                self.next = self.files.len();
                return Ok(None);
            }
            _ => {}
        }

        let frame = Frame::new(self.next as u64, image);
        self.next += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.next = self.files.len();
    }

    fn describe(&self) -> String {
        format!("图片序列 {}", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("yolov8-track-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_reads_in_name_order() {
        let dir = temp_dir("seq-order");
        for (name, v) in [("b.png", 20u8), ("a.png", 10u8), ("c.png", 30u8)] {
            RgbImage::from_pixel(4, 3, Rgb([v, v, v]))
                .save(dir.join(name))
                .unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut seq = ImageSequence::open(&dir).unwrap();
        assert_eq!(seq.len(), 3);
        let mut values = Vec::new();
        while let Some(frame) = seq.read_frame().unwrap() {
            assert_eq!(frame.index() as usize, values.len());
            values.push(frame.image().get_pixel(0, 0)[0]);
        }
        assert_eq!(values, vec![10, 20, 30]);
        assert!(seq.read_frame().unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_empty_dir_fails() {
        let dir = temp_dir("seq-empty");
        assert!(ImageSequence::open(&dir).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_release_ends_stream() {
        let dir = temp_dir("seq-release");
        RgbImage::new(2, 2).save(dir.join("0.png")).unwrap();
        let mut seq = ImageSequence::open(&dir).unwrap();
        seq.release();
        assert!(seq.read_frame().unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
