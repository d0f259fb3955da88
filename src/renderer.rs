// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 渲染器: 在帧上绘制跟踪结果并保存
// 跟踪/首次锁定: 绿框, 重新锁定: 蓝框, 丢失: 红色 "Tracking failed!"

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use log::{info, warn};

use crate::detection::BBox;
use crate::input::Frame;
use crate::pipeline::{FrameOutcome, OutcomeTag};

pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);

const BOX_THICKNESS: i32 = 2;
const BORDER_THICKNESS: i32 = 4;
const LOST_TEXT: &str = "Tracking failed!";
const LOST_TEXT_POS: (i32, i32) = (20, 80);

/// 随程序打包的默认字体 (DejaVu Sans)
const EMBEDDED_FONT: &[u8] = include_bytes!("../assets/font/DejaVuSans.ttf");

/// 结果消费者
pub trait Renderer {
    fn render(&mut self, frame: &Frame, outcome: &FrameOutcome) -> Result<()>;

    /// 运行结束时调用
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn render(&mut self, frame: &Frame, outcome: &FrameOutcome) -> Result<()> {
        (**self).render(frame, outcome)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// 无输出 (无界面运行)
#[derive(Debug, Default)]
pub struct NullRenderer {
    pub frames: u64,
}

impl Renderer for NullRenderer {
    fn render(&mut self, _frame: &Frame, _outcome: &FrameOutcome) -> Result<()> {
        self.frames += 1;
        Ok(())
    }
}

/// 把标注后的帧写成 `frame_{index:06}.png`
pub struct FileRenderer {
    dir: PathBuf,
    label: String,
    font: Option<FontVec>,
    written: u64,
}

impl FileRenderer {
    /// `font` 为 None 时只画框不写字
    pub fn new(dir: impl Into<PathBuf>, font: Option<FontVec>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("创建输出目录失败: {}", dir.display()))?;
        Ok(Self {
            dir,
            label: String::new(),
            font,
            written: 0,
        })
    }

    /// 框上方的文字前缀 (通常是目标类别)
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", index))
    }
}

impl Renderer for FileRenderer {
    fn render(&mut self, frame: &Frame, outcome: &FrameOutcome) -> Result<()> {
        let mut img = frame.image().clone();
        annotate(&mut img, outcome, &self.label, self.font.as_ref());
        let path = self.frame_path(frame.index());
        img.save(&path)
            .with_context(|| format!("保存帧失败: {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        info!("🖼️ 已保存 {} 帧到 {}", self.written, self.dir.display());
        Ok(())
    }
}

/// 优先加载指定字体, 失败时退回内置字体
pub fn resolve_font(path: &Path) -> Option<FontVec> {
    load_font(path).or_else(|| {
        info!("🔤 使用内置字体 DejaVu Sans");
        embedded_font()
    })
}

pub fn embedded_font() -> Option<FontVec> {
    FontVec::try_from_vec(EMBEDDED_FONT.to_vec())
        .map_err(|e| warn!("⚠️ 内置字体解析失败: {}", e))
        .ok()
}

/// 字体缺失或无法解析时返回 None
pub fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("⚠️ 字体加载失败 {}: {}", path.display(), e);
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("⚠️ 字体解析失败 {}: {}", path.display(), e);
            None
        }
    }
}

/// 按单帧结果在图像上绘制
pub fn annotate(img: &mut RgbImage, outcome: &FrameOutcome, label: &str, font: Option<&FontVec>) {
    let color = match outcome.tag {
        OutcomeTag::Acquired | OutcomeTag::Tracking => GREEN,
        OutcomeTag::Reacquired => BLUE,
        OutcomeTag::Lost => RED,
    };

    match outcome.bbox {
        Some(bbox) => {
            let text = if label.is_empty() {
                outcome.tag.as_str().to_string()
            } else {
                format!("{} ({})", label, outcome.tag.as_str())
            };
            draw_bounding_box(img, &bbox, color, Some(&text), font);
        }
        None => match font {
            Some(font) => draw_text_mut(
                img,
                RED,
                LOST_TEXT_POS.0,
                LOST_TEXT_POS.1,
                PxScale::from(24.0),
                font,
                LOST_TEXT,
            ),
            None => draw_border(img, RED, BORDER_THICKNESS),
        },
    }
}

/// 绘制边界框, 可选在框上方写标签 (框可以部分超出画面)
pub fn draw_bounding_box(
    img: &mut RgbImage,
    bbox: &BBox,
    color: Rgb<u8>,
    label: Option<&str>,
    font: Option<&FontVec>,
) {
    for t in 0..BOX_THICKNESS {
        let (w, h) = (bbox.width() - 2 * t, bbox.height() - 2 * t);
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(bbox.x() + t, bbox.y() + t).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(img, rect, color);
    }

    if let (Some(text), Some(font)) = (label, font) {
        let y = (bbox.y() - 20).max(0);
        draw_text_mut(img, color, bbox.x().max(0), y, PxScale::from(18.0), font, text);
    }
}

fn draw_border(img: &mut RgbImage, color: Rgb<u8>, thickness: i32) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    for t in 0..thickness {
        if w - 2 * t <= 0 || h - 2 * t <= 0 {
            break;
        }
        let rect = Rect::at(t, t).of_size((w - 2 * t) as u32, (h - 2 * t) as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}
