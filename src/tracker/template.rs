//! 模板匹配跟踪器 (Template matching tracker)
//!
//! 在上一位置周围的搜索窗口内做模板匹配,用零均值互相关判断是否跟丢,
//! 匹配成功后按学习率更新模板。

use anyhow::{anyhow, bail, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};
use log::trace;
use serde::{Deserialize, Serialize};

use super::{Tracker, TrackerKind};
use crate::detection::BBox;
use crate::input::Frame;

/// 模板跟踪参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub search_scale: f32,      // 搜索窗口相对目标尺寸的倍数
    pub min_confidence: f32,    // 零均值互相关下限,低于此值视为跟丢
    pub learning_rate: f32,     // 模板更新速率 (0 = 固定模板)
    pub max_template_side: u32, // 模板最长边,大目标先缩小再匹配
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            search_scale: 2.0,
            min_confidence: 0.5,
            learning_rate: 0.1,
            max_template_side: 48,
        }
    }
}

/// 模板跟踪器
pub struct TemplateTracker {
    kind: TrackerKind,
    config: TemplateConfig,
    template: Option<GrayImage>,
    /// 匹配尺度 (模板像素 / 原图像素)
    scale: f32,
    /// 画面内可见部分 (原图坐标)
    region: Option<BBox>,
    /// 完整目标框相对可见部分的偏移
    offset: (i32, i32),
    size: (i32, i32),
    last_confidence: f32,
}

impl TemplateTracker {
    pub fn new(kind: TrackerKind, config: TemplateConfig) -> Self {
        Self {
            kind,
            config,
            template: None,
            scale: 1.0,
            region: None,
            offset: (0, 0),
            size: (0, 0),
            last_confidence: 0.0,
        }
    }

    pub fn last_confidence(&self) -> f32 {
        self.last_confidence
    }

    fn gray_crop(frame: &Frame, region: &BBox) -> GrayImage {
        let rgb = imageops::crop_imm(
            frame.image(),
            region.x() as u32,
            region.y() as u32,
            region.width() as u32,
            region.height() as u32,
        )
        .to_image();
        imageops::grayscale(&rgb)
    }

    fn scaled(&self, len: i32) -> u32 {
        ((len as f32 * self.scale).round() as u32).max(1)
    }

    fn track(&mut self, frame: &Frame) -> Result<BBox> {
        let template = self.template.as_ref().ok_or_else(|| anyhow!("跟踪器未初始化"))?;
        let region = self.region.ok_or_else(|| anyhow!("跟踪器未初始化"))?;

        // 以上一位置为中心的搜索窗口, 不小于目标本身
        let (cx, cy) = region.center();
        let ww = ((region.width() as f32 * self.config.search_scale).round() as i32)
            .max(region.width());
        let wh = ((region.height() as f32 * self.config.search_scale).round() as i32)
            .max(region.height());
        let window = BBox::new(
            (cx - ww as f32 / 2.0).round() as i32,
            (cy - wh as f32 / 2.0).round() as i32,
            ww,
            wh,
        )
        .and_then(|w| w.clip_to(frame.width(), frame.height()))
        .ok_or_else(|| anyhow!("搜索窗口在画面外"))?;

        let search = Self::gray_crop(frame, &window);
        let search = imageops::resize(
            &search,
            self.scaled(window.width()),
            self.scaled(window.height()),
            FilterType::Triangle,
        );
        if search.width() < template.width() || search.height() < template.height() {
            bail!("搜索窗口小于模板");
        }

        let method = match self.kind {
            TrackerKind::Ncc => MatchTemplateMethod::CrossCorrelationNormalized,
            TrackerKind::Ssd => MatchTemplateMethod::SumOfSquaredErrorsNormalized,
        };
        let scores = match_template(&search, template, method);
        let extremes = find_extremes(&scores);
        let (mx, my) = match self.kind {
            TrackerKind::Ncc => extremes.max_value_location,
            TrackerKind::Ssd => extremes.min_value_location,
        };

        let patch = imageops::crop_imm(&search, mx, my, template.width(), template.height())
            .to_image();
        let confidence = zncc(template, &patch);
        self.last_confidence = confidence;
        trace!("{} 匹配 ({}, {}) 置信度 {:.3}", self.kind.name(), mx, my, confidence);
        if !(confidence >= self.config.min_confidence) {
            bail!("置信度过低: {:.3}", confidence);
        }

        let found = BBox::new(
            window.x() + (mx as f32 / self.scale).round() as i32,
            window.y() + (my as f32 / self.scale).round() as i32,
            region.width(),
            region.height(),
        )
        .ok_or_else(|| anyhow!("无效的匹配区域"))?;

        let lr = self.config.learning_rate.clamp(0.0, 1.0);
        if lr > 0.0 {
            let blended = blend(template, &patch, lr);
            self.template = Some(blended);
        }
        self.region = Some(found);

        BBox::new(
            found.x() - self.offset.0,
            found.y() - self.offset.1,
            self.size.0,
            self.size.1,
        )
        .ok_or_else(|| anyhow!("无效的目标框"))
    }
}

impl Tracker for TemplateTracker {
    fn init(&mut self, frame: &Frame, bbox: BBox) -> Result<()> {
        let visible = bbox
            .clip_to(frame.width(), frame.height())
            .ok_or_else(|| anyhow!("目标框 {} 完全在画面外", bbox))?;

        let longest = visible.width().max(visible.height()) as f32;
        self.scale = (self.config.max_template_side.max(4) as f32 / longest).min(1.0);

        let patch = Self::gray_crop(frame, &visible);
        let template = imageops::resize(
            &patch,
            self.scaled(visible.width()),
            self.scaled(visible.height()),
            FilterType::Triangle,
        );
        if template.width() < 3 || template.height() < 3 {
            bail!("目标过小: {}", visible);
        }

        self.template = Some(template);
        self.region = Some(visible);
        self.offset = (visible.x() - bbox.x(), visible.y() - bbox.y());
        self.size = (bbox.width(), bbox.height());
        self.last_confidence = 1.0;
        Ok(())
    }

    fn update(&mut self, frame: &Frame) -> Option<BBox> {
        match self.track(frame) {
            Ok(bbox) => Some(bbox),
            Err(e) => {
                trace!("{} 跟踪失败: {}", self.kind.name(), e);
                None
            }
        }
    }

    fn name(&self) -> &str {
        self.kind.name()
    }
}

/// 零均值归一化互相关, 任一图像无纹理时返回0
fn zncc(a: &GrayImage, b: &GrayImage) -> f32 {
    let n = a.as_raw().len().min(b.as_raw().len());
    if n == 0 {
        return 0.0;
    }
    let (a, b) = (&a.as_raw()[..n], &b.as_raw()[..n]);
    let mean_a = a.iter().map(|&v| v as f32).sum::<f32>() / n as f32;
    let mean_b = b.iter().map(|&v| v as f32).sum::<f32>() / n as f32;

    let (mut num, mut da, mut db) = (0.0f32, 0.0f32, 0.0f32);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f32 - mean_a, y as f32 - mean_b);
        num += x * y;
        da += x * x;
        db += y * y;
    }
    let denom = (da * db).sqrt();
    if denom < 1e-6 {
        0.0
    } else {
        num / denom
    }
}

fn blend(template: &GrayImage, patch: &GrayImage, lr: f32) -> GrayImage {
    GrayImage::from_fn(template.width(), template.height(), |x, y| {
        let t = template.get_pixel(x, y)[0] as f32;
        let p = patch.get_pixel(x, y)[0] as f32;
        Luma([((1.0 - lr) * t + lr * p).round().clamp(0.0, 255.0) as u8])
    })
}
