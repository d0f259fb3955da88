//! 检测器接口与目标获取 (Detector & TargetAcquirer)
//! 职责: 对一帧调用检测器 → 按策略挑出唯一的目标框

use anyhow::Result;
use log::debug;

use super::types::{BBox, Detection, DEFAULT_CONF_THRESHOLD, DEFAULT_TARGET_CLASS};
use crate::input::Frame;

/// 目标检测器统一接口
///
/// 返回的检测结果是有序序列,顺序由具体实现决定 (YOLOv8 为置信度降序)。
/// 从跟踪循环的角度看每次调用都是无状态的。
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// 检测器名称 (用于日志)
    fn name(&self) -> &str {
        "detector"
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// 多个候选时的选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// 按检测器输出顺序取第一个合格的 (默认)
    #[default]
    FirstMatch,
    /// 取置信度最高的合格框,同分时取靠前的
    HighestScore,
}

impl SelectionPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "first" | "first-match" => Some(SelectionPolicy::FirstMatch),
            "highest" | "highest-score" => Some(SelectionPolicy::HighestScore),
            _ => None,
        }
    }

    /// 在有序检测序列中选出目标
    pub fn select<'a>(
        &self,
        detections: &'a [Detection],
        target_class: &str,
        threshold: f32,
    ) -> Option<&'a Detection> {
        let mut candidates = detections
            .iter()
            .filter(|d| d.qualifies(target_class, threshold));
        match self {
            SelectionPolicy::FirstMatch => candidates.next(),
            SelectionPolicy::HighestScore => candidates.fold(None, |best: Option<&Detection>, d| {
                match best {
                    Some(b) if b.score >= d.score => Some(b),
                    _ => Some(d),
                }
            }),
        }
    }
}

/// 目标获取器: 在一帧中找到目标类别的唯一检测框
#[derive(Debug, Clone)]
pub struct TargetAcquirer {
    target_class: String,
    threshold: f32,
    policy: SelectionPolicy,
}

impl Default for TargetAcquirer {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_CLASS, DEFAULT_CONF_THRESHOLD)
    }
}

impl TargetAcquirer {
    pub fn new(target_class: impl Into<String>, threshold: f32) -> Self {
        Self {
            target_class: target_class.into(),
            threshold,
            policy: SelectionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// 调用一次检测器; Ok(None) 表示本帧没有合格目标
    pub fn acquire<D: Detector + ?Sized>(
        &self,
        detector: &mut D,
        frame: &Frame,
    ) -> Result<Option<BBox>> {
        let detections = detector.detect(frame)?;
        let picked = self.pick(&detections);
        debug!(
            "🔍 帧#{} {}: {}个检测 → {}",
            frame.index(),
            detector.name(),
            detections.len(),
            picked.map_or_else(|| "未命中".to_string(), |b| b.to_string())
        );
        Ok(picked)
    }

    /// 纯函数部分: 同一组检测结果总是得到同一个框
    pub fn pick(&self, detections: &[Detection]) -> Option<BBox> {
        self.policy
            .select(detections, &self.target_class, self.threshold)
            .map(|d| d.bbox)
    }
}
