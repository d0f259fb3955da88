//! 单目标跟踪器公共组件
//! Common components for single-object tracking
//!
//! 跟踪器一旦 update 失败就必须丢弃,重新获取目标时总是新建实例。

pub mod template;

pub use template::{TemplateConfig, TemplateTracker};

use anyhow::{bail, Result};

use crate::detection::BBox;
use crate::input::Frame;

// ========== 跟踪器统一接口 ==========

/// 单目标跟踪器 Trait
pub trait Tracker {
    /// 用一帧和目标框初始化
    fn init(&mut self, frame: &Frame, bbox: BBox) -> Result<()>;

    /// 估计目标在新一帧中的位置; None 表示跟丢
    fn update(&mut self, frame: &Frame) -> Option<BBox>;

    fn name(&self) -> &str {
        "tracker"
    }
}

/// 跟踪器工厂: 每次(重新)获取目标时创建一个全新的跟踪器
pub trait TrackerFactory {
    fn create(&mut self) -> Box<dyn Tracker>;
}

impl<F> TrackerFactory for F
where
    F: FnMut() -> Box<dyn Tracker>,
{
    fn create(&mut self) -> Box<dyn Tracker> {
        self()
    }
}

// ========== 跟踪后端 ==========

/// 跟踪器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerKind {
    /// 归一化互相关搜索
    Ncc,
    /// 归一化平方差搜索
    Ssd,
}

impl TrackerKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "ncc" => Ok(TrackerKind::Ncc),
            "ssd" => Ok(TrackerKind::Ssd),
            other => bail!("未知的跟踪器: {} (可选: ncc, ssd)", other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrackerKind::Ncc => "ncc",
            TrackerKind::Ssd => "ssd",
        }
    }
}

/// 模板跟踪器工厂
#[derive(Debug, Clone)]
pub struct TemplateTrackerFactory {
    pub kind: TrackerKind,
    pub config: TemplateConfig,
}

impl TemplateTrackerFactory {
    pub fn new(kind: TrackerKind, config: TemplateConfig) -> Self {
        Self { kind, config }
    }
}

impl TrackerFactory for TemplateTrackerFactory {
    fn create(&mut self) -> Box<dyn Tracker> {
        Box::new(TemplateTracker::new(self.kind, self.config.clone()))
    }
}
