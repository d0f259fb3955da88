//! 跟踪状态机 (Detect → Track → Recover)
//!
//! ```text
//!   Acquiring ──第一帧检测到──▶ Tracking ◀──重新检测到── Lost
//!       │                        │  update失败且检测不到      ▲
//!       └─未检测到: TargetNotFound └──────────────────────────┘
//! ```
//!
//! - Tracking 状态下恰好有一个活动跟踪器, Lost 状态下没有
//! - 跟踪失败后立刻丢弃跟踪器, 在当前帧重新检测; 找回时总是新建跟踪器
//! - 跟踪过程中的检测器错误、跟踪器初始化错误都按"未检测到"处理

use anyhow::Context;
use log::{debug, info, warn};

use super::{FrameOutcome, LoopState, OutcomeTag};
use crate::detection::{BBox, Detector, TargetAcquirer};
use crate::error::TrackError;
use crate::input::Frame;
use crate::tracker::{Tracker, TrackerFactory};

/// 绑定到一个目标的跟踪器实例
struct TrackerState {
    tracker: Box<dyn Tracker>,
    last_box: BBox,
    /// 此前发生过的获取次数
    generation: u64,
}

pub struct TrackingLoop<D, F> {
    detector: D,
    factory: F,
    acquirer: TargetAcquirer,
    state: LoopState,
    active: Option<TrackerState>,
    acquisitions: u64,
}

impl<D: Detector, F: TrackerFactory> TrackingLoop<D, F> {
    pub fn new(detector: D, factory: F, acquirer: TargetAcquirer) -> Self {
        Self {
            detector,
            factory,
            acquirer,
            state: LoopState::Acquiring,
            active: None,
            acquisitions: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// 最近一次成功定位的目标框 (仅 Tracking 状态)
    pub fn last_box(&self) -> Option<BBox> {
        self.active.as_ref().map(|t| t.last_box)
    }

    /// 当前跟踪器的代数 (仅 Tracking 状态)
    pub fn generation(&self) -> Option<u64> {
        self.active.as_ref().map(|t| t.generation)
    }

    /// 累计获取次数 (含第一帧)
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    pub fn acquirer(&self) -> &TargetAcquirer {
        &self.acquirer
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// 处理第一帧
    ///
    /// 目标不存在、检测器出错或跟踪器无法初始化时返回致命错误,循环不会开始。
    pub fn start(&mut self, frame: &Frame) -> Result<FrameOutcome, TrackError> {
        if self.state != LoopState::Acquiring {
            return Ok(self.step(frame));
        }

        let found = self
            .acquirer
            .acquire(&mut self.detector, frame)
            .map_err(TrackError::Detector)?;
        let Some(bbox) = found else {
            return Err(TrackError::TargetNotFound(
                self.acquirer.target_class().to_string(),
            ));
        };

        self.bind(frame, bbox)
            .context("第一帧跟踪器初始化失败")?;
        info!(
            "🎯 锁定目标 '{}': {} (跟踪器: {})",
            self.acquirer.target_class(),
            bbox,
            self.tracker_name()
        );
        Ok(FrameOutcome::located(
            frame.index(),
            OutcomeTag::Acquired,
            bbox,
        ))
    }

    /// 处理后续的一帧; 不会失败, 所有可恢复错误都体现为 lost
    pub fn step(&mut self, frame: &Frame) -> FrameOutcome {
        if let Some(active) = self.active.as_mut() {
            match active.tracker.update(frame) {
                Some(bbox) => {
                    active.last_box = bbox;
                    debug!("帧#{} 跟踪: {}", frame.index(), bbox);
                    return FrameOutcome::located(frame.index(), OutcomeTag::Tracking, bbox);
                }
                None => {
                    info!(
                        "⚠️ 帧#{} 跟踪失败 (上一位置 {}), 重新检测",
                        frame.index(),
                        active.last_box
                    );
                    self.active = None;
                }
            }
        }
        self.recover(frame)
    }

    /// 没有活动跟踪器时: 在当前帧上检测并(重新)建立跟踪器
    fn recover(&mut self, frame: &Frame) -> FrameOutcome {
        let was_lost = self.state == LoopState::Lost;
        let found = match self.acquirer.acquire(&mut self.detector, frame) {
            Ok(found) => found,
            Err(e) => {
                warn!("⚠️ 帧#{} 检测器出错, 按未检测到处理: {:#}", frame.index(), e);
                None
            }
        };

        if let Some(bbox) = found {
            let tag = if self.acquisitions == 0 {
                OutcomeTag::Acquired
            } else {
                OutcomeTag::Reacquired
            };
            match self.bind(frame, bbox) {
                Ok(()) => {
                    info!(
                        "🎯 帧#{} 重新锁定目标: {} (第{}次)",
                        frame.index(),
                        bbox,
                        self.acquisitions
                    );
                    return FrameOutcome::located(frame.index(), tag, bbox);
                }
                Err(e) => warn!("⚠️ 帧#{} 跟踪器初始化失败: {:#}", frame.index(), e),
            }
        }

        if was_lost {
            debug!("帧#{} 仍未找到目标", frame.index());
        } else {
            info!("❌ 帧#{} 目标丢失", frame.index());
        }
        self.state = LoopState::Lost;
        FrameOutcome::lost(frame.index())
    }

    /// 新建跟踪器并在 (frame, bbox) 上初始化; 旧跟踪器必须已被丢弃
    fn bind(&mut self, frame: &Frame, bbox: BBox) -> anyhow::Result<()> {
        let mut tracker = self.factory.create();
        tracker.init(frame, bbox)?;
        self.active = Some(TrackerState {
            tracker,
            last_box: bbox,
            generation: self.acquisitions,
        });
        self.acquisitions += 1;
        self.state = LoopState::Tracking;
        Ok(())
    }

    fn tracker_name(&self) -> &str {
        self.active.as_ref().map_or("-", |t| t.tracker.name())
    }
}
