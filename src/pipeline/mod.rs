/// 检测 → 跟踪 → 找回 流水线 (Detect-Track-Recover Pipeline)
///
/// 单线程同步主循环:
/// - TrackingLoop: 状态机 (Acquiring → Tracking ↔ Lost)
/// - run:          拉帧 → 状态机 → 渲染 → 轨迹日志, 每帧检查停止信号
/// - StopSignal:   协作式停止 (退出键 / 最大帧数)
/// - TrackLog:     每帧一行 JSON 的轨迹记录
pub mod report;
pub mod runner;
pub mod stop;
pub mod tracking_loop;

pub use report::TrackLog;
pub use runner::{run, RunSummary};
pub use stop::StopSignal;
pub use tracking_loop::TrackingLoop;

use serde::Serialize;

use crate::detection::BBox;

// ========== 状态与单帧结果 ==========

/// 跟踪循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    /// 尚未处理第一帧
    Acquiring,
    /// 有一个活动跟踪器
    Tracking,
    /// 没有跟踪器,每帧重新检测
    Lost,
}

/// 单帧结果标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeTag {
    /// 第一帧检测到目标
    Acquired,
    /// 跟踪器更新成功
    Tracking,
    /// 跟踪失败或丢失后重新检测到目标
    Reacquired,
    /// 本帧没有目标框
    Lost,
}

impl OutcomeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeTag::Acquired => "acquired",
            OutcomeTag::Tracking => "tracking",
            OutcomeTag::Reacquired => "reacquired",
            OutcomeTag::Lost => "lost",
        }
    }
}

/// 每帧输出: 目标框 (丢失时为空) + 标签
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameOutcome {
    pub frame_index: u64,
    pub state: LoopState,
    pub tag: OutcomeTag,
    pub bbox: Option<BBox>,
}

impl FrameOutcome {
    pub fn located(frame_index: u64, tag: OutcomeTag, bbox: BBox) -> Self {
        Self {
            frame_index,
            state: LoopState::Tracking,
            tag,
            bbox: Some(bbox),
        }
    }

    pub fn lost(frame_index: u64) -> Self {
        Self {
            frame_index,
            state: LoopState::Lost,
            tag: OutcomeTag::Lost,
            bbox: None,
        }
    }
}
