// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 运行配置 (命令行 + JSON)
pub mod detection; // 检测器接口与目标获取
pub mod error; // 致命错误与退出码
pub mod input; // 视频输入系统
pub mod models; // 检测模型实现
pub mod ort_backend; // ONNX Runtime 推理后端
pub mod pipeline; // 检测 → 跟踪 → 找回 主循环
pub mod renderer; // 结果绘制与保存
pub mod tracker; // 单目标跟踪器

pub use crate::config::{Args, TrackConfig};
pub use crate::detection::{BBox, Detection, Detector, SelectionPolicy, TargetAcquirer};
pub use crate::error::TrackError;
pub use crate::input::{open_source, Frame, FrameSource};
pub use crate::models::{YOLOv8, YOLOv8Config};
pub use crate::ort_backend::{OrtBackend, OrtEP};
pub use crate::pipeline::{FrameOutcome, LoopState, OutcomeTag, RunSummary, StopSignal, TrackingLoop};
pub use crate::renderer::{FileRenderer, NullRenderer, Renderer};
pub use crate::tracker::{TemplateTrackerFactory, Tracker, TrackerFactory, TrackerKind};

/// 本地时间字符串, 用作运行目录名
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    chrono::Local::now().format(&fmt).to_string()
}
