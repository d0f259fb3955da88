/// 检测系统 (Detection System)
///
/// - Detector:       检测器统一接口 (YOLOv8 / 测试桩)
/// - TargetAcquirer: 从检测结果中挑出唯一目标
pub mod detector;
pub mod types;

pub use detector::{Detector, SelectionPolicy, TargetAcquirer};
pub use types::{BBox, Detection, DEFAULT_CONF_THRESHOLD, DEFAULT_TARGET_CLASS};
