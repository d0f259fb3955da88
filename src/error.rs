// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 致命错误类型 (Fatal error taxonomy)
// 只有启动阶段的错误会传递到 main,跟踪过程中的失败由状态机内部吸收

use thiserror::Error;

/// 需要终止运行的错误
#[derive(Error, Debug)]
pub enum TrackError {
    /// 视频源无法打开
    #[error("无法打开视频源: {source_id}")]
    SourceUnavailable {
        source_id: String,
        #[source]
        cause: anyhow::Error,
    },

    /// 第一帧读取失败 (空流或解码失败)
    #[error("无法读取视频的第一帧: {0}")]
    FirstFrameUnreadable(String),

    /// 第一帧中没有符合条件的目标
    #[error("第一帧中未检测到类别 '{0}' 的目标")]
    TargetNotFound(String),

    /// 检测器在第一帧推理失败
    #[error("检测器推理失败")]
    Detector(#[source] anyhow::Error),

    /// 配置或模型加载失败
    #[error("配置错误: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrackError {
    /// 进程退出码: 每种致命条件一个独立的值,便于脚本判断
    pub fn exit_code(&self) -> i32 {
        match self {
            TrackError::Config(_) | TrackError::Detector(_) | TrackError::Other(_) => 1,
            TrackError::SourceUnavailable { .. } => 2,
            TrackError::FirstFrameUnreadable(_) => 3,
            TrackError::TargetNotFound(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            TrackError::Config("x".into()).exit_code(),
            TrackError::SourceUnavailable {
                source_id: "a.mp4".into(),
                cause: anyhow::anyhow!("missing"),
            }
            .exit_code(),
            TrackError::FirstFrameUnreadable("a.mp4".into()).exit_code(),
            TrackError::TargetNotFound("person".into()).exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_target_not_found_message() {
        let e = TrackError::TargetNotFound("person".into());
        assert!(e.to_string().contains("person"));
    }
}
