//! 运行配置 - 命令行参数 + 可选JSON配置文件
//!
//! 优先级: 命令行 > 配置文件 > 默认值

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::detection::{SelectionPolicy, DEFAULT_CONF_THRESHOLD, DEFAULT_TARGET_CLASS};
use crate::error::TrackError;
use crate::models::YOLOv8Config;
use crate::tracker::{TemplateConfig, TrackerKind};
use crate::OrtEP;

/// 默认标注字体, 相对工作目录; 缺失时使用内置字体
pub const DEFAULT_FONT: &str = "assets/font/DejaVuSans.ttf";

/// 命令行参数
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "单目标跟踪 - 检测 → 跟踪 → 丢失找回", long_about = None)]
pub struct Args {
    /// 视频源: 视频文件 / RTSP地址 / 图片目录
    #[arg(short, long)]
    pub source: Option<String>,

    /// 跟踪的目标类别
    #[arg(short, long)]
    pub target: Option<String>,

    /// ONNX检测模型路径
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// 模型不存在时的下载地址
    #[arg(long)]
    pub model_url: Option<String>,

    /// 目标置信度阈值 (严格大于)
    #[arg(long)]
    pub conf: Option<f32>,

    /// 跟踪器: ncc 或 ssd
    #[arg(long)]
    pub tracker: Option<String>,

    /// 多个候选时的选择策略: first 或 highest
    #[arg(long)]
    pub policy: Option<String>,

    /// 标注帧输出目录 (默认 runs/track/<时间>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 不保存标注帧
    #[arg(long)]
    pub no_render: bool,

    /// 标注字体 (TTF/OTF)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 最多处理的帧数
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// 退出键 (在终端输入后回车)
    #[arg(long)]
    pub exit_key: Option<String>,

    /// 每帧结果写入的 JSON Lines 文件
    #[arg(long)]
    pub track_log: Option<PathBuf>,

    /// 执行设备: cpu / cuda / trt
    #[arg(long)]
    pub ep: Option<String>,

    /// GPU 设备号
    #[arg(long)]
    pub device_id: Option<i32>,

    /// 模型输入尺寸
    #[arg(long)]
    pub imgsz: Option<u32>,

    /// JSON 配置文件, 不存在时写入默认配置
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// 完整运行配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    // === 输入 / 目标 ===
    pub source: String,
    pub target: String,
    pub conf_threshold: f32, // 目标置信度阈值
    pub policy: String,      // first / highest

    // === 检测模型 ===
    pub model: PathBuf,
    pub model_url: Option<String>,
    pub imgsz: u32,
    pub prefilter_conf: f32, // 检测器内部预过滤阈值
    pub iou: f32,            // NMS IOU阈值
    pub ep: String,
    pub device_id: i32,

    // === 跟踪器 ===
    pub tracker: String,
    pub template: TemplateConfig,

    // === 输出 / 控制 ===
    pub output: Option<PathBuf>,
    pub render: bool,
    pub font: PathBuf,
    pub track_log: Option<PathBuf>,
    pub max_frames: Option<u64>,
    pub exit_key: char,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            target: DEFAULT_TARGET_CLASS.to_string(),
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            policy: "first".to_string(),

            model: PathBuf::from("models/yolov8n.onnx"),
            model_url: None,
            imgsz: 640,
            prefilter_conf: 0.25,
            iou: 0.7,
            ep: "cpu".to_string(),
            device_id: 0,

            tracker: "ncc".to_string(),
            template: TemplateConfig::default(),

            output: None,
            render: true,
            font: PathBuf::from(DEFAULT_FONT),
            track_log: None,
            max_frames: None,
            exit_key: 'x',
        }
    }
}

impl TrackConfig {
    /// 从JSON文件加载配置; 解析失败用默认值, 文件不存在时写入默认配置
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    /// 配置文件 (如有) + 命令行覆盖 + 校验
    pub fn from_args(args: &Args) -> Result<Self, TrackError> {
        let mut config = match &args.config {
            Some(path) => Self::load(path),
            None => Self::default(),
        };
        config.apply(args)?;
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, args: &Args) -> Result<(), TrackError> {
        if let Some(v) = &args.source {
            self.source = v.clone();
        }
        if let Some(v) = &args.target {
            self.target = v.clone();
        }
        if let Some(v) = &args.model {
            self.model = v.clone();
        }
        if let Some(v) = &args.model_url {
            self.model_url = Some(v.clone());
        }
        if let Some(v) = args.conf {
            self.conf_threshold = v;
        }
        if let Some(v) = &args.tracker {
            self.tracker = v.clone();
        }
        if let Some(v) = &args.policy {
            self.policy = v.clone();
        }
        if let Some(v) = &args.output {
            self.output = Some(v.clone());
        }
        if args.no_render {
            self.render = false;
        }
        if let Some(v) = &args.font {
            self.font = v.clone();
        }
        if let Some(v) = args.max_frames {
            self.max_frames = Some(v);
        }
        if let Some(v) = &args.exit_key {
            self.exit_key = parse_exit_key(v)?;
        }
        if let Some(v) = &args.track_log {
            self.track_log = Some(v.clone());
        }
        if let Some(v) = &args.ep {
            self.ep = v.clone();
        }
        if let Some(v) = args.device_id {
            self.device_id = v;
        }
        if let Some(v) = args.imgsz {
            self.imgsz = v;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), TrackError> {
        if self.source.trim().is_empty() {
            return Err(TrackError::Config("未指定视频源 (--source)".into()));
        }
        if self.target.trim().is_empty() {
            return Err(TrackError::Config("目标类别不能为空".into()));
        }
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(TrackError::Config(format!(
                "置信度阈值必须在 [0, 1] 内: {}",
                self.conf_threshold
            )));
        }
        if self.imgsz == 0 || self.imgsz % 32 != 0 {
            return Err(TrackError::Config(format!(
                "模型输入尺寸必须是32的正整数倍: {}",
                self.imgsz
            )));
        }
        if self.max_frames == Some(0) {
            return Err(TrackError::Config("--max-frames 必须大于0".into()));
        }
        self.selection_policy()?;
        self.tracker_kind()?;
        self.ort_ep()?;
        Ok(())
    }

    pub fn selection_policy(&self) -> Result<SelectionPolicy, TrackError> {
        SelectionPolicy::from_name(&self.policy).ok_or_else(|| {
            TrackError::Config(format!(
                "未知的选择策略: {} (可选: first, highest)",
                self.policy
            ))
        })
    }

    pub fn tracker_kind(&self) -> Result<TrackerKind, TrackError> {
        TrackerKind::from_name(&self.tracker).map_err(|e| TrackError::Config(e.to_string()))
    }

    pub fn ort_ep(&self) -> Result<OrtEP, TrackError> {
        OrtEP::from_name(&self.ep, self.device_id).map_err(|e| TrackError::Config(e.to_string()))
    }

    /// 检测器参数; 预过滤阈值不超过目标阈值
    pub fn detector_config(&self, model: PathBuf) -> Result<YOLOv8Config, TrackError> {
        Ok(YOLOv8Config {
            model,
            imgsz: self.imgsz,
            conf: self.prefilter_conf.min(self.conf_threshold),
            iou: self.iou,
            ep: self.ort_ep()?,
            ..Default::default()
        })
    }

    /// 标注帧输出目录
    pub fn output_dir(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            PathBuf::from("runs")
                .join("track")
                .join(crate::gen_time_string("-"))
        })
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️ 当前配置:");
        info!("  视频源: {}", self.source);
        info!(
            "  目标: {} (阈值 > {:.2}, 策略 {})",
            self.target, self.conf_threshold, self.policy
        );
        info!(
            "  模型: {} ({}x{}, EP {})",
            self.model.display(),
            self.imgsz,
            self.imgsz,
            self.ep
        );
        info!(
            "  跟踪器: {} (最低相关 {:.2}, 学习率 {:.2})",
            self.tracker, self.template.min_confidence, self.template.learning_rate
        );
        info!("  退出键: '{}'", self.exit_key);
    }
}

fn parse_exit_key(raw: &str) -> Result<char, TrackError> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_whitespace() => Ok(c),
        _ => Err(TrackError::Config(format!("退出键必须是单个字符: {:?}", raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(source: &str) -> Args {
        Args {
            source: Some(source.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = TrackConfig::from_args(&args("video.mp4")).unwrap();
        assert_eq!(config.target, "person");
        assert_eq!(config.conf_threshold, 0.5);
        assert_eq!(config.exit_key, 'x');
        assert_eq!(config.selection_policy().unwrap(), SelectionPolicy::FirstMatch);
        assert_eq!(config.tracker_kind().unwrap(), TrackerKind::Ncc);
        assert_eq!(config.ort_ep().unwrap(), OrtEP::CPU);
        assert!(config.render);
    }

    #[test]
    fn test_missing_source_is_config_error() {
        let err = TrackConfig::from_args(&Args::default()).unwrap_err();
        assert!(matches!(err, TrackError::Config(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_cli_overrides() {
        let a = Args {
            target: Some("car".into()),
            conf: Some(0.7),
            tracker: Some("ssd".into()),
            policy: Some("highest".into()),
            exit_key: Some("q".into()),
            no_render: true,
            ..args("clip.mp4")
        };
        let config = TrackConfig::from_args(&a).unwrap();
        assert_eq!(config.target, "car");
        assert_eq!(config.conf_threshold, 0.7);
        assert_eq!(config.tracker_kind().unwrap(), TrackerKind::Ssd);
        assert_eq!(config.selection_policy().unwrap(), SelectionPolicy::HighestScore);
        assert_eq!(config.exit_key, 'q');
        assert!(!config.render);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for a in [
            Args { conf: Some(1.5), ..args("a.mp4") },
            Args { tracker: Some("csrt".into()), ..args("a.mp4") },
            Args { policy: Some("best".into()), ..args("a.mp4") },
            Args { exit_key: Some("esc".into()), ..args("a.mp4") },
            Args { imgsz: Some(100), ..args("a.mp4") },
            Args { max_frames: Some(0), ..args("a.mp4") },
        ] {
            assert!(TrackConfig::from_args(&a).is_err(), "{:?}", a);
        }
    }

    #[test]
    fn test_low_conf_lowers_detector_prefilter() {
        let config = TrackConfig::from_args(&Args {
            conf: Some(0.1),
            ..args("a.mp4")
        })
        .unwrap();
        let detector = config.detector_config(PathBuf::from("m.onnx")).unwrap();
        assert_eq!(detector.conf, 0.1);
        assert_eq!(detector.iou, 0.7);
        assert_eq!(detector.model, PathBuf::from("m.onnx"));

        // 默认目标阈值 0.5 时保持预过滤 0.25
        let config = TrackConfig::from_args(&args("a.mp4")).unwrap();
        let detector = config.detector_config(PathBuf::from("m.onnx")).unwrap();
        assert_eq!(detector.conf, 0.25);
    }

    #[test]
    fn test_file_then_cli() {
        let path = std::env::temp_dir().join("yolov8_track_config_test.json");
        let json = r#"{ "source": "from_file.mp4", "target": "dog", "conf_threshold": 0.6 }"#;
        fs::write(&path, json).unwrap();

        let a = Args {
            config: Some(path.clone()),
            conf: Some(0.8),
            ..Default::default()
        };
        let config = TrackConfig::from_args(&a).unwrap();
        assert_eq!(config.source, "from_file.mp4");
        assert_eq!(config.target, "dog");
        assert_eq!(config.conf_threshold, 0.8);
        // 文件中没有的字段取默认值
        assert_eq!(config.tracker, "ncc");
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let path = std::env::temp_dir().join("yolov8_track_config_missing.json");
        fs::remove_file(&path).ok();
        let config = TrackConfig::load(&path);
        assert_eq!(config.target, "person");
        assert!(path.exists());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("yolov8_track_config_invalid.json");
        fs::write(&path, "{ not json").unwrap();
        let config = TrackConfig::load(&path);
        assert_eq!(config.conf_threshold, 0.5);
        fs::remove_file(&path).ok();
    }
}
