/// 单目标跟踪 (Single-Target Tracker)
///
/// 第一帧检测目标 → 模板跟踪器逐帧跟踪 → 跟丢时重新检测找回
///
/// 主程序入口 - 直接运行: cargo run --bin track --release -- --source video.mp4
use clap::Parser;
use log::{error, info, warn};
use mimalloc::MiMalloc;
use yolov8_track::models::ensure_model;
use yolov8_track::pipeline::{self, TrackLog};
use yolov8_track::renderer::resolve_font;
use yolov8_track::*;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(summary) => {
            if summary.stopped {
                info!("👋 已停止");
            }
        }
        Err(e) => {
            error!("❌ {}", e);
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                error!("   原因: {}", cause);
                source = cause.source();
            }
            std::process::exit(e.exit_code());
        }
    }
}

fn run(args: &Args) -> Result<RunSummary, TrackError> {
    let config = TrackConfig::from_args(args)?;
    config.print_summary();

    // 检测模型 (启动阶段构造一次, 由主循环持有)
    let model = ensure_model(&config.model, config.model_url.as_deref())
        .map_err(|e| TrackError::Config(format!("{:#}", e)))?;
    let detector = YOLOv8::new(config.detector_config(model)?)
        .map_err(|e| TrackError::Config(format!("模型加载失败: {:#}", e)))?;
    if !detector.has_class(&config.target) {
        warn!(
            "⚠️ 模型的 {} 个类别中没有 '{}', 目标将无法锁定",
            detector.names().len(),
            config.target
        );
    }

    let factory = TemplateTrackerFactory::new(config.tracker_kind()?, config.template.clone());
    let acquirer = TargetAcquirer::new(config.target.clone(), config.conf_threshold)
        .with_policy(config.selection_policy()?);
    let mut tracking = TrackingLoop::new(detector, factory, acquirer);

    let mut source = open_source(&config.source)?;

    let mut renderer: Box<dyn Renderer> = if config.render {
        let font = resolve_font(&config.font);
        let renderer =
            FileRenderer::new(config.output_dir(), font)?.with_label(config.target.clone());
        info!("💾 标注帧输出: {}", renderer.dir().display());
        Box::new(renderer)
    } else {
        Box::new(NullRenderer::default())
    };

    let mut track_log = match &config.track_log {
        Some(path) => Some(TrackLog::create(path)?),
        None => None,
    };

    let stop = StopSignal::new();
    stop.watch_stdin(config.exit_key);
    info!("⌨️ 输入 '{}' 并回车退出", config.exit_key);

    pipeline::run(
        &mut source,
        &mut tracking,
        &mut renderer,
        &stop,
        track_log.as_mut(),
        config.max_frames,
    )
}
