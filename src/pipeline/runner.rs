/// 主循环 (Main Loop)
/// 职责: 拉帧 → 状态机 → 渲染 → 轨迹日志; 每秒统计一次处理FPS
use std::io::Write;
use std::time::{Duration, Instant};

use log::{info, warn};

use super::{FrameOutcome, OutcomeTag, StopSignal, TrackLog, TrackingLoop};
use crate::detection::Detector;
use crate::error::TrackError;
use crate::input::{Frame, FrameSource};
use crate::renderer::Renderer;
use crate::tracker::TrackerFactory;

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub tracking: u64,
    pub reacquired: u64,
    pub lost: u64,
    /// 因停止信号提前结束
    pub stopped: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    fn record(&mut self, outcome: &FrameOutcome) {
        self.frames += 1;
        match outcome.tag {
            OutcomeTag::Acquired | OutcomeTag::Tracking => self.tracking += 1,
            OutcomeTag::Reacquired => self.reacquired += 1,
            OutcomeTag::Lost => self.lost += 1,
        }
    }
}

/// 处理FPS统计
struct FpsMeter {
    count: u64,
    last: Instant,
}

impl FpsMeter {
    fn new() -> Self {
        Self {
            count: 0,
            last: Instant::now(),
        }
    }

    fn tick(&mut self) -> Option<f64> {
        self.count += 1;
        let elapsed = self.last.elapsed();
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        let fps = self.count as f64 / elapsed.as_secs_f64();
        self.count = 0;
        self.last = Instant::now();
        Some(fps)
    }
}

/// 运行到流结束或收到停止信号
///
/// 返回前总会释放帧源。只有第一帧相关的错误会返回 Err。
pub fn run<S, D, F, R, W>(
    source: &mut S,
    tracking: &mut TrackingLoop<D, F>,
    renderer: &mut R,
    stop: &StopSignal,
    track_log: Option<&mut TrackLog<W>>,
    max_frames: Option<u64>,
) -> Result<RunSummary, TrackError>
where
    S: FrameSource + ?Sized,
    D: Detector,
    F: TrackerFactory,
    R: Renderer + ?Sized,
    W: Write,
{
    info!("📺 输入: {}", source.describe());
    let result = run_frames(source, tracking, renderer, stop, track_log, max_frames);
    source.release();
    if let Err(e) = renderer.finish() {
        warn!("⚠️ 渲染器收尾失败: {:#}", e);
    }

    if let Ok(summary) = &result {
        info!(
            "✅ 运行结束: {}帧 | 跟踪 {} | 重新锁定 {} | 丢失 {} | 用时 {:.1}s{}",
            summary.frames,
            summary.tracking,
            summary.reacquired,
            summary.lost,
            summary.elapsed.as_secs_f64(),
            if summary.stopped { " (用户停止)" } else { "" }
        );
    }
    result
}

fn run_frames<S, D, F, R, W>(
    source: &mut S,
    tracking: &mut TrackingLoop<D, F>,
    renderer: &mut R,
    stop: &StopSignal,
    mut track_log: Option<&mut TrackLog<W>>,
    max_frames: Option<u64>,
) -> Result<RunSummary, TrackError>
where
    S: FrameSource + ?Sized,
    D: Detector,
    F: TrackerFactory,
    R: Renderer + ?Sized,
    W: Write,
{
    let started = Instant::now();
    let mut summary = RunSummary::default();
    let mut fps = FpsMeter::new();

    let first = match source.read_frame() {
        Ok(Some(frame)) => frame,
        Ok(None) => return Err(TrackError::FirstFrameUnreadable("视频流为空".into())),
        Err(e) => return Err(TrackError::FirstFrameUnreadable(format!("{:#}", e))),
    };
    info!("📐 分辨率: {}x{}", first.width(), first.height());

    let outcome = tracking.start(&first)?;
    emit(&first, &outcome, renderer, track_log.as_deref_mut(), &mut summary);

    loop {
        if max_frames.is_some_and(|max| summary.frames >= max) {
            info!("🛑 已达到最大帧数 {}", summary.frames);
            stop.stop();
        }
        if stop.is_stopped() {
            summary.stopped = true;
            break;
        }

        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("📺 视频流结束");
                break;
            }
            Err(e) => {
                warn!("⚠️ 读取帧失败, 结束运行: {:#}", e);
                break;
            }
        };

        let outcome = tracking.step(&frame);
        emit(&frame, &outcome, renderer, track_log.as_deref_mut(), &mut summary);

        if let Some(fps) = fps.tick() {
            info!(
                "📊 处理FPS: {:.1} | 帧#{} | 状态: {:?}",
                fps,
                frame.index(),
                tracking.state()
            );
        }
    }

    if let Some(log) = track_log {
        if let Err(e) = log.flush() {
            warn!("⚠️ {:#}", e);
        }
    }
    summary.elapsed = started.elapsed();
    Ok(summary)
}

/// 单帧结果的下游: 渲染 + 轨迹日志 (出错只告警)
fn emit<R, W>(
    frame: &Frame,
    outcome: &FrameOutcome,
    renderer: &mut R,
    track_log: Option<&mut TrackLog<W>>,
    summary: &mut RunSummary,
) where
    R: Renderer + ?Sized,
    W: Write,
{
    summary.record(outcome);
    if let Err(e) = renderer.render(frame, outcome) {
        warn!("⚠️ 帧#{} 渲染失败: {:#}", frame.index(), e);
    }
    if let Some(log) = track_log {
        if let Err(e) = log.write(outcome) {
            warn!("⚠️ 帧#{} {:#}", frame.index(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::detector::tests::{blank, det, ScriptedDetector};
    use crate::detection::TargetAcquirer;
    use crate::detection::BBox;
    use crate::renderer::NullRenderer;
    use crate::tracker::tests::scripted_factory;
    use anyhow::{anyhow, Result};

    /// 预设帧序列的帧源, None 表示该位置读取出错
    struct FakeSource {
        frames: Vec<Option<Frame>>,
        pos: usize,
        released: bool,
    }

    impl FakeSource {
        fn blank(n: u64) -> Self {
            Self::from((0..n).map(|i| Some(blank(i))).collect())
        }

        fn from(frames: Vec<Option<Frame>>) -> Self {
            Self {
                frames,
                pos: 0,
                released: false,
            }
        }
    }

    impl FrameSource for FakeSource {
        fn read_frame(&mut self) -> Result<Option<Frame>> {
            if self.released || self.pos >= self.frames.len() {
                return Ok(None);
            }
            self.pos += 1;
            match &self.frames[self.pos - 1] {
                Some(frame) => Ok(Some(frame.clone())),
                None => Err(anyhow!("解码失败")),
            }
        }

        fn release(&mut self) {
            self.released = true;
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    fn bx(x: i32, y: i32, w: i32, h: i32) -> BBox {
        BBox::new(x, y, w, h).unwrap()
    }

    fn person() -> Vec<crate::detection::Detection> {
        vec![det("person", 0.9, 10, 10, 50, 100)]
    }

    fn no_log() -> Option<&'static mut TrackLog<Vec<u8>>> {
        None
    }

    #[test]
    fn test_runs_to_end_of_stream() {
        let detector = ScriptedDetector::new(vec![person(), vec![], vec![], person()]);
        let (factory, _log) = scripted_factory(vec![Some(bx(11, 11, 50, 100)), None]);
        let mut lp = TrackingLoop::new(detector, factory, TargetAcquirer::default());
        let mut source = FakeSource::blank(5);
        let mut renderer = NullRenderer::default();
        let mut log = TrackLog::from_writer(Vec::new());

        let summary = run(
            &mut source,
            &mut lp,
            &mut renderer,
            &StopSignal::new(),
            Some(&mut log),
            None,
        )
        .unwrap();

        // 0 acquired, 1 tracking, 2 lost, 3 reacquired, 4 lost (新跟踪器无结果且检测不到)
        assert_eq!(summary.frames, 5);
        assert_eq!(summary.tracking, 2);
        assert_eq!(summary.reacquired, 1);
        assert_eq!(summary.lost, 2);
        assert!(!summary.stopped);
        assert!(source.released);
        assert_eq!(renderer.frames, 5);
        assert_eq!(log.lines(), 5);
    }

    #[test]
    fn test_empty_stream_is_first_frame_error() {
        let detector = ScriptedDetector::new(vec![]);
        let (factory, _log) = scripted_factory(vec![]);
        let mut lp = TrackingLoop::new(detector, factory, TargetAcquirer::default());
        let mut source = FakeSource::blank(0);

        let err = run(
            &mut source,
            &mut lp,
            &mut NullRenderer::default(),
            &StopSignal::new(),
            no_log(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(source.released);
    }

    #[test]
    fn test_unreadable_first_frame() {
        let detector = ScriptedDetector::new(vec![]);
        let (factory, _log) = scripted_factory(vec![]);
        let mut lp = TrackingLoop::new(detector, factory, TargetAcquirer::default());
        let mut source = FakeSource::from(vec![None]);

        let err = run(
            &mut source,
            &mut lp,
            &mut NullRenderer::default(),
            &StopSignal::new(),
            no_log(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TrackError::FirstFrameUnreadable(_)));
    }

    #[test]
    fn test_target_not_found_processes_nothing_else() {
        let detector = ScriptedDetector::new(vec![vec![det("car", 0.99, 0, 0, 9, 9)], person()]);
        let (factory, _log) = scripted_factory(vec![]);
        let mut lp = TrackingLoop::new(detector, factory, TargetAcquirer::default());
        let mut source = FakeSource::blank(3);
        let mut renderer = NullRenderer::default();

        let err = run(
            &mut source,
            &mut lp,
            &mut renderer,
            &StopSignal::new(),
            no_log(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert_eq!(renderer.frames, 0);
        assert_eq!(source.pos, 1);
        assert_eq!(lp.detector().calls, vec![0]);
    }

    #[test]
    fn test_stop_signal_and_max_frames() {
        let detector = ScriptedDetector::new(vec![person()]);
        let (factory, _log) = scripted_factory(vec![Some(bx(10, 10, 50, 100)); 10]);
        let mut lp = TrackingLoop::new(detector, factory, TargetAcquirer::default());
        let mut source = FakeSource::blank(10);
        let stop = StopSignal::new();

        let summary = run(
            &mut source,
            &mut lp,
            &mut NullRenderer::default(),
            &stop,
            no_log(),
            Some(3),
        )
        .unwrap();
        assert_eq!(summary.frames, 3);
        assert!(summary.stopped);
        assert!(stop.is_stopped());
        assert_eq!(source.pos, 3);
    }

    #[test]
    fn test_stopped_before_second_frame() {
        let detector = ScriptedDetector::new(vec![person()]);
        let (factory, _log) = scripted_factory(vec![]);
        let mut lp = TrackingLoop::new(detector, factory, TargetAcquirer::default());
        let mut source = FakeSource::blank(4);
        let stop = StopSignal::new();
        stop.stop();

        let summary = run(
            &mut source,
            &mut lp,
            &mut NullRenderer::default(),
            &stop,
            no_log(),
            None,
        )
        .unwrap();
        assert_eq!(summary.frames, 1);
        assert!(summary.stopped);
    }

    #[test]
    fn test_midstream_read_error_ends_run() {
        let detector = ScriptedDetector::new(vec![person()]);
        let (factory, _log) = scripted_factory(vec![Some(bx(10, 10, 50, 100))]);
        let mut lp = TrackingLoop::new(detector, factory, TargetAcquirer::default());
        let mut source = FakeSource::from(vec![Some(blank(0)), Some(blank(1)), None, Some(blank(3))]);

        let summary = run(
            &mut source,
            &mut lp,
            &mut NullRenderer::default(),
            &StopSignal::new(),
            no_log(),
            None,
        )
        .unwrap();
        assert_eq!(summary.frames, 2);
        assert!(source.released);
    }
}
