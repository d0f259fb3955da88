/// FFmpeg视频帧源
/// Video file / RTSP / camera source backed by a decode thread
use super::decode_filter::DecodeFilter;
use super::{Frame, FrameSource};
use anyhow::{anyhow, Result};
use crossbeam_channel::Receiver;
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::core::scheduler::ffmpeg_scheduler::{FfmpegScheduler, Running};
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use log::info;

/// 视频帧源 (解码线程 → bounded(1) → 跟踪主循环)
pub struct VideoSource {
    url: String,
    rx: Option<Receiver<RgbImage>>,
    scheduler: Option<FfmpegScheduler<Running>>,
    next_index: u64,
}

impl VideoSource {
    /// 打开视频源并启动解码; 无法打开时返回错误
    pub fn open(url: &str) -> Result<Self> {
        info!("🎬 打开视频源: {}", url);

        // 容量为1: 主循环不取帧时解码线程阻塞,不会堆积
        let (tx, rx) = crossbeam_channel::bounded::<RgbImage>(1);
        let filter = DecodeFilter::new(tx);

        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("decode", Box::new(filter));
        let out = create_null_output().add_frame_pipeline(pipe);

        let mut input = Input::new(url);
        if url.starts_with("rtsp://") {
            input = input.set_input_opts(
                [("rtsp_transport", "tcp"), ("rtsp_flags", "prefer_tcp")].into(),
            );
        }

        let ctx = FfmpegContext::builder()
            .input(input)
            .filter_descs(["format=yuv420p"].into())
            .output(out)
            .build()
            .map_err(|e| anyhow!("构建解码上下文失败: {}", e))?;

        let scheduler = ctx.start().map_err(|e| anyhow!("启动解码失败: {}", e))?;
        info!("✅ 解码已启动");

        Ok(Self {
            url: url.to_string(),
            rx: Some(rx),
            scheduler: Some(scheduler),
            next_index: 0,
        })
    }
}

impl FrameSource for VideoSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(rx) = &self.rx else {
            return Ok(None);
        };
        // 发送端全部关闭 = 解码结束
        match rx.recv() {
            Ok(image) => {
                let frame = Frame::new(self.next_index, image);
                self.next_index += 1;
                Ok(Some(frame))
            }
            Err(_) => Ok(None),
        }
    }

    fn release(&mut self) {
        // 先关闭接收端,阻塞在 send 上的解码线程会立刻返回错误退出
        self.rx = None;
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.abort();
            info!("🛑 解码已停止: {}", self.url);
        }
    }

    fn describe(&self) -> String {
        format!("视频源 {}", self.url)
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        self.release();
    }
}
