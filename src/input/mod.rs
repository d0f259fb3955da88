/// 视频输入系统 (Video Input System)
///
/// - VideoSource:   视频文件 / RTSP / 摄像头 (FFmpeg解码,独立解码线程)
/// - ImageSequence: 图片目录 (按文件名排序逐帧读取)
/// - DecodeFilter:  FFmpeg帧过滤器, YUV420P → RGB
pub mod decode_filter;
pub mod decoder;
pub mod sequence;

pub use decode_filter::DecodeFilter;
pub use decoder::VideoSource;
pub use sequence::ImageSequence;

use std::path::Path;

use anyhow::Result;
use image::RgbImage;

use crate::error::TrackError;

/// 一帧RGB图像及其在流中的序号 (从0开始)
#[derive(Clone, Debug)]
pub struct Frame {
    index: u64,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 帧源统一接口
///
/// 跟踪循环按需逐帧拉取,没有内部队列需要消费。
pub trait FrameSource {
    /// Ok(None) 表示流结束
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// 释放底层资源; 之后 read_frame 只返回 None
    fn release(&mut self);

    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        (**self).read_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// 根据输入标识打开帧源: 目录 → 图片序列, 其他 → FFmpeg
pub fn open_source(source: &str) -> Result<Box<dyn FrameSource>, TrackError> {
    let path = Path::new(source);
    let opened: Result<Box<dyn FrameSource>> = if path.is_dir() {
        ImageSequence::open(path).map(|s| Box::new(s) as Box<dyn FrameSource>)
    } else {
        VideoSource::open(source).map(|s| Box::new(s) as Box<dyn FrameSource>)
    };
    opened.map_err(|cause| TrackError::SourceUnavailable {
        source_id: source.to_string(),
        cause,
    })
}
