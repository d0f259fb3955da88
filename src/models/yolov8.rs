// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型
// 包含: 预处理 (拉伸缩放 + NCHW归一化)、推理、后处理 (解码 + 按类别NMS)

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use fast_image_resize as fr;
use log::debug;
use ndarray::{Array4, ArrayView2};
use ort::value::Tensor;

use super::{non_max_suppression, Proposal, COCO_NAMES};
use crate::detection::{BBox, Detection, Detector};
use crate::input::Frame;
use crate::{OrtBackend, OrtEP};

/// YOLOv8 检测参数
#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub model: PathBuf,
    pub imgsz: u32,
    pub conf: f32, // 候选预过滤阈值, 低于目标阈值
    pub iou: f32,
    pub max_det: usize,
    pub ep: OrtEP,
}

impl Default for YOLOv8Config {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/yolov8n.onnx"),
            imgsz: 640,
            conf: 0.25,
            iou: 0.7,
            max_det: 300,
            ep: OrtEP::CPU,
        }
    }
}

/// YOLOv8 检测器
pub struct YOLOv8 {
    engine: OrtBackend,
    config: YOLOv8Config,
    names: Vec<String>,
    resizer: fr::Resizer,
}

impl YOLOv8 {
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        let engine = OrtBackend::build(&config.model, config.ep)?;
        let names = match engine.names() {
            Some(names) if !names.is_empty() => names.to_vec(),
            _ => COCO_NAMES.iter().map(|s| s.to_string()).collect(),
        };
        Ok(Self {
            engine,
            config,
            names,
            resizer: fr::Resizer::new(),
        })
    }

    /// 模型的类别名 (元数据缺失时为 COCO 80 类)
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_class(&self, label: &str) -> bool {
        self.names.iter().any(|n| n == label)
    }

    /// 拉伸缩放到 imgsz×imgsz, 输出 [1, 3, H, W] 且归一化到 [0, 1]
    fn preprocess(&mut self, frame: &Frame) -> Result<Array4<f32>> {
        let size = self.config.imgsz;
        let src = fr::images::ImageRef::new(
            frame.width(),
            frame.height(),
            frame.image().as_raw(),
            fr::PixelType::U8x3,
        )
        .context("创建缩放源图像失败")?;
        let mut dst = fr::images::Image::new(size, size, fr::PixelType::U8x3);
        self.resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .context("图像缩放失败")?;

        let s = size as usize;
        let raw = dst.buffer();
        let mut xs = Array4::<f32>::zeros((1, 3, s, s));
        for (idx, px) in raw.chunks_exact(3).enumerate() {
            let (y, x) = (idx / s, idx % s);
            xs[[0, 0, y, x]] = px[0] as f32 / 255.0;
            xs[[0, 1, y, x]] = px[1] as f32 / 255.0;
            xs[[0, 2, y, x]] = px[2] as f32 / 255.0;
        }
        Ok(xs)
    }
}

impl Detector for YOLOv8 {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let xs = self.preprocess(frame)?;
        let input = Tensor::from_array(xs)
            .context("创建输入张量失败")?
            .into_dyn();
        let (dims, data) = self.engine.run(input)?;

        // 输出: [1, 4 + nc, N]
        if dims.len() != 3 || dims[0] != 1 || dims[1] <= 4 {
            return Err(anyhow!("不支持的输出形状: {:?}", dims));
        }
        let preds = ArrayView2::from_shape((dims[1], dims[2]), &data)
            .context("输出张量形状不匹配")?;

        let scale = (
            frame.width() as f32 / self.config.imgsz as f32,
            frame.height() as f32 / self.config.imgsz as f32,
        );
        let mut proposals = decode_predictions(preds, self.config.conf, scale, frame);
        non_max_suppression(&mut proposals, self.config.iou);
        proposals.truncate(self.config.max_det);

        let detections: Vec<Detection> = proposals
            .iter()
            .filter_map(|p| {
                let bbox = BBox::from_corners(p.x1, p.y1, p.x2, p.y2)?;
                let label = self
                    .names
                    .get(p.class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class{}", p.class_id));
                Some(Detection::new(bbox, label, p.confidence))
            })
            .collect();
        debug!("YOLOv8 帧#{}: {}个检测", frame.index(), detections.len());
        Ok(detections)
    }

    fn name(&self) -> &str {
        "YOLOv8"
    }
}

/// 解码 [4 + nc, N] 预测: 每列取最高类别分数, 坐标还原到原图并裁到画面内
fn decode_predictions(
    preds: ArrayView2<f32>,
    conf: f32,
    (sx, sy): (f32, f32),
    frame: &Frame,
) -> Vec<Proposal> {
    let (w0, h0) = (frame.width() as f32, frame.height() as f32);
    let mut proposals = Vec::new();
    for pred in preds.columns() {
        let Some((class_id, &confidence)) = pred
            .iter()
            .skip(4)
            .enumerate()
            .reduce(|best, x| if x.1 > best.1 { x } else { best })
        else {
            continue;
        };
        if confidence < conf {
            continue;
        }
        let (cx, cy, w, h) = (pred[0] * sx, pred[1] * sy, pred[2] * sx, pred[3] * sy);
        proposals.push(Proposal {
            x1: (cx - w / 2.0).clamp(0.0, w0),
            y1: (cy - h / 2.0).clamp(0.0, h0),
            x2: (cx + w / 2.0).clamp(0.0, w0),
            y2: (cy + h / 2.0).clamp(0.0, h0),
            confidence,
            class_id,
        });
    }
    proposals
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use ndarray::Array2;

    #[test]
    fn test_decode_predictions() {
        // 3类, 3个锚点
        let mut preds = Array2::<f32>::zeros((7, 3));
        // 锚点0: 类别0 0.9, 中心(100,100) 尺寸 40x80
        preds.column_mut(0).assign(&ndarray::arr1(&[100., 100., 40., 80., 0.9, 0.1, 0.0]));
        // 锚点1: 最高分 0.2 < conf, 丢弃
        preds.column_mut(1).assign(&ndarray::arr1(&[50., 50., 10., 10., 0.2, 0.1, 0.0]));
        // 锚点2: 类别2, 超出画面右侧
        preds.column_mut(2).assign(&ndarray::arr1(&[630., 10., 40., 40., 0.0, 0.1, 0.7]));

        // 画面 1280x640 → 缩放 (2.0, 1.0)
        let frame = Frame::new(0, RgbImage::new(1280, 640));
        let out = decode_predictions(preds.view(), 0.25, (2.0, 1.0), &frame);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].class_id, 0);
        assert_eq!((out[0].x1, out[0].y1, out[0].x2, out[0].y2), (160., 60., 240., 140.));
        assert_eq!(out[1].class_id, 2);
        assert_eq!(out[1].x2, 1280.0);
        assert_eq!(out[1].y1, 0.0);
    }

    #[test]
    fn test_low_conf_keeps_weak_candidates() {
        let mut preds = Array2::<f32>::zeros((6, 2));
        preds.column_mut(0).assign(&ndarray::arr1(&[100., 100., 40., 80., 0.2, 0.0]));
        preds.column_mut(1).assign(&ndarray::arr1(&[50., 50., 10., 10., 0.05, 0.0]));
        let frame = Frame::new(0, RgbImage::new(640, 640));

        let out = decode_predictions(preds.view(), 0.1, (1.0, 1.0), &frame);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].confidence, 0.2);
        // 默认预过滤会丢掉它
        assert!(decode_predictions(preds.view(), 0.25, (1.0, 1.0), &frame).is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = YOLOv8Config::default();
        assert_eq!(config.imgsz, 640);
        assert_eq!(config.iou, 0.7);
        assert!(config.conf < crate::detection::DEFAULT_CONF_THRESHOLD);
    }
}
