/// 检测模型实现
///
/// ## YOLOv8
/// ONNX 导出的 YOLOv8 检测模型 (输出 `[1, 4 + nc, N]`), 实现 `Detector` trait
/// - 预处理: 拉伸缩放 + NCHW 归一化
/// - 推理:   `OrtBackend`
/// - 后处理: 解码 + 按类别 NMS, 结果按置信度降序
///
/// ## 模型获取
/// 本地不存在且给出下载地址时, 下载到用户缓存目录 (`hub.rs`)
///
/// ```no_run
/// use yolov8_track::models::{YOLOv8, YOLOv8Config};
///
/// let _model = YOLOv8::new(YOLOv8Config::default())?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub mod hub;
pub mod yolov8;

pub use hub::ensure_model;
pub use yolov8::{YOLOv8, YOLOv8Config};

/// NMS 之前的候选框 (原图坐标, 角点形式)
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl Proposal {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &Proposal) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// 按类别的贪心NMS, 保留结果按置信度降序
pub fn non_max_suppression(xs: &mut Vec<Proposal>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_id == xs[index].class_id
                && xs[prev_index].iou(&xs[index]) > iou_threshold
            {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// COCO 80 类别名 (模型元数据缺失时使用)
pub const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];
