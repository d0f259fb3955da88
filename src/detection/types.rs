/// 跟踪系统数据结构定义
/// Data structures for the single-target tracking system
use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// 默认置信度阈值 (严格大于才算候选)
pub const DEFAULT_CONF_THRESHOLD: f32 = 0.5;

/// 默认跟踪类别
pub const DEFAULT_TARGET_CLASS: &str = "person";

// ========== 数据结构 ==========

/// 像素坐标系下的轴对齐边界框 (x, y, w, h)
///
/// 宽高恒为正; 坐标可以超出画面范围,不做裁剪。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BBox {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

impl BBox {
    /// 宽或高不为正时返回 None
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Option<Self> {
        if w > 0 && h > 0 {
            Some(Self { x, y, w, h })
        } else {
            None
        }
    }

    /// 由检测器输出的浮点角点构造,截断取整
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Self> {
        if !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite()) {
            return None;
        }
        Self::new(x1 as i32, y1 as i32, (x2 - x1) as i32, (y2 - y1) as i32)
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn width(&self) -> i32 {
        self.w
    }

    pub fn height(&self) -> i32 {
        self.h
    }

    pub fn xmax(&self) -> i32 {
        self.x + self.w
    }

    pub fn ymax(&self) -> i32 {
        self.y + self.h
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.w as f32 / 2.0,
            self.y as f32 + self.h as f32 / 2.0,
        )
    }

    /// 与画面 (0, 0, width, height) 的交集; 完全在画面外时返回 None
    pub fn clip_to(&self, width: u32, height: u32) -> Option<BBox> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.xmax().min(width as i32);
        let y2 = self.ymax().min(height as i32);
        BBox::new(x1, y1, x2 - x1, y2 - y1)
    }
}

impl std::fmt::Display for BBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x, self.y, self.w, self.h)
    }
}

/// 一次检测输出: 边界框 + 类别名 + 置信度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub label: String,
    pub score: f32,
}

impl Detection {
    pub fn new(bbox: BBox, label: impl Into<String>, score: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            score,
        }
    }

    /// 类别一致且置信度严格大于阈值
    pub fn qualifies(&self, target_class: &str, threshold: f32) -> bool {
        self.label == target_class && self.score > threshold
    }
}
