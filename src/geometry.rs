//! 几何基元 (Geometry primitives)
//!
//! 所有坐标均为原始帧像素坐标, 只在渲染时转换到显示坐标。

use serde::{Deserialize, Serialize};

/// 整数像素点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// 整数边界框 (x1,y1) 左上, (x2,y2) 右下
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Rounds a floating-point detector box to the pixel grid.
    pub fn from_f32(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.round() as i32,
            y1: y1.round() as i32,
            x2: x2.round() as i32,
            y2: y2.round() as i32,
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Integer midpoint, rounding toward negative infinity.
    pub fn center(&self) -> Point {
        Point {
            x: (self.x1 + self.x2).div_euclid(2),
            y: (self.y1 + self.y2).div_euclid(2),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    /// 裁剪到 `[0,width) x [0,height)`
    pub fn clamp_to(&self, width: u32, height: u32) -> BBox {
        let w = width.min(i32::MAX as u32) as i32;
        let h = height.min(i32::MAX as u32) as i32;
        BBox {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }

    /// Half-open pixel coverage, `x1 <= x < x2` and `y1 <= y < y2`.
    pub fn covers_pixel(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }
}

/// 点相对于直线的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Negative,
    On,
    Positive,
}

impl Side {
    fn of(value: i64) -> Self {
        match value.signum() {
            -1 => Side::Negative,
            0 => Side::On,
            _ => Side::Positive,
        }
    }
}

/// Classifies `p` against the infinite line through `start` and `end`.
///
/// The positive side of any non-vertical line is the one with larger `y`
/// (below, in image coordinates); an exactly vertical line uses larger `x`.
/// Axis-aligned lines take a direct comparison, anything else the signed-area
/// test with the endpoints ordered left to right.
pub fn side_of_line(start: Point, end: Point, p: Point) -> Side {
    if start.y == end.y {
        return Side::of(p.y as i64 - start.y as i64);
    }
    if start.x == end.x {
        return Side::of(p.x as i64 - start.x as i64);
    }

    let dx = end.x as i64 - start.x as i64;
    let dy = end.y as i64 - start.y as i64;
    // 统一为 dx > 0, 使正侧法向量 (-dy, dx) 指向下方
    let (s, dx, dy) = if dx < 0 { (end, -dx, -dy) } else { (start, dx, dy) };
    let cross = dx * (p.y as i64 - s.y as i64) - dy * (p.x as i64 - s.x as i64);
    Side::of(cross)
}
