//! 边界框卡尔曼滤波 (对角协方差简化版)
//!
//! 状态向量: [cx, cy, w, h, vx, vy, vw, vh], 匀速模型 + 速度衰减。

use super::Detection;

/// 静止阈值 (像素/帧)
const STATIONARY_SPEED: f32 = 2.0;

#[derive(Debug, Clone)]
pub struct KalmanBoxFilter {
    state: [f32; 8],
    p: [f32; 8],
    /// 过程噪声
    q: f32,
    /// 观测噪声
    r: f32,
    velocity_decay: f32,
    stationary_frames: u32,
}

fn measure(det: &Detection) -> [f32; 4] {
    [
        (det.x1 + det.x2) / 2.0,
        (det.y1 + det.y2) / 2.0,
        det.x2 - det.x1,
        det.y2 - det.y1,
    ]
}

fn to_box(cx: f32, cy: f32, w: f32, h: f32, like: &Detection) -> Detection {
    let (w, h) = (w.max(1.0), h.max(1.0));
    Detection {
        x1: cx - w / 2.0,
        y1: cy - h / 2.0,
        x2: cx + w / 2.0,
        y2: cy + h / 2.0,
        ..*like
    }
}

impl KalmanBoxFilter {
    /// `q` 越小越平滑, `r` 越大越信任预测
    pub fn new(det: &Detection, q: f32, r: f32) -> Self {
        let [cx, cy, w, h] = measure(det);
        Self {
            state: [cx, cy, w, h, 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q,
            r,
            velocity_decay: 0.95,
            stationary_frames: 0,
        }
    }

    fn speed(&self) -> f32 {
        self.state[4].hypot(self.state[5])
    }

    pub fn predict(&mut self) {
        let stationary = self.speed() < STATIONARY_SPEED;
        let decay = if stationary {
            self.stationary_frames += 1;
            // 连续静止后大幅衰减速度
            if self.stationary_frames > 3 {
                0.7
            } else {
                self.velocity_decay
            }
        } else {
            self.stationary_frames = 0;
            self.velocity_decay
        };
        for v in &mut self.state[4..8] {
            *v *= decay;
        }
        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }

        let q = if stationary { self.q * 0.5 } else { self.q };
        for p in &mut self.p {
            *p += q;
        }
    }

    pub fn update(&mut self, det: &Detection) {
        let z = measure(det);
        let residual: [f32; 4] = std::array::from_fn(|i| z[i] - self.state[i]);
        let jump = residual[0].hypot(residual[1]);

        // 残差自适应观测噪声
        let r = if jump < STATIONARY_SPEED {
            self.r * 0.3
        } else if jump < 10.0 {
            self.r
        } else {
            self.r * 3.0
        };
        let velocity_gain = if jump < STATIONARY_SPEED { 0.3 } else { 1.0 };

        for i in 0..4 {
            let k = self.p[i] / (self.p[i] + r);
            let kv = self.p[i + 4] / (self.p[i + 4] + r * 10.0);
            self.state[i] += k * residual[i];
            self.state[i + 4] += kv * residual[i] * velocity_gain;
            self.p[i] *= 1.0 - k;
            self.p[i + 4] *= 1.0 - kv;
        }

        if jump >= STATIONARY_SPEED {
            self.stationary_frames = 0;
        }
    }

    /// 当前状态框, 继承 `like` 的置信度与类别
    pub fn state_box(&self, like: &Detection) -> Detection {
        let [cx, cy, w, h, ..] = self.state;
        to_box(cx, cy, w, h, like)
    }

    /// 下一帧预测框, 用于IOU匹配
    pub fn predicted_box(&self, like: &Detection) -> Detection {
        let s = &self.state;
        to_box(s[0] + s[4], s[1] + s[5], s[2] + s[6], s[3] + s[7], like)
    }
}
