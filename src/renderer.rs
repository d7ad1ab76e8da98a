//! 渲染 (Renderer)
//!
//! 原始帧 → 按比例缩放并居中 (letterbox) 到显示尺寸 → 绘制区域与轨迹叠加层。
//! 区域一律存储在原始帧坐标中, 只在这里换算到显示坐标;
//! 叠加层按 (区域版本号, 原始帧尺寸) 缓存, 区域修改后才重新计算。

pub mod sink;

use ab_glyph::{FontArc, PxScale};
use fast_image_resize as fr;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::config::DisplayConfig;
use crate::detection::Track;
use crate::error::SinkError;
use crate::geometry::Point;
use crate::zones::ZoneSnapshot;

pub use sink::{DirectorySink, FrameSink, LatestFrame, LatestFrameSink};

pub const ENTRY_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const EXIT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const TRACK_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// 原始帧坐标 → 显示坐标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    /// 缩放后的画面尺寸
    pub width: u32,
    pub height: u32,
}

impl Letterbox {
    pub fn fit(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Self {
        if src_w == 0 || src_h == 0 {
            return Self {
                scale: 1.0,
                offset_x: 0,
                offset_y: 0,
                width: 0,
                height: 0,
            };
        }
        let scale = (dst_w as f32 / src_w as f32).min(dst_h as f32 / src_h as f32);
        let width = ((src_w as f32 * scale).round() as u32).clamp(1, dst_w.max(1));
        let height = ((src_h as f32 * scale).round() as u32).clamp(1, dst_h.max(1));
        Self {
            scale,
            offset_x: (dst_w - width) / 2,
            offset_y: (dst_h - height) / 2,
            width,
            height,
        }
    }

    pub fn map(&self, p: Point) -> (f32, f32) {
        (
            p.x as f32 * self.scale + self.offset_x as f32,
            p.y as f32 * self.scale + self.offset_y as f32,
        )
    }

    /// Maps a display-space point back into raw-frame space.
    pub fn unmap(&self, x: f32, y: f32) -> Point {
        let scale = if self.scale > 0.0 { self.scale } else { 1.0 };
        Point::new(
            ((x - self.offset_x as f32) / scale).round() as i32,
            ((y - self.offset_y as f32) / scale).round() as i32,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Line {
        from: (f32, f32),
        to: (f32, f32),
        color: Rgb<u8>,
    },
    Rect {
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        color: Rgb<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OverlayKey {
    revision: u64,
    src_w: u32,
    src_h: u32,
}

pub struct Renderer {
    width: u32,
    height: u32,
    draw_tracks: bool,
    font: Option<FontArc>,
    resizer: fr::Resizer,
    overlay_key: Option<OverlayKey>,
    overlay: Vec<Shape>,
    overlay_builds: u64,
}

fn rect_shape(x1: f32, y1: f32, x2: f32, y2: f32, color: Rgb<u8>) -> Option<Shape> {
    let w = (x2 - x1).round() as i64;
    let h = (y2 - y1).round() as i64;
    (w > 0 && h > 0).then(|| Shape::Rect {
        x: x1.round() as i32,
        y: y1.round() as i32,
        w: w as u32,
        h: h as u32,
        color,
    })
}

fn draw_shape(canvas: &mut RgbImage, shape: &Shape) {
    match *shape {
        Shape::Line { from, to, color } => {
            // 2像素线宽
            for d in [0.0, 1.0] {
                draw_line_segment_mut(canvas, (from.0, from.1 + d), (to.0, to.1 + d), color);
                draw_line_segment_mut(canvas, (from.0 + d, from.1), (to.0 + d, to.1), color);
            }
        }
        Shape::Rect { x, y, w, h, color } => {
            draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(w, h), color);
            if w > 2 && h > 2 {
                draw_hollow_rect_mut(canvas, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), color);
            }
        }
    }
}

impl Renderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            draw_tracks: true,
            font: None,
            resizer: fr::Resizer::new(),
            overlay_key: None,
            overlay: Vec::new(),
            overlay_builds: 0,
        }
    }

    pub fn from_config(config: &DisplayConfig) -> Result<Self, SinkError> {
        let mut renderer = Self::new(config.width, config.height).with_tracks(config.draw_tracks);
        if let Some(path) = &config.font_path {
            let bytes = std::fs::read(path)?;
            renderer = renderer.with_font_bytes(bytes)?;
            tracing::info!(font = %path.display(), "label font loaded");
        }
        Ok(renderer)
    }

    pub fn with_tracks(mut self, draw_tracks: bool) -> Self {
        self.draw_tracks = draw_tracks;
        self
    }

    pub fn with_font_bytes(mut self, bytes: Vec<u8>) -> Result<Self, SinkError> {
        let font = FontArc::try_from_vec(bytes).map_err(|e| SinkError::Font(e.to_string()))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 叠加层重建次数
    pub fn overlay_builds(&self) -> u64 {
        self.overlay_builds
    }

    /// 缩放并居中到显示画布
    pub fn letterbox(&mut self, image: &RgbImage) -> Result<(RgbImage, Letterbox), SinkError> {
        let (src_w, src_h) = image.dimensions();
        let fit = Letterbox::fit(src_w, src_h, self.width, self.height);
        let mut canvas = RgbImage::new(self.width, self.height);
        if fit.width == 0 {
            return Ok((canvas, fit));
        }

        let scaled = if (fit.width, fit.height) == (src_w, src_h) {
            image.clone()
        } else {
            let src = fr::images::ImageRef::new(src_w, src_h, image.as_raw(), fr::PixelType::U8x3)
                .map_err(|e| SinkError::Resize(e.to_string()))?;
            let mut dst = fr::images::Image::new(fit.width, fit.height, fr::PixelType::U8x3);
            let options = fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
            self.resizer
                .resize(&src, &mut dst, Some(&options))
                .map_err(|e| SinkError::Resize(e.to_string()))?;
            RgbImage::from_raw(fit.width, fit.height, dst.into_vec())
                .ok_or_else(|| SinkError::Resize("resized buffer size mismatch".to_string()))?
        };
        image::imageops::replace(&mut canvas, &scaled, fit.offset_x as i64, fit.offset_y as i64);
        Ok((canvas, fit))
    }

    fn rebuild_overlay(&mut self, zones: &ZoneSnapshot, fit: &Letterbox) {
        let mut shapes = Vec::new();
        for (line, color) in [
            (zones.entry_line, ENTRY_COLOR),
            (zones.exit_line, EXIT_COLOR),
        ] {
            if let Some(line) = line {
                shapes.push(Shape::Line {
                    from: fit.map(line.start),
                    to: fit.map(line.end),
                    color,
                });
            }
        }
        if let Some(b) = zones.occupancy_box {
            let (x1, y1) = fit.map(Point::new(b.x1, b.y1));
            let (x2, y2) = fit.map(Point::new(b.x2, b.y2));
            shapes.extend(rect_shape(x1, y1, x2, y2, BOX_COLOR));
        }
        self.overlay = shapes;
        self.overlay_builds += 1;
    }

    /// Letterboxes `image` and draws zones (and confirmed tracks) on top.
    pub fn compose(
        &mut self,
        image: &RgbImage,
        zones: &ZoneSnapshot,
        tracks: &[Track],
    ) -> Result<RgbImage, SinkError> {
        let (mut canvas, fit) = self.letterbox(image)?;

        let key = OverlayKey {
            revision: zones.revision,
            src_w: image.width(),
            src_h: image.height(),
        };
        if self.overlay_key != Some(key) {
            self.rebuild_overlay(zones, &fit);
            self.overlay_key = Some(key);
        }
        for shape in &self.overlay {
            draw_shape(&mut canvas, shape);
        }

        if self.draw_tracks {
            for track in tracks {
                let (x1, y1) = fit.map(Point::new(track.bbox.x1, track.bbox.y1));
                let (x2, y2) = fit.map(Point::new(track.bbox.x2, track.bbox.y2));
                if let Some(shape) = rect_shape(x1, y1, x2, y2, TRACK_COLOR) {
                    draw_shape(&mut canvas, &shape);
                }
                if let Some(font) = &self.font {
                    let label = format!("ID {}", track.id);
                    let y = (y1.round() as i32 - 16).max(0);
                    draw_text_mut(
                        &mut canvas,
                        TRACK_COLOR,
                        x1.round() as i32,
                        y,
                        PxScale::from(14.0),
                        font,
                        &label,
                    );
                }
            }
        }
        Ok(canvas)
    }
}
