//! 隐私马赛克 (Privacy redaction)
//!
//! 每个人体框区域: 面积平均下采样到固定网格, 再最近邻上采样回原尺寸。
//! 网格单元至少 `MIN_CELL` 像素宽, 小框退化为更粗的网格, 极小的框整体取均值。
//! 重叠框按绘制顺序处理, 每个像素只由覆盖它的最后一个框写入, 因此同一帧与同一框集合
//! 重复处理结果不变。

use image::RgbImage;

use crate::error::RedactionBoundsError;
use crate::geometry::BBox;

/// 默认马赛克网格
pub const DEFAULT_GRID: u32 = 10;
/// 马赛克单元最小边长 (像素)
pub const MIN_CELL: u32 = 4;

/// Clamps `bbox` to the frame, failing when nothing is left of it.
pub fn clamp_box(bbox: BBox, width: u32, height: u32) -> Result<BBox, RedactionBoundsError> {
    let clamped = bbox.clamp_to(width, height);
    if clamped.is_degenerate() {
        return Err(RedactionBoundsError {
            bbox,
            width,
            height,
        });
    }
    Ok(clamped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redactor {
    grid: u32,
}

impl Redactor {
    pub fn new(grid: u32) -> Self {
        Self { grid: grid.max(1) }
    }

    pub fn grid(&self) -> u32 {
        self.grid
    }

    /// Mosaics every box in place and returns how many boxes were applied.
    ///
    /// Boxes that are empty after clamping are skipped and logged.
    pub fn redact(&self, image: &mut RgbImage, boxes: &[BBox]) -> usize {
        let (width, height) = image.dimensions();
        let regions: Vec<BBox> = boxes
            .iter()
            .filter_map(|&bbox| match clamp_box(bbox, width, height) {
                Ok(region) => Some(region),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping redaction box");
                    None
                }
            })
            .collect();

        for (k, region) in regions.iter().enumerate() {
            self.mosaic(image, region, &regions[k + 1..]);
        }
        regions.len()
    }

    /// 返回处理后的副本
    pub fn redacted(&self, image: &RgbImage, boxes: &[BBox]) -> RgbImage {
        let mut out = image.clone();
        self.redact(&mut out, boxes);
        out
    }

    /// 对单个区域做马赛克, 跳过被后续框覆盖的像素
    fn mosaic(&self, image: &mut RgbImage, region: &BBox, later: &[BBox]) {
        let w = region.width() as u32;
        let h = region.height() as u32;
        // 单元不小于 MIN_CELL, 小框使用更粗的网格
        let gw = (w / MIN_CELL).clamp(1, self.grid);
        let gh = (h / MIN_CELL).clamp(1, self.grid);
        let cells = (gw * gh) as usize;
        let cell_of = |x: i32, y: i32| -> usize {
            let cx = (x - region.x1) as u64 * gw as u64 / w as u64;
            let cy = (y - region.y1) as u64 * gh as u64 / h as u64;
            (cy * gw as u64 + cx) as usize
        };
        let visible = |x: i32, y: i32| !later.iter().any(|b| b.covers_pixel(x, y));

        // 面积平均
        let mut sums = vec![[0u64; 3]; cells];
        let mut counts = vec![0u64; cells];
        for y in region.y1..region.y2 {
            for x in region.x1..region.x2 {
                if !visible(x, y) {
                    continue;
                }
                let cell = cell_of(x, y);
                let px = image.get_pixel(x as u32, y as u32);
                for c in 0..3 {
                    sums[cell][c] += px[c] as u64;
                }
                counts[cell] += 1;
            }
        }

        let means: Vec<[u8; 3]> = sums
            .iter()
            .zip(&counts)
            .map(|(sum, &n)| {
                if n == 0 {
                    return [0; 3];
                }
                let mut mean = [0u8; 3];
                for c in 0..3 {
                    mean[c] = ((sum[c] + n / 2) / n) as u8;
                }
                mean
            })
            .collect();

        // 最近邻回填
        for y in region.y1..region.y2 {
            for x in region.x1..region.x2 {
                if !visible(x, y) {
                    continue;
                }
                image.put_pixel(x as u32, y as u32, image::Rgb(means[cell_of(x, y)]));
            }
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_GRID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8])
        })
    }

    #[test]
    fn mosaic_is_blocky_inside_and_untouched_outside() {
        let original = gradient(64, 48);
        let redactor = Redactor::new(4);
        let out = redactor.redacted(&original, &[BBox::new(8, 8, 40, 40)]);

        // 区域外不变
        assert_eq!(out.get_pixel(0, 0), original.get_pixel(0, 0));
        assert_eq!(out.get_pixel(50, 45), original.get_pixel(50, 45));
        // 32x32 区域, 4x4 网格: 每格 8x8 同色
        assert_eq!(out.get_pixel(8, 8), out.get_pixel(15, 15));
        assert_ne!(out.get_pixel(8, 8), out.get_pixel(16, 8));
    }

    #[test]
    fn redaction_is_idempotent() {
        let original = gradient(80, 60);
        let redactor = Redactor::default();
        let boxes = [
            BBox::new(5, 5, 45, 50),
            BBox::new(30, 20, 77, 58),
            BBox::new(-10, 40, 12, 90),
        ];
        let once = redactor.redacted(&original, &boxes);
        let twice = redactor.redacted(&once, &boxes);
        assert_eq!(once, twice);
    }

    fn distinct_colors(image: &RgbImage, region: BBox) -> usize {
        let mut colors = std::collections::HashSet::new();
        for y in region.y1..region.y2 {
            for x in region.x1..region.x2 {
                colors.insert(image.get_pixel(x as u32, y as u32).0);
            }
        }
        colors.len()
    }

    #[test]
    fn tiny_boxes_collapse_to_one_block() {
        let original = gradient(20, 20);
        let region = BBox::new(2, 2, 5, 4);
        let out = Redactor::new(10).redacted(&original, &[region]);
        assert_eq!(distinct_colors(&out, region), 1);
        assert_ne!(distinct_colors(&original, region), 1);
        assert_eq!(out.get_pixel(6, 6), original.get_pixel(6, 6));
    }

    #[test]
    fn small_boxes_are_obscured() {
        let original = gradient(64, 64);
        let redactor = Redactor::default();
        for side in [6, 8, 10, 12, 20] {
            let region = BBox::new(10, 10, 10 + side, 10 + side);
            let out = redactor.redacted(&original, &[region]);
            let cells = (side as u32 / MIN_CELL).clamp(1, DEFAULT_GRID) as usize;
            assert!(distinct_colors(&out, region) <= cells * cells, "box {side}");
            // 区域内每个像素都被均值替换
            let changed = (10..10 + side)
                .flat_map(|y| (10..10 + side).map(move |x| (x as u32, y as u32)))
                .filter(|&(x, y)| out.get_pixel(x, y) != original.get_pixel(x, y))
                .count();
            assert!(changed * 2 > (side * side) as usize, "box {side}: {changed} changed");
        }
    }

    #[test]
    fn degenerate_boxes_are_skipped() {
        let mut image = gradient(16, 16);
        let before = image.clone();
        let applied = Redactor::default().redact(
            &mut image,
            &[BBox::new(20, 20, 30, 30), BBox::new(5, 5, 5, 10), BBox::new(8, 9, 2, 12)],
        );
        assert_eq!(applied, 0);
        assert_eq!(image, before);
        assert!(clamp_box(BBox::new(20, 0, 30, 5), 16, 16).is_err());
    }
}
