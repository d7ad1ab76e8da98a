/// FFmpeg解码过滤器: YUV420P 帧 → RGB 图像 → 采集线程
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;

/// 最大允许分辨率
const MAX_DIM: u32 = 4096;

#[derive(Clone)]
pub struct DecodeFilter {
    tx: Sender<RgbImage>,
    stop: Arc<AtomicBool>,
    count: usize,
    dropped: usize,
    total: usize,
    last: Instant,
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbImage>, stop: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            stop,
            count: 0,
            dropped: 0,
            total: 0,
            last: Instant::now(),
        }
    }

    fn drop_frame(&mut self, reason: &str) -> Result<Option<Frame>, String> {
        self.dropped += 1;
        if self.total <= 10 {
            tracing::warn!(frame = self.total, reason, "dropping decoded frame");
        }
        Ok(None)
    }

    fn log_throughput(&mut self) {
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            tracing::debug!(
                fps = format!("{:.1}", self.count as f64 / elapsed),
                total = self.total,
                dropped = self.dropped,
                "decode stats"
            );
            self.last = Instant::now();
            self.count = 0;
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        tracing::info!("decode filter started");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        // 采集端已放弃本次连接
        if self.stop.load(Ordering::Relaxed) {
            return Err("decoder stopped".to_string());
        }
        self.total += 1;

        // SAFETY: 指针在本回调期间有效, 并在解引用前检查空指针
        let image = unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                return self.drop_frame("empty or corrupt");
            }
            let av = &*frame.as_ptr();
            let (w, h) = (av.width as u32, av.height as u32);
            if w == 0 || h == 0 || w > MAX_DIM || h > MAX_DIM {
                return self.drop_frame("invalid resolution");
            }
            // 只丢弃严重错误的帧 (缺少参考帧, 无效比特流)
            if av.decode_error_flags & 0x03 != 0 {
                return self.drop_frame("decode error flags");
            }
            let (y_plane, u_plane, v_plane) = (av.data[0], av.data[1], av.data[2]);
            let y_stride = av.linesize[0] as usize;
            let uv_stride = av.linesize[1] as usize;
            if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
                return self.drop_frame("null plane");
            }
            if y_stride < w as usize || uv_stride < (w as usize).div_ceil(2) {
                return self.drop_frame("bad stride");
            }

            let mut image = RgbImage::new(w, h);
            yuv420p_to_rgb(
                y_plane,
                u_plane,
                v_plane,
                y_stride,
                uv_stride,
                &mut image,
            );
            image
        };

        self.count += 1;
        self.log_throughput();

        // 采集线程未取走上一帧时直接丢弃, 不排队
        match self.tx.try_send(image) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(Some(frame)),
            Err(TrySendError::Disconnected(_)) => Err("frame receiver dropped".to_string()),
        }
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        tracing::info!(total = self.total, dropped = self.dropped, "decode filter exited");
    }
}

/// BT.601 整数近似 (系数 x128)
unsafe fn yuv420p_to_rgb(
    y_plane: *const u8,
    u_plane: *const u8,
    v_plane: *const u8,
    y_stride: usize,
    uv_stride: usize,
    out: &mut RgbImage,
) {
    let width = out.width() as usize;
    for (row, line) in out.chunks_exact_mut(width * 3).enumerate() {
        let y_row = row * y_stride;
        let uv_row = (row >> 1) * uv_stride;
        for (x, px) in line.chunks_exact_mut(3).enumerate() {
            let y = *y_plane.add(y_row + x) as i32;
            let u = *u_plane.add(uv_row + (x >> 1)) as i32 - 128;
            let v = *v_plane.add(uv_row + (x >> 1)) as i32 - 128;
            px[0] = (y + ((v * 179) >> 7)).clamp(0, 255) as u8;
            px[1] = (y - ((u * 44) >> 7) - ((v * 91) >> 7)).clamp(0, 255) as u8;
            px[2] = (y + ((u * 227) >> 7)).clamp(0, 255) as u8;
        }
    }
}
