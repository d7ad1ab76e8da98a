/// FFmpeg 帧源: RTSP 主动拉流 / 本地摄像头
///
/// 解码在独立线程中运行, 通过容量为1的通道把最新帧交给采集线程;
/// 读取带超时, 解码线程退出视为断线, 由采集线程退避重连。
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;

use super::decode_filter::DecodeFilter;
use super::{Frame, FrameSource};
use crate::error::SourceError;

/// 输入源类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Rtsp(String),
    /// 摄像头设备名或序号
    Camera(String),
}

impl InputSource {
    fn build_input(&self) -> Input {
        match self {
            InputSource::Rtsp(url) => Input::new(url.as_str()).set_input_opts(
                [
                    ("rtsp_transport", "tcp"),
                    ("buffer_size", "67108864"),
                    ("rtsp_flags", "prefer_tcp"),
                    ("fflags", "nobuffer"),
                ]
                .into(),
            ),
            InputSource::Camera(device) => {
                #[cfg(target_os = "windows")]
                let (format, device) = ("dshow", format!("video={device}"));
                #[cfg(target_os = "macos")]
                let (format, device) = ("avfoundation", device.clone());
                #[cfg(not(any(target_os = "windows", target_os = "macos")))]
                let (format, device) = ("v4l2", device.clone());
                Input::new(device).set_format(format)
            }
        }
    }
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::Rtsp(url) => write!(f, "rtsp:{url}"),
            InputSource::Camera(device) => write!(f, "camera:{device}"),
        }
    }
}

struct DecodeSession {
    rx: Receiver<RgbImage>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DecodeSession {
    fn start(source: &InputSource) -> Result<Self, SourceError> {
        let (tx, rx) = bounded(1);
        let stop = Arc::new(AtomicBool::new(false));

        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("decode", Box::new(DecodeFilter::new(tx, Arc::clone(&stop))));
        let out = create_null_output().add_frame_pipeline(pipe);

        let ctx = FfmpegContext::builder()
            .input(source.build_input())
            .filter_descs(["format=yuv420p"].into())
            .output(out)
            .build()
            .map_err(|e| SourceError::Disconnected(format!("build {source}: {e}")))?;
        let scheduler = ctx
            .start()
            .map_err(|e| SourceError::Disconnected(format!("start {source}: {e}")))?;

        let name = source.to_string();
        let handle = std::thread::Builder::new()
            .name("ffmpeg-decode".into())
            .spawn(move || {
                if let Err(e) = scheduler.wait() {
                    tracing::warn!(source = %name, error = %e, "decoder finished with error");
                }
            })?;

        Ok(Self {
            rx,
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // 解码线程在下一帧回调时退出; 不在此处等待以免阻塞采集线程
        drop(self.handle.take());
    }
}

pub struct FfmpegSource {
    source: InputSource,
    session: Option<DecodeSession>,
    read_timeout: Duration,
    next_id: u64,
}

impl FfmpegSource {
    pub fn new(source: InputSource, read_timeout: Duration) -> Self {
        Self {
            source,
            session: None,
            read_timeout,
            next_id: 0,
        }
    }
}

impl FrameSource for FfmpegSource {
    fn read(&mut self) -> Result<Frame, SourceError> {
        if self.session.is_none() {
            self.session = Some(DecodeSession::start(&self.source)?);
            tracing::info!(source = %self.source, "stream connected");
        }
        let Some(session) = self.session.as_ref() else {
            return Err(SourceError::Disconnected(self.source.to_string()));
        };
        match session.rx.recv_timeout(self.read_timeout) {
            Ok(image) => {
                let frame = Frame::new(self.next_id, image);
                self.next_id += 1;
                Ok(frame)
            }
            Err(RecvTimeoutError::Timeout) => Err(SourceError::Timeout(self.read_timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                self.session = None;
                Err(SourceError::Disconnected(self.source.to_string()))
            }
        }
    }

    fn reconnect(&mut self) -> Result<(), SourceError> {
        self.session = None;
        self.session = Some(DecodeSession::start(&self.source)?);
        tracing::info!(source = %self.source, "stream reconnected");
        Ok(())
    }

    fn describe(&self) -> String {
        self.source.to_string()
    }
}
