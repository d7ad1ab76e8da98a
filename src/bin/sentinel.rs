/// 数字卫兵 (Digital Sentinel)
///
/// 区域人数统计 + 隐私马赛克
///
/// 系统架构:
/// 1. 采集线程: 帧源读取, 断线退避重连
/// 2. 推理线程: 检测跟踪 + 穿越/占用评估 + 马赛克
/// 3. 渲染线程: 缩放 + 叠加层 + 输出, 定时计数快照
/// 4. 主线程:   打印计数表, 到时关闭
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use zone_sentinel::counting::SharedCounters;
use zone_sentinel::detection::{ReplayProvider, TrackProvider};
use zone_sentinel::input::{FrameSource, ImageDirSource};
use zone_sentinel::pipeline::{Pipeline, PipelineParts};
use zone_sentinel::renderer::{DirectorySink, FrameSink, LatestFrameSink, Renderer};
use zone_sentinel::zones::ZoneStore;
use zone_sentinel::{gen_time_string, SentinelConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 数字卫兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "数字卫兵 - 区域人数统计与隐私马赛克", long_about = None)]
struct Args {
    /// 配置文件 (不存在时写出默认配置)
    #[arg(short, long, default_value = "sentinel.json")]
    config: PathBuf,

    /// 图片目录帧源
    #[arg(long)]
    images: Option<PathBuf>,

    /// 图片目录循环播放
    #[arg(long, default_value_t = false)]
    loop_images: bool,

    /// 图片目录回放帧率
    #[arg(long, default_value_t = 25.0)]
    fps: f64,

    /// RTSP流地址 (需要 ffmpeg 特性)
    #[arg(long)]
    rtsp: Option<String>,

    /// 摄像头设备 (需要 ffmpeg 特性)
    #[arg(long)]
    camera: Option<String>,

    /// 轨迹回放文件 (JSON Lines)
    #[arg(long)]
    replay: Option<PathBuf>,

    /// YOLOv8 ONNX 模型 (需要 onnx 特性), 覆盖配置文件
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// 检测置信度阈值, 覆盖配置文件
    #[arg(long)]
    conf: Option<f32>,

    /// 每N帧推理一次, 覆盖配置文件
    #[arg(long)]
    frame_skip: Option<u32>,

    /// 关闭马赛克
    #[arg(long, default_value_t = false)]
    no_redact: bool,

    /// 渲染画面输出目录
    #[arg(long)]
    output: Option<PathBuf>,

    /// 每N帧保存一张
    #[arg(long, default_value_t = 25)]
    save_every: u64,

    /// 运行秒数, 不指定则一直运行
    #[arg(long)]
    duration: Option<u64>,

    /// 退出时把计数表写成JSON
    #[arg(long)]
    table_json: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut SentinelConfig) {
        if let Some(model) = &self.model {
            config.detection.model_path = Some(model.clone());
        }
        if let Some(conf) = self.conf {
            config.detection.confidence_threshold = conf;
        }
        if let Some(skip) = self.frame_skip {
            config.pipeline.frame_skip = skip;
        }
        if self.no_redact {
            config.redaction.enabled = false;
        }
    }
}

fn build_source(args: &Args, config: &SentinelConfig) -> Result<(Box<dyn FrameSource>, Option<u64>)> {
    if let Some(dir) = &args.images {
        let source = ImageDirSource::open(dir)
            .with_context(|| format!("opening image directory {}", dir.display()))?
            .looping(args.loop_images)
            .with_fps(args.fps);
        let period = args.loop_images.then_some(source.len() as u64);
        return Ok((Box::new(source), period));
    }

    #[cfg(feature = "ffmpeg")]
    {
        use zone_sentinel::input::{FfmpegSource, InputSource};
        let timeout = config.reconnect.read_timeout();
        if let Some(url) = &args.rtsp {
            let source = FfmpegSource::new(InputSource::Rtsp(url.clone()), timeout);
            return Ok((Box::new(source), None));
        }
        if let Some(device) = &args.camera {
            let source = FfmpegSource::new(InputSource::Camera(device.clone()), timeout);
            return Ok((Box::new(source), None));
        }
    }
    #[cfg(not(feature = "ffmpeg"))]
    if args.rtsp.is_some() || args.camera.is_some() {
        let _ = config;
        bail!("RTSP/camera input requires building with the `ffmpeg` feature");
    }

    bail!("no frame source given, use --images, --rtsp or --camera")
}

fn build_provider(
    args: &Args,
    config: &SentinelConfig,
    period: Option<u64>,
) -> Result<Box<dyn TrackProvider>> {
    if let Some(path) = &args.replay {
        let mut provider = ReplayProvider::from_path(path)
            .with_context(|| format!("loading track replay {}", path.display()))?;
        if let Some(period) = period {
            provider = provider.looping(period);
        }
        return Ok(Box::new(provider));
    }

    #[cfg(feature = "onnx")]
    if let Some(model) = &config.detection.model_path {
        use zone_sentinel::detection::{DetectorTracker, YoloV8Detector};
        let detection = &config.detection;
        let detector = YoloV8Detector::load(
            model,
            detection.confidence_threshold,
            detection.iou_threshold,
        )
        .with_context(|| format!("loading model {}", model.display()))?;
        return Ok(Box::new(DetectorTracker::new(
            detector,
            detection.confidence_threshold,
            detection.tracker,
        )));
    }
    #[cfg(not(feature = "onnx"))]
    if config.detection.model_path.is_some() {
        bail!("ONNX detection requires building with the `onnx` feature");
    }

    bail!("no track provider given, use --replay or a model path")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = SentinelConfig::load_or_create(&args.config)
        .with_context(|| format!("loading configuration {}", args.config.display()))?;
    args.apply(&mut config);
    config.log_summary();

    let (source, period) = build_source(&args, &config)?;
    let provider = build_provider(&args, &config, period)?;
    let renderer = Renderer::from_config(&config.display).context("initialising renderer")?;
    let sink: Box<dyn FrameSink> = match &args.output {
        Some(dir) => Box::new(
            DirectorySink::create(dir.join(gen_time_string("")), args.save_every)
                .context("creating output directory")?,
        ),
        None => Box::new(LatestFrameSink::new()),
    };

    let zones = Arc::new(ZoneStore::with_zones(&config.zones).context("initial zones")?);
    let counters = Arc::new(SharedCounters::new(config.pipeline.history_capacity));

    tracing::info!(
        source = %source.describe(),
        provider = provider.name(),
        "数字卫兵系统启动"
    );
    let pipeline = Pipeline::spawn(
        PipelineParts {
            source,
            provider,
            sink,
            renderer,
            zones,
            counters: Arc::clone(&counters),
        },
        &config,
    )
    .context("starting pipeline")?;

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        let timeout = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    break;
                }
                left.min(Duration::from_secs(1))
            }
            None => Duration::from_secs(1),
        };
        match pipeline.snapshots().recv_timeout(timeout) {
            Ok(snapshot) => println!("{}", snapshot.table_row()),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    let stats = pipeline.shutdown();
    tracing::info!(?stats, "final statistics");

    if let Some(path) = &args.table_json {
        let rows: Vec<_> = counters.history().iter().map(|s| s.table_row()).collect();
        let json = serde_json::to_string_pretty(&rows)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), rows = rows.len(), "counter table written");
    }
    Ok(())
}
