// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 人体检测器 (ONNX Runtime)
// 包含: 模型加载、预处理、推理、后处理

use std::path::Path;

use fast_image_resize as fr;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::{non_max_suppression, Detection, Detector, PERSON_CLASS};
use crate::error::InferenceError;
use crate::input::Frame;

/// YOLOv8 推理输入尺寸
pub const INF_SIZE: u32 = 640;
/// 输出: [1, 4 + 80, 8400]
const NUM_CLASSES: usize = 80;

pub struct YoloV8Detector {
    session: Session,
    resizer: fr::Resizer,
    resize_buf: Vec<u8>,
    conf_threshold: f32,
    iou_threshold: f32,
}

fn backend<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> InferenceError {
    move |e| InferenceError::backend(format!("{context}: {e}"))
}

impl YoloV8Detector {
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        conf_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Self, InferenceError> {
        let model_path = model_path.as_ref();
        let session = Session::builder()
            .map_err(backend("create ORT session builder"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(backend("set optimization level"))?
            .with_intra_threads(4)
            .map_err(backend("set ORT intra threads"))?
            .commit_from_file(model_path)
            .map_err(backend("load YOLOv8 ONNX model"))?;
        tracing::info!(model = %model_path.display(), "YOLOv8 model loaded");

        Ok(Self {
            session,
            resizer: fr::Resizer::new(),
            resize_buf: vec![0u8; (INF_SIZE * INF_SIZE * 3) as usize],
            conf_threshold,
            iou_threshold,
        })
    }

    /// 缩放到 640x640 并转换为 NCHW 归一化张量
    fn preprocess(&mut self, frame: &Frame) -> Result<Tensor<f32>, InferenceError> {
        let (width, height) = frame.image.dimensions();
        if width == 0 || height == 0 {
            return Err(InferenceError::malformed("empty frame"));
        }
        let src = fr::images::ImageRef::new(width, height, frame.image.as_raw(), fr::PixelType::U8x3)
            .map_err(backend("resize source"))?;
        let mut dst = fr::images::Image::from_vec_u8(
            INF_SIZE,
            INF_SIZE,
            std::mem::take(&mut self.resize_buf),
            fr::PixelType::U8x3,
        )
        .map_err(backend("resize destination"))?;
        let options =
            fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
        self.resizer
            .resize(&src, &mut dst, Some(&options))
            .map_err(backend("resize to model input"))?;
        self.resize_buf = dst.into_vec();

        let plane = (INF_SIZE * INF_SIZE) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (idx, px) in self.resize_buf.chunks_exact(3).enumerate() {
            data[idx] = px[0] as f32 / 255.0;
            data[plane + idx] = px[1] as f32 / 255.0;
            data[2 * plane + idx] = px[2] as f32 / 255.0;
        }
        let shape = [1usize, 3, INF_SIZE as usize, INF_SIZE as usize];
        Tensor::from_array((shape, data.into_boxed_slice())).map_err(backend("build input tensor"))
    }
}

impl Detector for YoloV8Detector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
        let input = self.preprocess(frame)?;
        let outputs = self
            .session
            .run(ort::inputs!["images" => input])
            .map_err(backend("YOLOv8 inference"))?;
        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .map_err(backend("extract YOLOv8 output"))?;

        let proposals = shape.get(2).copied().unwrap_or(0).max(0) as usize;
        if data.len() < (4 + NUM_CLASSES) * proposals {
            return Err(InferenceError::backend(format!(
                "unexpected output shape {shape:?}"
            )));
        }

        let (width, height) = frame.image.dimensions();
        let sx = width as f32 / INF_SIZE as f32;
        let sy = height as f32 / INF_SIZE as f32;
        let at = |row: usize, i: usize| data[row * proposals + i];

        let candidates: Vec<Detection> = (0..proposals)
            .filter_map(|i| {
                let person = at(4 + PERSON_CLASS as usize, i);
                if person < self.conf_threshold {
                    return None;
                }
                // 只保留人体为最高分类别的候选框
                if (0..NUM_CLASSES).any(|c| at(4 + c, i) > person) {
                    return None;
                }
                let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
                Some(Detection::new(
                    ((cx - w / 2.0) * sx).max(0.0),
                    ((cy - h / 2.0) * sy).max(0.0),
                    ((cx + w / 2.0) * sx).min(width as f32),
                    ((cy + h / 2.0) * sy).min(height as f32),
                    person,
                    PERSON_CLASS,
                ))
            })
            .collect();

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}
