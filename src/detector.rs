// src/detector.rs

use anyhow::Result;
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

use crate::types::{class_name, in_catalog, ModelConfig};

const YOLO_CLASSES: usize = 80;

#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn class_label(&self) -> &'static str {
        class_name(self.class_id).unwrap_or("unknown")
    }
}

pub struct YoloDetector {
    session: Session,
    input_size: usize,
    nms_iou_threshold: f32,
}

impl YoloDetector {
    pub fn new(model: &ModelConfig, nms_iou_threshold: f32) -> Result<Self> {
        info!("Loading YOLO model: {}", model.path);

        let mut builder = Session::builder()?;
        if model.use_cuda {
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(0)
                .build()])?;
        }
        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(model.num_threads)?
            .commit_from_file(&model.path)?;

        info!("✓ YOLO detector initialized");
        Ok(Self {
            session,
            input_size: model.input_size,
            nms_iou_threshold,
        })
    }

    pub fn detect(
        &mut self,
        frame: &[u8],
        width: usize,
        height: usize,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        // 1. Preprocess (letterbox + normalize)
        let (input, scale, pad_x, pad_y) = letterbox(frame, width, height, self.input_size);

        // 2. Run inference
        let output = self.infer(&input)?;

        // 3. Postprocess (parse detections + NMS)
        let detections = self.postprocess(&output, scale, pad_x, pad_y, confidence_threshold);

        debug!("Detected {} catalog objects", detections.len());
        Ok(detections)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, self.input_size, self.input_size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }

    fn postprocess(
        &self,
        output: &[f32],
        scale: f32,
        pad_x: f32,
        pad_y: f32,
        conf_thresh: f32,
    ) -> Vec<Detection> {
        // YOLO output: [1, 84, N] where N = predictions per image.
        // Each prediction: [x, y, w, h, class0_conf, ..., class79_conf]
        let stride = output.len() / (4 + YOLO_CLASSES);
        let mut detections = Vec::new();

        for i in 0..stride {
            let cx = output[i];
            let cy = output[stride + i];
            let w = output[stride * 2 + i];
            let h = output[stride * 3 + i];

            let mut max_conf = 0.0f32;
            let mut best_class = 0usize;
            for c in 0..YOLO_CLASSES {
                let conf = output[stride * (4 + c) + i];
                if conf > max_conf {
                    max_conf = conf;
                    best_class = c;
                }
            }

            if max_conf < conf_thresh || !in_catalog(best_class as u32) {
                continue;
            }

            // Center format to corner format, then undo the letterbox
            let x1 = (cx - w / 2.0 - pad_x) / scale;
            let y1 = (cy - h / 2.0 - pad_y) / scale;
            let x2 = (cx + w / 2.0 - pad_x) / scale;
            let y2 = (cy + h / 2.0 - pad_y) / scale;

            detections.push(Detection {
                bbox: [x1, y1, x2, y2],
                confidence: max_conf,
                class_id: best_class as u32,
            });
        }

        nms(detections, self.nms_iou_threshold)
    }
}

/// Letterbox an RGB frame into a gray-padded square model input,
/// normalized to [0, 1] in CHW order. Returns the input tensor plus the
/// scale and padding needed to map detections back to frame coordinates.
fn letterbox(src: &[u8], src_w: usize, src_h: usize, size: usize) -> (Vec<f32>, f32, f32, f32) {
    // Fit inside the square input while keeping aspect ratio
    let scale = (size as f32 / src_w as f32).min(size as f32 / src_h as f32);
    let scaled_w = (src_w as f32 * scale) as usize;
    let scaled_h = (src_h as f32 * scale) as usize;
    let pad_x = (size - scaled_w) as f32 / 2.0;
    let pad_y = (size - scaled_h) as f32 / 2.0;

    let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

    // Gray canvas, written plane by plane so no intermediate HWC pass
    // is needed.
    let plane = size * size;
    let mut input = vec![114.0 / 255.0; 3 * plane];
    let (off_x, off_y) = (pad_x as usize, pad_y as usize);
    for y in 0..scaled_h {
        let row = (off_y + y) * size + off_x;
        for x in 0..scaled_w {
            let px = (y * scaled_w + x) * 3;
            for c in 0..3 {
                input[c * plane + row + x] = resized[px + c] as f32 / 255.0;
            }
        }
    }

    (input, scale, pad_x, pad_y)
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    if (dst_w, dst_h) == (src_w, src_h) {
        return src.to_vec();
    }

    let x_step = src_w as f32 / dst_w as f32;
    let y_step = src_h as f32 / dst_h as f32;
    let mut dst = Vec::with_capacity(dst_w * dst_h * 3);

    for dy in 0..dst_h {
        let sy = dy as f32 * y_step;
        let y0 = sy as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = sy - y0 as f32;

        for dx in 0..dst_w {
            let sx = dx as f32 * x_step;
            let x0 = sx as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = sx - x0 as f32;

            let at = |y: usize, x: usize, c: usize| src[(y * src_w + x) * 3 + c] as f32;
            for c in 0..3 {
                let top = at(y0, x0, c) + (at(y0, x1, c) - at(y0, x0, c)) * fx;
                let bottom = at(y1, x0, c) + (at(y1, x1, c) - at(y1, x0, c)) * fx;
                dst.push((top + (bottom - top) * fy).round() as u8);
            }
        }
    }
    dst
}

fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    while !detections.is_empty() {
        let current = detections.remove(0);
        detections.retain(|det| calculate_iou(&current.bbox, &det.bbox) < iou_threshold);
        keep.push(current);
    }
    keep
}

pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
