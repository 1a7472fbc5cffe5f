/// Two-stage ONNX face encoder: YOLO-face detection followed by ArcFace
/// embedding of each crop.
///
/// Sessions sit behind mutexes so one encoder instance can serve
/// concurrent enrollment workers.
use std::path::Path;
use std::sync::Mutex;

use crate::encoding::domain::face_encoder::{DetectedFace, FaceEncoder};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::face_encoding::FaceEncoding;
use crate::shared::photo::Photo;

/// Default confidence threshold for face detection.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

const EMBED_INPUT_SIZE: usize = 112;
const EMBED_NORM_MEAN: f32 = 127.5;
const EMBED_NORM_STD: f32 = 127.5;

pub struct OnnxFaceEncoder {
    detector: Mutex<ort::session::Session>,
    embedder: Mutex<ort::session::Session>,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceEncoder {
    /// Load the detection and embedding models and prepare for inference.
    ///
    /// The detector input resolution is read from the model's input shape
    /// (expecting NCHW). Falls back to 640 if the shape is dynamic or
    /// unreadable.
    pub fn new(
        detector_path: &Path,
        embedder_path: &Path,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let detector = ort::session::Session::builder()?.commit_from_file(detector_path)?;

        let input_size = detector
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    // shape is [N, C, H, W] — use H (square input)
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let mut builder = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_inter_threads(1)?
            .with_intra_threads(intra_threads)?;
        #[cfg(target_os = "macos")]
        {
            builder = builder.with_execution_providers([
                ort::execution_providers::CoreMLExecutionProvider::default().build(),
            ])?;
        }
        let embedder = builder.commit_from_file(embedder_path)?;

        Ok(Self {
            detector: Mutex::new(detector),
            embedder: Mutex::new(embedder),
            confidence,
            input_size,
        })
    }

    fn detect_faces(&self, photo: &Photo) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        let (input_tensor, scale, pad_x, pad_y) = letterbox(photo, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let mut session = self
            .detector
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("detection model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape();

        // YOLO output shape is [1, num_features, num_detections] (transposed)
        // or [1, num_detections, num_features]. Handle both.
        let (num_dets, num_feats) = if shape.len() == 3 {
            if shape[1] < shape[2] {
                (shape[2], shape[1])
            } else {
                (shape[1], shape[2])
            }
        } else {
            return Err(format!("Unexpected detector output shape: {shape:?}").into());
        };

        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        let transposed = shape.len() == 3 && shape[1] < shape[2];

        let mut raw_dets = Vec::new();
        for i in 0..num_dets {
            let row = if transposed {
                (0..num_feats)
                    .map(|f| data[f * num_dets + i])
                    .collect::<Vec<f32>>()
            } else {
                data[i * num_feats..(i + 1) * num_feats].to_vec()
            };

            // row format: [cx, cy, w, h, conf, ...]
            if row.len() < 5 {
                continue;
            }
            let conf = row[4] as f64;
            if conf < self.confidence {
                continue;
            }

            let cx = row[0] as f64;
            let cy = row[1] as f64;
            let w = row[2] as f64;
            let h = row[3] as f64;

            // Convert from letterbox coords back to original photo coords
            let x1 = ((cx - w / 2.0) - pad_x as f64) / scale;
            let y1 = ((cy - h / 2.0) - pad_y as f64) / scale;
            let x2 = ((cx + w / 2.0) - pad_x as f64) / scale;
            let y2 = ((cy + h / 2.0) - pad_y as f64) / scale;

            raw_dets.push(RawDetection {
                x1,
                y1,
                x2,
                y2,
                confidence: conf,
            });
        }

        Ok(nms(&mut raw_dets, NMS_IOU_THRESH))
    }

    fn embed(&self, crop: &Photo) -> Result<FaceEncoding, Box<dyn std::error::Error>> {
        let tensor = embed_preprocess(crop);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .embedder
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut encoding = FaceEncoding::new(embedding_slice.to_vec());
        encoding.l2_normalize();
        Ok(encoding)
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode(&self, photo: &Photo) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
        let detections = self.detect_faces(photo)?;

        let mut faces = Vec::with_capacity(detections.len());
        for det in &detections {
            let bbox = BoundingBox {
                x: det.x1.round() as i32,
                y: det.y1.round() as i32,
                width: (det.x2 - det.x1).round() as i32,
                height: (det.y2 - det.y1).round() as i32,
            }
            .clamp_to(photo.width(), photo.height());
            if bbox.is_empty() {
                continue;
            }

            let crop = photo.crop(&bbox);
            let encoding = self.embed(&crop)?;
            faces.push(DetectedFace {
                encoding,
                bounding_box: bbox,
                confidence: det.confidence,
            });
        }

        Ok(faces)
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a photo to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(photo: &Photo, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let pw = photo.width() as f64;
    let ph = photo.height() as f64;
    let target = target_size as f64;

    let scale = (target / pw).min(target / ph);
    let new_w = (pw * scale).round() as u32;
    let new_h = (ph * scale).round() as u32;
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Build padded image (filled with 114/255 gray, YOLO convention)
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = photo.as_ndarray(); // [H, W, C] u8
    let src_h = photo.height() as usize;
    let src_w = photo.width() as usize;

    // Nearest-neighbor resize + copy into padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn embed_preprocess(crop: &Photo) -> ndarray::Array4<f32> {
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;
    let data = crop.data();

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE));

    for y in 0..EMBED_INPUT_SIZE {
        let src_y =
            (((y as f64 + 0.5) * src_h as f64 / EMBED_INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..EMBED_INPUT_SIZE {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / EMBED_INPUT_SIZE as f64) as usize)
                .min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < data.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (data[offset + c] as f32 - EMBED_NORM_MEAN) / EMBED_NORM_STD;
                }
            }
        }
    }

    tensor
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if suppressed[j] {
                continue;
            }
            let iou = bbox_iou(
                &[dets[i].x1, dets[i].y1, dets[i].x2, dets[i].y2],
                &[dets[j].x1, dets[j].y1, dets[j].x2, dets[j].y2],
            );
            if iou > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 200x100 photo → letterbox to 640x640
        // Scale = min(640/200, 640/100) = 3.2
        // new_w = 640, new_h = 320, pad_x = 0, pad_y = 160
        let photo = Photo::new(vec![128u8; 200 * 100 * 3], 200, 100);
        let (tensor, scale, pad_x, pad_y) = letterbox(&photo, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((scale - 3.2).abs() < 0.01);
        assert_eq!(pad_x, 0);
        assert_eq!(pad_y, 160);
    }

    #[test]
    fn test_letterbox_square_photo() {
        let photo = Photo::new(vec![128u8; 100 * 100 * 3], 100, 100);
        let (tensor, scale, pad_x, pad_y) = letterbox(&photo, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((scale - 6.4).abs() < 0.01);
        assert_eq!(pad_x, 0);
        assert_eq!(pad_y, 0);
    }

    #[test]
    fn test_letterbox_values_normalized() {
        // Wide photo so there's vertical padding
        let photo = Photo::new(vec![255u8; 100 * 50 * 3], 100, 50);
        let (tensor, _, pad_x, pad_y) = letterbox(&photo, 640);

        assert_eq!(pad_x, 0);
        assert!(pad_y > 0);

        // A pixel in the image region is ~1.0
        let y = pad_y as usize + 1;
        let x = pad_x as usize + 1;
        assert!((tensor[[0, 0, y, x]] - 1.0).abs() < 0.01);

        // A pad pixel (top-left, outside image region) is ~114/255
        let pad_val = 114.0 / 255.0;
        assert!((tensor[[0, 0, 0, 0]] - pad_val).abs() < 0.01);
    }

    #[test]
    fn test_embed_preprocess_shape() {
        let crop = Photo::new(vec![128u8; 50 * 50 * 3], 50, 50);
        let tensor = embed_preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_embed_preprocess_normalization_range() {
        let max = Photo::new(vec![255u8; 10 * 10 * 3], 10, 10);
        assert!((embed_preprocess(&max)[[0, 0, 0, 0]] - 1.0).abs() < 0.01);

        let min = Photo::new(vec![0u8; 10 * 10 * 3], 10, 10);
        assert!((embed_preprocess(&min)[[0, 0, 0, 0]] - (-1.0)).abs() < 0.01);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let mut dets = vec![
            RawDetection {
                x1: 0.0,
                y1: 0.0,
                x2: 100.0,
                y2: 100.0,
                confidence: 0.9,
            },
            RawDetection {
                x1: 5.0,
                y1: 5.0,
                x2: 105.0,
                y2: 105.0,
                confidence: 0.8,
            },
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let mut dets = vec![
            RawDetection {
                x1: 0.0,
                y1: 0.0,
                x2: 50.0,
                y2: 50.0,
                confidence: 0.9,
            },
            RawDetection {
                x1: 200.0,
                y1: 200.0,
                x2: 250.0,
                y2: 250.0,
                confidence: 0.8,
            },
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_empty_input() {
        let mut dets: Vec<RawDetection> = Vec::new();
        let kept = nms(&mut dets, 0.3);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_nms_highest_confidence_wins() {
        let mut dets = vec![
            RawDetection {
                x1: 0.0,
                y1: 0.0,
                x2: 100.0,
                y2: 100.0,
                confidence: 0.5,
            },
            RawDetection {
                x1: 2.0,
                y1: 2.0,
                x2: 102.0,
                y2: 102.0,
                confidence: 0.9,
            },
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_bbox_iou_no_overlap() {
        assert_eq!(
            bbox_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]),
            0.0
        );
    }

    #[test]
    fn test_bbox_iou_perfect() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert!((bbox_iou(&b, &b) - 1.0).abs() < 1e-9);
    }
}
