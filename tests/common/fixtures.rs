use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbImage};
use toukui::detection::{DetectError, Detection, Detector, LabelTable};

pub const BOUNDARY: &str = "toukui-test-boundary";

/// 纯黑 JPEG 图像的字节
pub fn black_jpeg(width: u32, height: u32) -> Vec<u8> {
  let mut bytes = Vec::new();
  DynamicImage::ImageRgb8(RgbImage::new(width, height))
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
    .expect("Failed to encode test image");
  bytes
}

/// 在目录下写一张纯黑 JPEG
pub fn write_black_jpeg(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
  std::fs::create_dir_all(dir).expect("Failed to create image directory");
  let path = dir.join(name);
  std::fs::write(&path, black_jpeg(width, height)).expect("Failed to write test image");
  path
}

/// 写一个占位权重文件
pub fn write_weights(dir: &Path, name: &str) -> PathBuf {
  std::fs::create_dir_all(dir).expect("Failed to create weights directory");
  let path = dir.join(name);
  std::fs::write(&path, b"weights").expect("Failed to write weights");
  path
}

/// ultralytics 风格的 results.csv（表头带空格填充）
pub fn write_results_csv(dir: &Path) -> PathBuf {
  std::fs::create_dir_all(dir).expect("Failed to create results directory");
  let path = dir.join("results.csv");
  std::fs::write(
    &path,
    "   epoch,  train/box_loss,  metrics/precision(B)\n\
     1,1.50,0.40\n\
     2,1.20,0.55\n\
     3,0.95,0.63\n",
  )
  .expect("Failed to write results.csv");
  path
}

/// 目录下的文件数（非递归）
pub fn count_files(dir: &Path) -> usize {
  match std::fs::read_dir(dir) {
    Ok(entries) => entries.filter_map(Result::ok).count(),
    Err(_) => 0,
  }
}

/// zip 中的条目名，按字典序
pub fn zip_entries(path: &Path) -> Vec<String> {
  let file = std::fs::File::open(path).expect("Failed to open archive");
  let mut archive = zip::ZipArchive::new(file).expect("Failed to read archive");
  let mut names: Vec<String> = archive.file_names().map(str::to_owned).collect();
  names.sort();

  // 条目可以完整解压
  for i in 0..archive.len() {
    let mut entry = archive.by_index(i).expect("Failed to read entry");
    let mut data = Vec::new();
    entry.read_to_end(&mut data).expect("Failed to decompress entry");
  }
  names
}

/// 单个文件字段的 multipart 请求体
pub fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
  let mut body = Vec::new();
  body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
  body.extend_from_slice(
    format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
      .as_bytes(),
  );
  body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
  body.extend_from_slice(data);
  body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
  body
}

/// 对任何图像都返回同一组检测结果
pub struct FixedDetector {
  labels: LabelTable,
  detections: Vec<Detection>,
}

impl FixedDetector {
  pub fn new(detections: Vec<Detection>) -> Self {
    Self {
      labels: LabelTable::helmet(),
      detections,
    }
  }

  pub fn empty() -> Self {
    Self::new(Vec::new())
  }
}

impl Detector for FixedDetector {
  fn labels(&self) -> &LabelTable {
    &self.labels
  }

  fn detect(
    &self,
    _source: &Path,
    _image: &RgbImage,
    _confidence: f32,
  ) -> Result<Vec<Detection>, DetectError> {
    Ok(self.detections.clone())
  }
}

/// 读取与图像同名的 `.txt` 检测记录
///
/// 每行 `标签或类别编号, 置信度, x1, y1, x2, y2`；没有记录文件时无检测目标，
/// 无效行被忽略。
pub struct SidecarDetector {
  labels: LabelTable,
}

impl SidecarDetector {
  pub fn new() -> Self {
    Self {
      labels: LabelTable::helmet(),
    }
  }

  fn parse_line(&self, line: &str) -> Option<Detection> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 {
      return None;
    }
    let (class_id, label) = match fields[0].parse::<u32>() {
      Ok(id) => (id, self.labels.name(id)),
      Err(_) => (self.labels.id_of(fields[0])?, fields[0].to_string()),
    };
    let confidence = fields[1].parse::<f32>().ok()?;
    let mut bbox = [0f32; 4];
    for (slot, field) in bbox.iter_mut().zip(&fields[2..]) {
      *slot = field.parse().ok()?;
    }
    Detection::new(class_id, label, confidence, bbox).ok()
  }
}

impl Detector for SidecarDetector {
  fn labels(&self) -> &LabelTable {
    &self.labels
  }

  fn detect(
    &self,
    source: &Path,
    _image: &RgbImage,
    confidence: f32,
  ) -> Result<Vec<Detection>, DetectError> {
    let text = match std::fs::read_to_string(source.with_extension("txt")) {
      Ok(text) => text,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(DetectError::Inference(e.to_string())),
    };
    Ok(
      text
        .lines()
        .filter_map(|line| self.parse_line(line))
        .filter(|d| d.confidence >= confidence)
        .collect(),
    )
  }
}
