// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline.rs - 端到端检测流水线测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{cell::RefCell, convert::Infallible};

use image::{Rgb, RgbImage};
use ndarray::{Array, ArrayD, IxDyn};
use url::Url;

use shanan_scorer::{
  FromUrl,
  engine::{EngineOutputs, InferenceEngine, ReplayEngine},
  frame::RgbNchwTensor,
  model::{BBox, ModelConfig, Yolov5Builder, Yolov5Error},
};

/// 记录收到的输入张量，返回固定输出
struct MockEngine {
  outputs: EngineOutputs,
  seen: RefCell<Vec<(String, Vec<usize>)>>,
  pad_sample: RefCell<Option<[f32; 3]>>,
}

impl MockEngine {
  fn new(outputs: EngineOutputs) -> Self {
    Self {
      outputs,
      seen: RefCell::new(Vec::new()),
      pad_sample: RefCell::new(None),
    }
  }
}

impl InferenceEngine for MockEngine {
  type Error = Infallible;

  fn infer(&self, input_name: &str, input: &RgbNchwTensor) -> Result<EngineOutputs, Self::Error> {
    let view = input.view();
    self
      .seen
      .borrow_mut()
      .push((input_name.to_string(), view.shape().to_vec()));
    *self.pad_sample.borrow_mut() = Some([view[[0, 0, 0, 0]], view[[0, 1, 0, 0]], view[[0, 2, 0, 0]]]);
    Ok(self.outputs.clone())
  }
}

fn fused_row(xywh: [f32; 4], objectness: f32, class: usize, class_score: f32) -> Vec<f32> {
  let mut row = vec![0.0; 85];
  row[..4].copy_from_slice(&xywh);
  row[4] = objectness;
  row[5 + class] = class_score;
  row
}

fn close(a: &BBox, b: &BBox) -> bool {
  (a.x_min - b.x_min).abs() < 1e-2
    && (a.y_min - b.y_min).abs() < 1e-2
    && (a.x_max - b.x_max).abs() < 1e-2
    && (a.y_max - b.y_max).abs() < 1e-2
}

#[test]
fn fused_detections_map_back_to_the_source_image() {
  // 1280x720 -> 640x640: 比例 0.5，上下各填充 140
  let rows = [
    fused_row([320.0, 320.0, 100.0, 50.0], 0.9, 2, 0.8),
    // 与第一个框高度重叠、分数更低、类别不同：跨类别抑制
    fused_row([322.0, 320.0, 100.0, 50.0], 0.9, 7, 0.5),
    // 目标置信度不足
    fused_row([100.0, 200.0, 40.0, 40.0], 0.1, 0, 0.99),
    fused_row([500.0, 400.0, 60.0, 80.0], 0.8, 0, 0.9),
  ];
  let data: Vec<f32> = rows.concat();
  let output = ArrayD::from_shape_vec(IxDyn(&[1, rows.len(), 85]), data).unwrap();
  let engine = MockEngine::new(EngineOutputs::new().with("output", output));

  let model = Yolov5Builder::from_url(&Url::parse("yolov5://coco-p5").unwrap())
    .unwrap()
    .build(&engine)
    .unwrap();
  let image = RgbImage::from_pixel(1280, 720, Rgb([255, 255, 255]));
  let result = model.predict(&image).unwrap();

  assert_eq!(
    *engine.seen.borrow(),
    vec![("images".to_string(), vec![1, 3, 640, 640])]
  );
  // 左上角落在填充区域
  assert_eq!(*engine.pad_sample.borrow(), Some([0.0, 0.0, 0.0]));

  assert_eq!(result.len(), 2);
  let first = &result.items[0];
  assert_eq!(first.label.name, "car");
  assert!((first.score - 0.72).abs() < 1e-5);
  assert!(close(&first.bbox, &BBox::new(540.0, 310.0, 740.0, 410.0)));

  let second = &result.items[1];
  assert_eq!(second.label.name, "person");
  assert!((second.score - 0.72).abs() < 1e-5);
  assert!(close(&second.bbox, &BBox::new(940.0, 440.0, 1060.0, 600.0)));
}

#[test]
fn raw_outputs_are_decoded_per_scale() {
  let config = r#"{
    "width": 64,
    "height": 64,
    "dimensions": 7,
    "confidence": 0.2,
    "mul_confidence": 0.25,
    "overlap": 0.9,
    "outputs": ["p3", "p4"],
    "decode": {
      "mode": "raw",
      "scales": [
        { "grid": 8, "stride": 8.0, "anchors": [[10.0, 13.0], [16.0, 30.0]] },
        { "grid": 4, "stride": 16.0, "anchors": [[30.0, 61.0]] }
      ]
    },
    "labels": [
      { "id": 0, "name": "cat" },
      { "id": 1, "name": "dog", "color": [0, 255, 0] }
    ]
  }"#;
  let file = tempfile::NamedTempFile::new().unwrap();
  std::fs::write(file.path(), config).unwrap();

  // 除两个单元外全部为很小的 logit
  let mut p3 = Array::from_elem(IxDyn(&[1, 2, 8, 8, 7]), -10.0f32);
  for (k, v) in [0.0, 0.0, 0.0, 0.0, 10.0, -10.0, 10.0].into_iter().enumerate() {
    p3[[0, 1, 3, 2, k]] = v;
  }
  let mut p4 = Array::from_elem(IxDyn(&[1, 1, 4, 4, 7]), -10.0f32);
  for (k, v) in [0.0, 0.0, 0.0, 0.0, 10.0, 10.0, -10.0].into_iter().enumerate() {
    p4[[0, 0, 0, 0, k]] = v;
  }
  // 引擎输出顺序与配置声明顺序相反，按名称选取
  let engine = ReplayEngine::new(EngineOutputs::new().with("p4", p4).with("p3", p3));

  let url = Url::parse(&format!("yolov5://{}?overlap=0.45", file.path().display())).unwrap();
  let model = Yolov5Builder::from_url(&url).unwrap().build(engine).unwrap();
  assert_eq!(model.config().overlap, 0.45);

  let result = model.predict(&RgbImage::new(64, 64)).unwrap();
  assert_eq!(result.len(), 2);

  let dog = &result.items[0];
  assert_eq!(dog.label.name, "dog");
  assert_eq!(dog.label.color, [0, 255, 0]);
  assert!(dog.score > 0.99);
  assert!(close(&dog.bbox, &BBox::new(12.0, 13.0, 28.0, 43.0)));

  // 越界部分被裁剪
  let cat = &result.items[1];
  assert_eq!(cat.label.name, "cat");
  assert!(close(&cat.bbox, &BBox::new(0.0, 0.0, 23.0, 38.5)));
}

#[test]
fn wrong_raw_element_count_is_a_shape_mismatch() {
  let mut config = ModelConfig::coco_p5_raw();
  config.outputs = vec!["a".into(), "b".into(), "c".into()];
  let outputs = EngineOutputs::new()
    .with("a", ArrayD::zeros(IxDyn(&[1, 3, 80, 80, 85])))
    .with("b", ArrayD::zeros(IxDyn(&[1, 3, 40, 40, 85])))
    .with("c", ArrayD::zeros(IxDyn(&[1, 3, 20, 19, 85])));

  let model = Yolov5Builder::new(config)
    .build(ReplayEngine::new(outputs))
    .unwrap();
  match model.predict(&RgbImage::new(640, 640)) {
    Err(Yolov5Error::OutputShapeMismatch { name, expected, actual }) => {
      assert_eq!(name, "c");
      assert_eq!(expected, 3 * 20 * 20 * 85);
      assert_eq!(actual, 3 * 20 * 19 * 85);
    }
    other => panic!("unexpected result: {:?}", other.map(|r| r.len())),
  }
}

#[test]
fn no_candidates_is_an_empty_result() {
  let output = ArrayD::zeros(IxDyn(&[1, 25200, 85]));
  let engine = ReplayEngine::new(EngineOutputs::new().with("output", output));
  let model = Yolov5Builder::new(ModelConfig::coco_p5())
    .build(engine)
    .unwrap();

  assert!(model.predict(&RgbImage::new(320, 200)).unwrap().is_empty());
}
