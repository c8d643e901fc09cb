//! Branching workflows end to end, with stub models in place of real ones.

mod common;

use retina_block_registry::BlockError;
use retina_engine::{EngineConfig, ExecutionEngine, ExecutionError};
use serde_json::{Value, json};

use common::{create_registry, detection, image, params};

fn engine(definition: Value) -> ExecutionEngine {
  ExecutionEngine::init_value(
    definition,
    &Default::default(),
    &create_registry(),
    EngineConfig::default(),
  )
  .unwrap()
}

fn ab_test_workflow() -> Value {
  json!({
    "version": "1.0",
    "inputs": [{"type": "WorkflowImage", "name": "image"}],
    "steps": [
      {"type": "ABTest", "name": "ab_test", "a_step": "$steps.a", "b_step": "$steps.b"},
      {"type": "ObjectDetectionModel", "name": "a", "image": "$inputs.image", "model_id": "yolov8n-640"},
      {"type": "ObjectDetectionModel", "name": "b", "image": "$inputs.image", "model_id": "yolov8n-1280"}
    ],
    "outputs": [
      {"type": "JsonField", "name": "predictions_a", "selector": "$steps.a.predictions"},
      {"type": "JsonField", "name": "predictions_b", "selector": "$steps.b.predictions"}
    ]
  })
}

#[tokio::test]
async fn test_ab_test_decides_once_for_the_whole_batch() {
  let engine = engine(ab_test_workflow());
  let images: Vec<Value> = (0..4)
    .map(|i| image(&format!("img-{i}"), vec![detection("d", "car", 100, 100, 50)]))
    .collect();

  let mut a_runs = 0;
  let mut b_runs = 0;
  for _ in 0..100 {
    let result = engine
      .run_async(params(vec![("image", Value::Array(images.clone()))]))
      .await
      .unwrap();
    assert_eq!(result.len(), 4);

    let a_taken = !result[0]["predictions_a"].is_null();
    for record in &result {
      assert_eq!(
        record.keys().collect::<Vec<_>>(),
        vec!["predictions_a", "predictions_b"]
      );
      assert_eq!(!record["predictions_a"].is_null(), a_taken);
      assert_eq!(record["predictions_b"].is_null(), a_taken);
    }
    if a_taken {
      a_runs += 1;
    } else {
      b_runs += 1;
    }
  }
  assert!(a_runs > 0, "branch a never taken");
  assert!(b_runs > 0, "branch b never taken");
}

#[tokio::test]
async fn test_ab_test_on_a_single_image() {
  let engine = engine(ab_test_workflow());
  let single = image("solo", vec![detection("d", "car", 100, 100, 50)]);

  let mut a_runs = 0;
  let mut b_runs = 0;
  for _ in 0..100 {
    let result = engine
      .run_async(params(vec![("image", single.clone())]))
      .await
      .unwrap();
    assert_eq!(result.len(), 1);

    let a_taken = !result[0]["predictions_a"].is_null();
    assert_eq!(result[0]["predictions_b"].is_null(), a_taken);
    if a_taken {
      assert_eq!(result[0]["predictions_a"].as_array().unwrap().len(), 1);
      a_runs += 1;
    } else {
      assert_eq!(result[0]["predictions_b"].as_array().unwrap().len(), 1);
      b_runs += 1;
    }
  }
  assert!(a_runs > 0, "branch a never taken");
  assert!(b_runs > 0, "branch b never taken");
}

const FILTERING_OPERATION: &str = r#"{
  "type": "DetectionsFilter",
  "filter_operation": {
    "type": "StatementGroup",
    "operator": "and",
    "statements": [
      {
        "type": "BinaryStatement",
        "left_operand": {
          "type": "DynamicOperand",
          "operations": [{"type": "ExtractDetectionProperty", "property_name": "class_name"}]
        },
        "comparator": {"type": "in (Sequence)"},
        "right_operand": {"type": "DynamicOperand", "operand_name": "classes"}
      },
      {
        "type": "BinaryStatement",
        "left_operand": {
          "type": "DynamicOperand",
          "operations": [{"type": "ExtractDetectionProperty", "property_name": "size"}]
        },
        "comparator": {"type": "(Number) >="},
        "right_operand": {
          "type": "DynamicOperand",
          "operand_name": "image",
          "operations": [
            {"type": "ExtractImageProperty", "property_name": "size"},
            {"type": "Multiply", "other": 0.02}
          ]
        }
      }
    ]
  }
}"#;

fn condition_workflow() -> Value {
  let filtering: Value = serde_json::from_str(FILTERING_OPERATION).unwrap();
  json!({
    "version": "1.0",
    "inputs": [
      {"type": "WorkflowImage", "name": "image"},
      {"type": "WorkflowParameter", "name": "classes"},
      {"type": "WorkflowParameter", "name": "detections_meeting_condition"}
    ],
    "steps": [
      {"type": "ObjectDetectionModel", "name": "a", "image": "$inputs.image", "model_id": "yolov8n-640"},
      {
        "type": "Condition",
        "name": "condition",
        "condition_statement": {
          "type": "StatementGroup",
          "statements": [{
            "type": "BinaryStatement",
            "left_operand": {
              "type": "DynamicOperand",
              "operand_name": "prediction",
              "operations": [filtering, {"type": "SequenceLength"}]
            },
            "comparator": {"type": "(Number) >="},
            "right_operand": {"type": "DynamicOperand", "operand_name": "detections_meeting_condition"}
          }]
        },
        "evaluation_parameters": {
          "image": "$inputs.image",
          "prediction": "$steps.a.predictions",
          "classes": "$inputs.classes",
          "detections_meeting_condition": "$inputs.detections_meeting_condition"
        },
        "steps_if_true": ["$steps.b"],
        "steps_if_false": ["$steps.c"]
      },
      {"type": "ObjectDetectionModel", "name": "b", "image": "$inputs.image", "model_id": "yolov8n-640"},
      {"type": "ObjectDetectionModel", "name": "c", "image": "$inputs.image", "model_id": "yolov8n-640"}
    ],
    "outputs": [
      {"type": "JsonField", "name": "predictions_b", "selector": "$steps.b.predictions"},
      {"type": "JsonField", "name": "predictions_c", "selector": "$steps.c.predictions"}
    ]
  })
}

fn crowd_and_dogs() -> Value {
  json!([
    image(
      "crowd",
      vec![
        detection("p1", "person", 200, 200, 200),
        detection("p2", "person", 500, 200, 200),
        detection("p3", "person", 800, 200, 200),
        detection("p4", "person", 800, 800, 20),
      ],
    ),
    image(
      "dogs",
      vec![
        detection("d1", "dog", 200, 500, 300),
        detection("d2", "dog", 600, 500, 300),
      ],
    ),
  ])
}

#[tokio::test]
async fn test_condition_branches_each_element_independently() {
  let engine = engine(condition_workflow());
  let result = engine
    .run_async(params(vec![
      ("image", crowd_and_dogs()),
      ("classes", json!(["car", "person"])),
      ("detections_meeting_condition", json!(2)),
    ]))
    .await
    .unwrap();

  assert_eq!(result.len(), 2);
  // three big persons in the crowd image
  assert_eq!(result[0]["predictions_b"].as_array().unwrap().len(), 4);
  assert!(result[0]["predictions_c"].is_null());
  // no car or person among the dogs
  assert!(result[1]["predictions_b"].is_null());
  assert_eq!(result[1]["predictions_c"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_condition_threshold_is_broadcast_to_every_element() {
  let engine = engine(condition_workflow());
  let result = engine
    .run_async(params(vec![
      ("image", crowd_and_dogs()),
      ("classes", json!(["car", "person"])),
      ("detections_meeting_condition", json!(4)),
    ]))
    .await
    .unwrap();

  assert!(result.iter().all(|record| record["predictions_b"].is_null()));
  assert!(result.iter().all(|record| record["predictions_c"].is_array()));
}

#[tokio::test]
async fn test_condition_evaluation_error_fails_the_run() {
  let engine = engine(condition_workflow());
  let err = engine
    .run_async(params(vec![
      ("image", crowd_and_dogs()),
      ("classes", json!(["car", "person"])),
      ("detections_meeting_condition", json!("two")),
    ]))
    .await
    .unwrap_err();

  match err {
    ExecutionError::StepExecution { step_name, source } => {
      assert_eq!(step_name, "condition");
      assert!(matches!(source, BlockError::Evaluation { .. }));
    }
    other => panic!("unexpected error: {other}"),
  }
}

fn crops_workflow() -> Value {
  json!({
    "version": "1.0",
    "inputs": [{"type": "WorkflowImage", "name": "image"}],
    "steps": [
      {"type": "ObjectDetectionModel", "name": "first_detection", "image": "$inputs.image", "model_id": "yolov8n-640"},
      {
        "type": "DetectionsTransformation",
        "name": "enlarging_boxes",
        "predictions": "$steps.first_detection.predictions",
        "operations": [{"type": "DetectionsOffset", "offset_x": 50, "offset_y": 50}]
      },
      {"type": "Crop", "name": "first_crop", "image": "$inputs.image", "predictions": "$steps.enlarging_boxes.predictions"},
      {
        "type": "ObjectDetectionModel",
        "name": "second_detection",
        "image": "$steps.first_crop.crops",
        "model_id": "yolov8n-640",
        "class_filter": ["dog"]
      },
      {
        "type": "ContinueIf",
        "name": "continue_if",
        "condition_statement": {
          "type": "StatementGroup",
          "statements": [{
            "type": "BinaryStatement",
            "left_operand": {
              "type": "DynamicOperand",
              "operand_name": "prediction",
              "operations": [{"type": "SequenceLength"}]
            },
            "comparator": {"type": "(Number) =="},
            "right_operand": {"type": "StaticOperand", "value": 1}
          }]
        },
        "evaluation_parameters": {"prediction": "$steps.second_detection.predictions"},
        "next_steps": ["$steps.classification"]
      },
      {"type": "ClassificationModel", "name": "classification", "image": "$steps.first_crop.crops", "model_id": "dog-breed-xpaq6/1"}
    ],
    "outputs": [
      {"type": "JsonField", "name": "dog_classification", "selector": "$steps.classification.predictions"}
    ]
  })
}

fn with_nested(mut detection: Value, nested: Value) -> Value {
  detection["detections"] = nested;
  detection
}

#[tokio::test]
async fn test_branching_on_increased_dimensionality() {
  let engine = engine(crops_workflow());

  let crowd: Vec<Value> = (0..12)
    .map(|i| detection(&format!("p{i}"), "person", 60 + 70 * i, 500, 40))
    .collect();
  let dogs = vec![
    with_nested(
      detection("d1", "dog", 200, 200, 100),
      json!([detection("d1a", "dog", 50, 50, 30)]),
    ),
    with_nested(
      detection("d2", "dog", 500, 500, 100),
      json!([
        detection("d2a", "dog", 30, 30, 20),
        detection("d2b", "dog", 70, 70, 20)
      ]),
    ),
    with_nested(
      detection("d3", "dog", 800, 800, 100),
      json!([
        detection("d3a", "dog", 50, 50, 30),
        detection("d3b", "person", 20, 20, 10)
      ]),
    ),
  ];

  let result = engine
    .run_async(params(vec![(
      "image",
      json!([image("crowd", crowd), image("dogs", dogs)]),
    )]))
    .await
    .unwrap();

  assert_eq!(result.len(), 2);
  assert_eq!(
    result[0]["dog_classification"],
    Value::Array(vec![Value::Null; 12]),
    "no crop of the crowd image holds exactly one dog"
  );
  let dog_results = result[1]["dog_classification"].as_array().unwrap();
  assert_eq!(dog_results.len(), 3);
  assert_eq!(dog_results.iter().filter(|r| !r.is_null()).count(), 2);
  assert!(dog_results[1].is_null());
  assert_eq!(dog_results[0]["parent_id"], json!("d1"));
}

fn crops_and_collapse_workflow() -> Value {
  let mut definition = crops_workflow();
  definition["steps"].as_array_mut().unwrap().push(json!({
    "type": "DimensionCollapse",
    "name": "collapse",
    "data": "$steps.classification.predictions"
  }));
  definition["outputs"].as_array_mut().unwrap().push(json!({
    "type": "JsonField",
    "name": "collapsed",
    "selector": "$steps.collapse.output"
  }));
  definition
}

#[tokio::test]
async fn test_collapse_keeps_a_slot_for_every_masked_child() {
  let engine = engine(crops_and_collapse_workflow());

  let crowd: Vec<Value> = (0..12)
    .map(|i| detection(&format!("p{i}"), "person", 60 + 70 * i, 500, 40))
    .collect();
  let dogs = vec![
    with_nested(
      detection("d1", "dog", 200, 200, 100),
      json!([detection("d1a", "dog", 50, 50, 30)]),
    ),
    with_nested(
      detection("d2", "dog", 500, 500, 100),
      json!([
        detection("d2a", "dog", 30, 30, 20),
        detection("d2b", "dog", 70, 70, 20)
      ]),
    ),
  ];

  let result = engine
    .run_async(params(vec![(
      "image",
      json!([image("crowd", crowd), image("dogs", dogs), image("empty", vec![])]),
    )]))
    .await
    .unwrap();

  assert_eq!(result.len(), 3);
  // every crowd crop was stopped by continue_if
  assert_eq!(result[0]["collapsed"], Value::Array(vec![Value::Null; 12]));

  let dogs = result[1]["collapsed"].as_array().unwrap();
  assert_eq!(dogs.len(), 2);
  assert_eq!(dogs[0]["parent_id"], json!("d1"));
  assert!(dogs[1].is_null());

  // no crops at all, nothing to collapse
  assert!(result[2]["collapsed"].is_null());
}

fn count_at_least(operand: &str, threshold: u64) -> Value {
  json!({
    "type": "StatementGroup",
    "statements": [{
      "type": "BinaryStatement",
      "left_operand": {
        "type": "DynamicOperand",
        "operand_name": operand,
        "operations": [{"type": "SequenceLength"}]
      },
      "comparator": {"type": "(Number) >="},
      "right_operand": {"type": "StaticOperand", "value": threshold}
    }]
  })
}

#[tokio::test]
async fn test_nested_branches_narrow_the_batch() {
  let definition = json!({
    "version": "1.0",
    "inputs": [{"type": "WorkflowImage", "name": "image"}],
    "steps": [
      {"type": "ObjectDetectionModel", "name": "detection", "image": "$inputs.image"},
      {
        "type": "Condition",
        "name": "any_objects",
        "condition_statement": count_at_least("prediction", 1),
        "evaluation_parameters": {"prediction": "$steps.detection.predictions"},
        "steps_if_true": ["$steps.many_objects"]
      },
      {
        "type": "ContinueIf",
        "name": "many_objects",
        "condition_statement": count_at_least("prediction", 2),
        "evaluation_parameters": {"prediction": "$steps.detection.predictions"},
        "next_steps": ["$steps.second_pass"]
      },
      {"type": "ObjectDetectionModel", "name": "second_pass", "image": "$inputs.image"}
    ],
    "outputs": [
      {"type": "JsonField", "name": "second_pass", "selector": "$steps.second_pass.predictions"}
    ]
  });
  let engine = engine(definition);

  let result = engine
    .run_async(params(vec![(
      "image",
      json!([
        image("zero", vec![]),
        image("one", vec![detection("o1", "car", 100, 100, 50)]),
        image(
          "two",
          vec![
            detection("t1", "car", 100, 100, 50),
            detection("t2", "car", 400, 400, 50)
          ]
        ),
      ]),
    )]))
    .await
    .unwrap();

  assert_eq!(result.len(), 3);
  assert!(result[0]["second_pass"].is_null());
  assert!(result[1]["second_pass"].is_null());
  assert_eq!(result[2]["second_pass"].as_array().unwrap().len(), 2);
}
