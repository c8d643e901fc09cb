use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use retina_block_registry::{BlockRegistry, Kind, PropertyKind, PropertySpec};
use retina_config::{InputDef, StepDef, WorkflowDefinition};
use retina_workflow::{
  CompilationError, Edge, EdgeKind, ExecutionGraph, NodeId, PropertyValue, Selector,
};

use crate::resolved::{ResolvedInput, ResolvedOutput, ResolvedStep, ResolvedWorkflow};

/// Resolves definitions against a block registry.
pub struct WorkflowResolver<'a> {
  registry: &'a BlockRegistry,
}

impl<'a> WorkflowResolver<'a> {
  pub fn new(registry: &'a BlockRegistry) -> Self {
    Self { registry }
  }

  /// Resolve a workflow definition.
  ///
  /// This process:
  /// 1. Checks the version and name uniqueness
  /// 2. Looks up each step's block and interprets its properties
  /// 3. Validates every selector and kind
  /// 4. Builds the execution graph and rejects cycles
  pub fn resolve(&self, definition: &WorkflowDefinition) -> Result<ResolvedWorkflow, CompilationError> {
    if !definition.is_supported_version() {
      return Err(CompilationError::UnsupportedVersion {
        version: definition.version.clone(),
      });
    }

    check_unique("input", definition.inputs.iter().map(InputDef::name))?;
    check_unique("step", definition.steps.iter().map(|s| s.name.as_str()))?;
    check_unique("output", definition.outputs.iter().map(|o| o.name.as_str()))?;

    let inputs: Vec<ResolvedInput> = definition.inputs.iter().map(resolve_input).collect();

    let mut steps = Vec::with_capacity(definition.steps.len());
    for step in &definition.steps {
      steps.push(self.resolve_step(step)?);
    }

    let mut outputs = Vec::with_capacity(definition.outputs.len());
    for output in &definition.outputs {
      let selector = parse_output_selector(&output.selector)?;
      outputs.push(ResolvedOutput {
        name: output.name.clone(),
        selector,
      });
    }

    let lookup = Lookup {
      inputs: &inputs,
      steps: &steps,
    };
    for step in &steps {
      lookup.validate_step_references(step)?;
    }
    for output in &outputs {
      lookup.produced_kinds(&output.selector)?;
    }

    let graph = build_graph(&inputs, &steps, &outputs)?;
    detect_cycle(&graph)?;

    debug!(
      inputs = inputs.len(),
      steps = steps.len(),
      outputs = outputs.len(),
      edges = graph.edges().len(),
      "workflow_resolved"
    );

    Ok(ResolvedWorkflow {
      version: definition.version.clone(),
      inputs,
      steps,
      outputs,
      graph,
    })
  }

  /// Match a step to its block and interpret its properties.
  fn resolve_step(&self, step: &StepDef) -> Result<ResolvedStep, CompilationError> {
    let manifest = self
      .registry
      .manifest(&step.block_type)
      .ok_or_else(|| CompilationError::UnknownBlockType {
        step_name: step.name.clone(),
        block_type: step.block_type.clone(),
      })?
      .clone();

    for name in step.properties.keys() {
      if manifest.find_property(name).is_none() {
        return Err(CompilationError::InvalidStepProperty {
          step_name: step.name.clone(),
          property: name.clone(),
          message: format!("block '{}' has no such property", manifest.block_type),
        });
      }
    }

    let mut properties = IndexMap::with_capacity(manifest.properties.len());
    for spec in &manifest.properties {
      let raw = match step.properties.get(&spec.name).or(spec.default.as_ref()) {
        Some(raw) => raw,
        None if spec.required => {
          return Err(CompilationError::InvalidStepProperty {
            step_name: step.name.clone(),
            property: spec.name.clone(),
            message: "missing required property".to_string(),
          });
        }
        None => continue,
      };
      let value = interpret_property(&step.name, spec, raw)?;
      properties.insert(spec.name.clone(), value);
    }

    Ok(ResolvedStep {
      name: step.name.clone(),
      block_type: step.block_type.clone(),
      manifest,
      properties,
    })
  }
}

fn resolve_input(input: &InputDef) -> ResolvedInput {
  ResolvedInput {
    name: input.name().to_string(),
    dimensionality: input.dimensionality(),
    kinds: input.kinds().into_iter().map(Kind::new).collect(),
    default_value: input.default_value().cloned(),
  }
}

fn check_unique<'n>(kind: &str, names: impl Iterator<Item = &'n str>) -> Result<(), CompilationError> {
  let mut seen = HashSet::new();
  for name in names {
    if !seen.insert(name) {
      return Err(CompilationError::DuplicateName {
        kind: kind.to_string(),
        name: name.to_string(),
      });
    }
  }
  Ok(())
}

/// Interpret a raw property value according to its declared kind.
fn interpret_property(
  step_name: &str,
  spec: &PropertySpec,
  raw: &Value,
) -> Result<PropertyValue, CompilationError> {
  let invalid = |message: String| CompilationError::InvalidStepProperty {
    step_name: step_name.to_string(),
    property: spec.name.clone(),
    message,
  };

  match &spec.kind {
    PropertyKind::Data { .. } => {
      let value = PropertyValue::scalar(raw)?;
      if let PropertyValue::Selector(selector) = &value
        && !selector.is_data_reference()
      {
        return Err(CompilationError::InvalidReferenceTarget {
          selector: selector.to_string(),
          message: "a step reference can only be used as a flow-control target; select one of its outputs instead".to_string(),
        });
      }
      Ok(value)
    }
    PropertyKind::DataMap { .. } => {
      let object = raw
        .as_object()
        .ok_or_else(|| invalid("expected an object of named values".to_string()))?;
      let value = PropertyValue::map(object)?;
      if let Some(selector) = value.selectors().into_iter().find(|s| !s.is_data_reference()) {
        return Err(CompilationError::InvalidReferenceTarget {
          selector: selector.to_string(),
          message: "a step reference can only be used as a flow-control target".to_string(),
        });
      }
      Ok(value)
    }
    PropertyKind::StepTargets => {
      let raw_targets: Vec<&Value> = match raw {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
      };
      let mut targets = Vec::with_capacity(raw_targets.len());
      for target in raw_targets {
        let text = target
          .as_str()
          .ok_or_else(|| invalid("expected '$steps.<name>' references".to_string()))?;
        let selector = Selector::parse(text)?;
        if !matches!(selector, Selector::StepReference { .. }) {
          return Err(CompilationError::InvalidReferenceTarget {
            selector: text.to_string(),
            message: "flow-control targets must reference a step as '$steps.<name>'".to_string(),
          });
        }
        targets.push(selector);
      }
      Ok(PropertyValue::Targets(targets))
    }
    PropertyKind::Config => {
      if let Value::String(s) = raw
        && Selector::looks_like_selector(s)
      {
        return Err(invalid(format!("property does not accept selectors, got '{s}'")));
      }
      Ok(PropertyValue::Literal(raw.clone()))
    }
  }
}

fn parse_output_selector(raw: &str) -> Result<Selector, CompilationError> {
  let selector = Selector::parse(raw)?;
  if !selector.is_data_reference() {
    return Err(CompilationError::InvalidReferenceTarget {
      selector: raw.to_string(),
      message: "outputs must select data: use '$steps.<name>.<property>' or '$steps.<name>.*'".to_string(),
    });
  }
  Ok(selector)
}

struct Lookup<'r> {
  inputs: &'r [ResolvedInput],
  steps: &'r [ResolvedStep],
}

impl Lookup<'_> {
  fn step(&self, name: &str) -> Option<&ResolvedStep> {
    self.steps.iter().find(|step| step.name == name)
  }

  /// Kinds of the data a selector points at, or an error if it points nowhere.
  fn produced_kinds(&self, selector: &Selector) -> Result<Vec<Kind>, CompilationError> {
    let missing = |message: String| CompilationError::InvalidReferenceTarget {
      selector: selector.to_string(),
      message,
    };

    match selector {
      Selector::Input { name } => self
        .inputs
        .iter()
        .find(|input| &input.name == name)
        .map(|input| input.kinds.clone())
        .ok_or_else(|| missing(format!("input '{name}' is not declared"))),
      Selector::StepOutput { step, property } => {
        let target = self
          .step(step)
          .ok_or_else(|| missing(format!("step '{step}' is not declared")))?;
        target
          .manifest
          .find_output(property)
          .map(|output| output.kinds.clone())
          .ok_or_else(|| {
            missing(format!(
              "step '{step}' of type '{}' has no output '{property}'",
              target.block_type
            ))
          })
      }
      Selector::StepWildcard { step } | Selector::StepReference { step } => {
        self
          .step(step)
          .ok_or_else(|| missing(format!("step '{step}' is not declared")))?;
        Ok(vec![Kind::WILDCARD])
      }
    }
  }

  fn validate_step_references(&self, step: &ResolvedStep) -> Result<(), CompilationError> {
    for (name, value) in &step.properties {
      let accepted = step
        .manifest
        .find_property(name)
        .map(|spec| spec.accepted_kinds().to_vec())
        .unwrap_or_default();

      for selector in value.selectors() {
        let produced = self.produced_kinds(selector)?;
        if let PropertyValue::Targets(_) = value {
          if selector.step_name() == Some(step.name.as_str()) {
            return Err(CompilationError::InvalidReferenceTarget {
              selector: selector.to_string(),
              message: format!("step '{}' cannot target itself", step.name),
            });
          }
          continue;
        }
        if !Kind::compatible(&produced, &accepted) {
          return Err(CompilationError::ReferenceType {
            selector: selector.to_string(),
            message: format!(
              "property '{name}' of step '{}' accepts [{}] but the reference provides [{}]",
              step.name,
              join_kinds(&accepted),
              join_kinds(&produced)
            ),
          });
        }
      }
    }
    Ok(())
  }
}

fn join_kinds(kinds: &[Kind]) -> String {
  kinds
    .iter()
    .map(Kind::name)
    .collect::<Vec<_>>()
    .join(", ")
}

fn build_graph(
  inputs: &[ResolvedInput],
  steps: &[ResolvedStep],
  outputs: &[ResolvedOutput],
) -> Result<ExecutionGraph, CompilationError> {
  let mut nodes = Vec::with_capacity(inputs.len() + steps.len() + outputs.len());
  nodes.extend(inputs.iter().map(|i| NodeId::Input(i.name.clone())));
  nodes.extend(steps.iter().map(|s| NodeId::Step(s.name.clone())));
  nodes.extend(outputs.iter().map(|o| NodeId::Output(o.name.clone())));

  let mut edges = Vec::new();
  for step in steps {
    let node = NodeId::Step(step.name.clone());
    for value in step.properties.values() {
      let kind = match value {
        PropertyValue::Targets(_) => EdgeKind::Control,
        _ => EdgeKind::Data,
      };
      for selector in value.selectors() {
        let edge = match kind {
          EdgeKind::Data => Edge {
            from: selector.node(),
            to: node.clone(),
            kind,
          },
          EdgeKind::Control => Edge {
            from: node.clone(),
            to: selector.node(),
            kind,
          },
        };
        edges.push(edge);
      }
    }
  }
  for output in outputs {
    edges.push(Edge {
      from: output.selector.node(),
      to: NodeId::Output(output.name.clone()),
      kind: EdgeKind::Data,
    });
  }

  ExecutionGraph::new(nodes, edges)
}

/// Check for cycles using DFS.
fn detect_cycle(graph: &ExecutionGraph) -> Result<(), CompilationError> {
  // DFS with coloring: 0 = white (unvisited), 1 = gray (in progress), 2 = black (done)
  let mut color: HashMap<&NodeId, u8> = graph.nodes().iter().map(|node| (node, 0u8)).collect();

  fn dfs<'a>(
    node: &'a NodeId,
    graph: &'a ExecutionGraph,
    color: &mut HashMap<&'a NodeId, u8>,
  ) -> Option<&'a NodeId> {
    color.insert(node, 1);

    for (neighbor, _) in graph.downstream(node) {
      match color.get(neighbor) {
        Some(1) => return Some(neighbor), // Back edge = cycle
        Some(0) => {
          if let Some(found) = dfs(neighbor, graph, color) {
            return Some(found);
          }
        }
        _ => {}
      }
    }

    color.insert(node, 2);
    None
  }

  for node in graph.nodes() {
    if color.get(node) == Some(&0)
      && let Some(found) = dfs(node, graph, &mut color)
    {
      return Err(CompilationError::ExecutionGraphStructure {
        message: format!("cycle detected involving {found}"),
      });
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use async_trait::async_trait;
  use retina_block_registry::{
    Block, BlockError, BlockInput, BlockManifest, OutputSpec, StepContext, StepOutput,
  };
  use serde_json::json;

  use super::*;

  struct Stub {
    manifest: BlockManifest,
  }

  #[async_trait]
  impl Block for Stub {
    fn manifest(&self) -> &BlockManifest {
      &self.manifest
    }

    async fn execute(&self, _ctx: &StepContext, _input: BlockInput) -> Result<StepOutput, BlockError> {
      Ok(StepOutput::Values(Default::default()))
    }
  }

  fn registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    let manifests = [
      BlockManifest::new("Detector")
        .batch_oriented()
        .property(PropertySpec::batch("image", [Kind::IMAGE]))
        .property(PropertySpec::config("confidence").with_default(json!(0.4)))
        .output(OutputSpec::new("predictions", [Kind::OBJECT_DETECTION_PREDICTION])),
      BlockManifest::new("Gate")
        .flow_control()
        .property(PropertySpec::data_map("evaluation_parameters", [Kind::WILDCARD]).with_default(json!({})))
        .property(PropertySpec::step_targets("next_steps")),
    ];
    for manifest in manifests {
      registry.register(Arc::new(Stub { manifest })).unwrap();
    }
    registry
  }

  fn definition(steps: serde_json::Value, outputs: serde_json::Value) -> WorkflowDefinition {
    WorkflowDefinition::from_value(json!({
      "version": "1.0",
      "inputs": [{"type": "WorkflowImage", "name": "image"}],
      "steps": steps,
      "outputs": outputs,
    }))
    .unwrap()
  }

  fn resolve(definition: &WorkflowDefinition) -> Result<ResolvedWorkflow, CompilationError> {
    let registry = registry();
    WorkflowResolver::new(&registry).resolve(definition)
  }

  #[test]
  fn test_resolve_simple_workflow() {
    let def = definition(
      json!([{"type": "Detector", "name": "detection", "image": "$inputs.image"}]),
      json!([{"type": "JsonField", "name": "out", "selector": "$steps.detection.predictions"}]),
    );
    let resolved = resolve(&def).unwrap();

    let step = resolved.step("detection").unwrap();
    assert_eq!(
      step.properties.get("confidence"),
      Some(&PropertyValue::Literal(json!(0.4)))
    );
    assert_eq!(
      resolved.graph.upstream(&NodeId::Step("detection".to_string())),
      &[(NodeId::Input("image".to_string()), EdgeKind::Data)]
    );
  }

  #[test]
  fn test_dangling_input_reference_names_selector() {
    let def = definition(
      json!([{"type": "Detector", "name": "detection", "image": "$inputs.non_existing"}]),
      json!([]),
    );
    let err = resolve(&def).unwrap_err();
    assert!(matches!(err, CompilationError::InvalidReferenceTarget { .. }));
    assert!(err.to_string().contains("$inputs.non_existing"));
  }

  #[test]
  fn test_dangling_output_references_name_selector() {
    for selector in ["$steps.non_existing.predictions", "$steps.detection.dummy"] {
      let def = definition(
        json!([{"type": "Detector", "name": "detection", "image": "$inputs.image"}]),
        json!([{"type": "JsonField", "name": "out", "selector": selector}]),
      );
      let err = resolve(&def).unwrap_err();
      assert!(err.to_string().contains(selector), "{err}");
    }
  }

  #[test]
  fn test_dangling_flow_control_target_names_selector() {
    let def = definition(
      json!([{"type": "Gate", "name": "gate", "next_steps": ["$steps.not_existing"]}]),
      json!([]),
    );
    let err = resolve(&def).unwrap_err();
    assert!(err.to_string().contains("$steps.not_existing"));
  }

  #[test]
  fn test_unknown_block_type() {
    let def = definition(json!([{"type": "Missing", "name": "x"}]), json!([]));
    assert_eq!(
      resolve(&def).unwrap_err(),
      CompilationError::UnknownBlockType {
        step_name: "x".to_string(),
        block_type: "Missing".to_string()
      }
    );
  }

  #[test]
  fn test_unknown_and_missing_properties() {
    let def = definition(
      json!([{"type": "Detector", "name": "d", "image": "$inputs.image", "colour": "red"}]),
      json!([]),
    );
    assert!(matches!(
      resolve(&def).unwrap_err(),
      CompilationError::InvalidStepProperty { property, .. } if property == "colour"
    ));

    let def = definition(json!([{"type": "Detector", "name": "d"}]), json!([]));
    assert!(matches!(
      resolve(&def).unwrap_err(),
      CompilationError::InvalidStepProperty { property, .. } if property == "image"
    ));
  }

  #[test]
  fn test_config_property_rejects_selector() {
    let def = definition(
      json!([{"type": "Detector", "name": "d", "image": "$inputs.image", "confidence": "$inputs.image"}]),
      json!([]),
    );
    assert!(matches!(
      resolve(&def).unwrap_err(),
      CompilationError::InvalidStepProperty { property, .. } if property == "confidence"
    ));
  }

  #[test]
  fn test_kind_mismatch() {
    let def = definition(
      json!([
        {"type": "Detector", "name": "a", "image": "$inputs.image"},
        {"type": "Detector", "name": "b", "image": "$steps.a.predictions"}
      ]),
      json!([]),
    );
    let err = resolve(&def).unwrap_err();
    assert!(matches!(err, CompilationError::ReferenceType { ref selector, .. } if selector == "$steps.a.predictions"));
  }

  #[test]
  fn test_duplicate_step_names() {
    let def = definition(
      json!([
        {"type": "Detector", "name": "a", "image": "$inputs.image"},
        {"type": "Detector", "name": "a", "image": "$inputs.image"}
      ]),
      json!([]),
    );
    assert_eq!(
      resolve(&def).unwrap_err(),
      CompilationError::DuplicateName {
        kind: "step".to_string(),
        name: "a".to_string()
      }
    );
  }

  #[test]
  fn test_cycle_through_control_edge_is_rejected() {
    let def = definition(
      json!([
        {"type": "Detector", "name": "a", "image": "$inputs.image"},
        {"type": "Gate", "name": "gate",
          "evaluation_parameters": {"p": "$steps.a.predictions"},
          "next_steps": ["$steps.a"]}
      ]),
      json!([]),
    );
    assert!(matches!(
      resolve(&def).unwrap_err(),
      CompilationError::ExecutionGraphStructure { .. }
    ));
  }

  #[test]
  fn test_self_target_is_rejected() {
    let def = definition(
      json!([{"type": "Gate", "name": "gate", "next_steps": "$steps.gate"}]),
      json!([]),
    );
    assert!(matches!(
      resolve(&def).unwrap_err(),
      CompilationError::InvalidReferenceTarget { .. }
    ));
  }

  #[test]
  fn test_flow_targets_and_control_edges() {
    let def = definition(
      json!([
        {"type": "Gate", "name": "gate", "next_steps": ["$steps.a", "$steps.a"]},
        {"type": "Detector", "name": "a", "image": "$inputs.image"}
      ]),
      json!([{"type": "JsonField", "name": "all", "selector": "$steps.a.*"}]),
    );
    let resolved = resolve(&def).unwrap();
    assert_eq!(resolved.step("gate").unwrap().flow_targets(), vec!["a"]);
    assert!(resolved.graph.edges().contains(&Edge {
      from: NodeId::Step("gate".to_string()),
      to: NodeId::Step("a".to_string()),
      kind: EdgeKind::Control,
    }));
  }

  #[test]
  fn test_unsupported_version() {
    let def = WorkflowDefinition::from_value(json!({"version": "2.0"})).unwrap();
    assert!(matches!(
      resolve(&def).unwrap_err(),
      CompilationError::UnsupportedVersion { .. }
    ));
  }
}
