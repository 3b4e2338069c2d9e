//! Workflow manifests
//!
//! A manifest is the portable, serialized form of a pipeline: agent
//! definitions with their parser kinds plus named workflows of steps.
//! Manifests are authored in YAML (or JSON) and built into a live pipeline
//! against a router.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use showrunner_core::{
    AgentConfig, ExecutionDefaults, ShowrunnerError, ShowrunnerResult, WorkflowStep,
};
use showrunner_llm::FunctionRouter;

use crate::agent::Agent;
use crate::parsers::ParserKind;
use crate::pipeline::Pipeline;
use crate::pool::AgentPool;

/// Agent definition inside a manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestAgent {
    /// Agent configuration
    #[serde(flatten)]
    pub config: AgentConfig,

    /// Parser bound to the agent
    #[serde(default)]
    pub parser: ParserKind,
}

/// Named workflow inside a manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestWorkflow {
    /// Workflow name
    pub name: String,

    /// Ordered steps
    pub steps: Vec<WorkflowStep>,
}

/// Portable pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowManifest {
    /// Pipeline name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Pool concurrency override; engine default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Agent definitions
    pub agents: Vec<ManifestAgent>,

    /// Named workflows
    pub workflows: Vec<ManifestWorkflow>,
}

impl WorkflowManifest {
    /// Parse a manifest from YAML
    pub fn from_yaml(yaml: &str) -> ShowrunnerResult<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ShowrunnerError::config(format!("failed to parse manifest YAML: {}", e)))
    }

    /// Parse a manifest from JSON
    pub fn from_json(json: &str) -> ShowrunnerResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ShowrunnerError::config(format!("failed to parse manifest JSON: {}", e)))
    }

    /// Load a manifest file; format picked by extension
    pub fn from_file(path: impl AsRef<Path>) -> ShowrunnerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShowrunnerError::config(format!("failed to read manifest {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Serialize back to YAML
    pub fn to_yaml(&self) -> ShowrunnerResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| ShowrunnerError::config(format!("failed to serialize manifest: {}", e)))
    }

    /// Validate internal consistency without building anything
    pub fn validate(&self) -> ShowrunnerResult<()> {
        let mut names = std::collections::HashSet::new();
        for agent in &self.agents {
            if !names.insert(agent.config.name.as_str()) {
                return Err(ShowrunnerError::config(format!(
                    "duplicate agent name in manifest: {}",
                    agent.config.name
                )));
            }
            if agent.config.retry_count == 0 {
                return Err(ShowrunnerError::config(format!(
                    "agent '{}' has retry_count 0",
                    agent.config.name
                )));
            }
        }
        if self.workflows.is_empty() {
            return Err(ShowrunnerError::config("manifest defines no workflows"));
        }
        Ok(())
    }

    /// Build a live pipeline: bind every agent to the router, register the
    /// pool, and define every workflow (which validates step arities).
    pub fn build_pipeline(
        &self,
        router: Arc<FunctionRouter>,
        defaults: &ExecutionDefaults,
    ) -> ShowrunnerResult<Pipeline> {
        self.validate()?;

        let concurrency = self.concurrency.unwrap_or(defaults.parallel_agents);
        let mut pool = AgentPool::new(concurrency);
        for manifest_agent in &self.agents {
            let agent = Agent::with_parser(
                manifest_agent.config.clone(),
                Arc::clone(&router),
                manifest_agent.parser.parser(),
            );
            pool.register(agent);
        }

        let mut pipeline = Pipeline::new(self.name.clone(), pool).with_defaults(defaults.clone());
        for workflow in &self.workflows {
            pipeline.define_workflow(workflow.name.clone(), workflow.steps.clone())?;
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
name: storyboard
description: Consensus tagging then a directed synthesis
concurrency: 4
agents:
  - name: tagger-narrative
    function: tag_validation
    system_prompt: "You extract narrative tags."
    template: "Extract tags from:\n{text}"
    parser: tag_list
  - name: tagger-visual
    function: tag_validation
    system_prompt: "You extract visual tags."
    template: "Extract tags from:\n{text}"
    parser: tag_list
  - name: writer
    function: story_generation
    retry_count: 2
workflows:
  - name: tag-and-write
    steps:
      - name: extract
        agents: [tagger-narrative, tagger-visual]
        mode: consensus
        output_key: tags
        consensus:
          policy: majority
          threshold: 0.5
      - name: write
        agents: [writer]
        mode: parallel
        output_key: draft
        required: false
"#
    }

    #[test]
    fn test_parse_manifest_yaml() {
        let manifest = WorkflowManifest::from_yaml(sample_yaml()).unwrap();
        assert_eq!(manifest.name, "storyboard");
        assert_eq!(manifest.concurrency, Some(4));
        assert_eq!(manifest.agents.len(), 3);
        assert_eq!(manifest.agents[0].parser, ParserKind::TagList);
        assert_eq!(manifest.agents[2].parser, ParserKind::RawText);
        assert_eq!(manifest.agents[2].config.retry_count, 2);

        let workflow = &manifest.workflows[0];
        assert_eq!(workflow.steps.len(), 2);
        assert!(workflow.steps[0].required);
        assert!(!workflow.steps[1].required);
        assert_eq!(
            workflow.steps[0].consensus.as_ref().unwrap().threshold,
            Some(0.5)
        );

        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_manifest_roundtrip() {
        let manifest = WorkflowManifest::from_yaml(sample_yaml()).unwrap();
        let yaml = manifest.to_yaml().unwrap();
        let back = WorkflowManifest::from_yaml(&yaml).unwrap();
        assert_eq!(back.name, manifest.name);
        assert_eq!(back.agents.len(), manifest.agents.len());
        assert_eq!(back.workflows[0].steps.len(), 2);
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let yaml = r#"
name: bad
agents:
  - name: same
    function: f
  - name: same
    function: f
workflows:
  - name: w
    steps:
      - name: s
        agents: [same]
        mode: parallel
"#;
        let manifest = WorkflowManifest::from_yaml(yaml).unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_no_workflows_rejected() {
        let yaml = r#"
name: empty
agents: []
workflows: []
"#;
        let manifest = WorkflowManifest::from_yaml(yaml).unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_build_pipeline_validates_steps() {
        let yaml = r#"
name: broken
agents:
  - name: real
    function: f
workflows:
  - name: w
    steps:
      - name: s
        agents: [ghost]
        mode: parallel
"#;
        let manifest = WorkflowManifest::from_yaml(yaml).unwrap();
        let router = Arc::new(FunctionRouter::empty());
        let err = manifest
            .build_pipeline(router, &ExecutionDefaults::default())
            .unwrap_err();
        assert!(err.to_string().contains("unregistered agent 'ghost'"));
    }
}
