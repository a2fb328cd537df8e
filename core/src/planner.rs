//! Planner (spec §4.G): validates a model-emitted plan as an acyclic step
//! graph. Grounded on the teacher's `plan_tool` (a model-facing structured
//! plan the agent renders to the user), generalized from its flat
//! `Vec<PlanItemArg>` to the spec's `{id, description, dependencies, expected_tool}`
//! dependency graph, since re-planning and step blocking need to reason
//! about which steps are ready rather than just "next in list order".

use std::collections::HashMap;
use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use crate::error::CoreError;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Blocked,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub expected_tool: Option<String>,
    #[serde(default = "default_pending")]
    pub status: StepStatus,
}

fn default_pending() -> StepStatus {
    StepStatus::Pending
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub title: String,
    pub steps: Vec<PlanStep>,
}

/// Model-facing raw shape before validation, matching the JSON the spec
/// tells the model to emit: `{title, steps: [{id, description, dependencies: [id]?, expected_tool?}]}`.
#[derive(Debug, Deserialize)]
struct RawPlan {
    title: String,
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    id: String,
    description: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    expected_tool: Option<String>,
}

pub const DEFAULT_MAX_PARSE_RETRIES: u32 = 2;
pub const DEFAULT_MAX_REPLANS: u32 = 3;

impl Plan {
    /// Parse and validate a plan from the model's raw JSON text. Rejects
    /// malformed JSON, duplicate ids, dependencies on unknown ids, and
    /// dependency cycles.
    pub fn parse(raw_json: &str) -> Result<Self> {
        let raw: RawPlan = serde_json::from_str(raw_json)
            .map_err(|e| CoreError::InvalidArgs(format!("plan did not parse as JSON: {e}")))?;

        let mut seen = HashSet::new();
        for step in &raw.steps {
            if !seen.insert(step.id.clone()) {
                return Err(CoreError::InvalidArgs(format!("duplicate step id '{}'", step.id)));
            }
        }

        let ids: HashSet<&str> = raw.steps.iter().map(|s| s.id.as_str()).collect();
        for step in &raw.steps {
            for dep in &step.dependencies {
                if !ids.contains(dep.as_str()) {
                    return Err(CoreError::InvalidArgs(format!(
                        "step '{}' depends on unknown step id '{dep}'",
                        step.id
                    )));
                }
            }
        }

        let plan = Plan {
            title: raw.title,
            steps: raw
                .steps
                .into_iter()
                .map(|s| PlanStep {
                    id: s.id,
                    description: s.description,
                    dependencies: s.dependencies,
                    expected_tool: s.expected_tool,
                    status: StepStatus::Pending,
                })
                .collect(),
        };

        plan.check_acyclic()?;
        Ok(plan)
    }

    fn check_acyclic(&self) -> Result<()> {
        let by_id: HashMap<&str, &PlanStep> = self.steps.iter().map(|s| (s.id.as_str(), s)).collect();

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = self.steps.iter().map(|s| (s.id.as_str(), Mark::Unvisited)).collect();

        fn visit<'a>(
            id: &'a str,
            by_id: &HashMap<&'a str, &'a PlanStep>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<()> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => {
                    return Err(CoreError::InvalidArgs(format!("dependency cycle detected at step '{id}'")));
                }
                _ => {}
            }
            marks.insert(id, Mark::InProgress);
            if let Some(step) = by_id.get(id) {
                for dep in &step.dependencies {
                    visit(dep, by_id, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        for id in by_id.keys() {
            visit(id, &by_id, &mut marks)?;
        }
        Ok(())
    }

    /// Steps whose dependencies are all completed and which are not yet
    /// completed themselves — the set the agent loop may execute next.
    pub fn ready_steps(&self) -> Vec<&PlanStep> {
        let completed: HashSet<&str> = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.id.as_str())
            .collect();
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .filter(|s| s.dependencies.iter().all(|d| completed.contains(d.as_str())))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    pub fn mark(&mut self, id: &str, status: StepStatus) {
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == id) {
            step.status = status;
        }
    }
}

/// Tracks the session-level replan cap (spec §4.G: "prevents livelock").
pub struct ReplanBudget {
    remaining: u32,
}

impl ReplanBudget {
    pub fn new(max_replans: u32) -> Self {
        Self { remaining: max_replans }
    }

    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_plan_with_dependencies() {
        let json = r#"{"title":"t","steps":[
            {"id":"a","description":"first"},
            {"id":"b","description":"second","dependencies":["a"],"expected_tool":"read_file"}
        ]}"#;
        let plan = Plan::parse(json).expect("parse");
        assert_eq!(plan.steps.len(), 2);
        let ready: Vec<&str> = plan.ready_steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ready, vec!["a"]);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let json = r#"{"title":"t","steps":[{"id":"a","description":"x"},{"id":"a","description":"y"}]}"#;
        assert!(Plan::parse(json).is_err());
    }

    #[test]
    fn rejects_unknown_dependency() {
        let json = r#"{"title":"t","steps":[{"id":"a","description":"x","dependencies":["missing"]}]}"#;
        assert!(Plan::parse(json).is_err());
    }

    #[test]
    fn rejects_cycles() {
        let json = r#"{"title":"t","steps":[
            {"id":"a","description":"x","dependencies":["b"]},
            {"id":"b","description":"y","dependencies":["a"]}
        ]}"#;
        assert!(Plan::parse(json).is_err());
    }

    #[test]
    fn ready_steps_unblock_after_dependency_completes() {
        let json = r#"{"title":"t","steps":[
            {"id":"a","description":"x"},
            {"id":"b","description":"y","dependencies":["a"]}
        ]}"#;
        let mut plan = Plan::parse(json).expect("parse");
        plan.mark("a", StepStatus::Completed);
        let ready: Vec<&str> = plan.ready_steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ready, vec!["b"]);
    }

    #[test]
    fn replan_budget_is_exhaustible() {
        let mut budget = ReplanBudget::new(1);
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
    }
}
