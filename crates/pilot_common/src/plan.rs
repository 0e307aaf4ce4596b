//! Structured-output parsing for reasoning-service replies.
//!
//! The service returns prose that should contain JSON but often wraps it in
//! markdown fences or commentary. The contract here is a single entry point
//! per shape (`parse_plan`, `parse_weekly_analysis`, `extract_actions_block`)
//! taking the raw string and returning a typed result - the heuristics live
//! behind it and are unit-tested on their own.

use crate::actions::{Action, CriteriaUpdate, GoalsUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("no JSON object found in reasoning output")]
    NoJson,

    #[error("invalid plan JSON: {0}")]
    Invalid(String),
}

/// One action from a plan, kept raw so an unknown type can still be reported
/// (and recorded) instead of silently vanishing at parse time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAction {
    #[serde(flatten)]
    pub raw: Value,
}

impl PlanAction {
    pub fn type_name(&self) -> String {
        self.raw.get("type").and_then(|t| t.as_str()).unwrap_or("?").to_string()
    }

    pub fn auto_execute(&self) -> bool {
        self.raw.get("auto_execute").and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Parse into the closed action vocabulary. Extra keys such as
    /// `auto_execute` are ignored by the tagged enum.
    pub fn parse(&self) -> Result<Action, String> {
        serde_json::from_value(self.raw.clone()).map_err(|_| self.type_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlannedExperiment {
    pub kind: String,
    pub description: String,
    pub hypothesis: String,
    pub variants: Vec<String>,
    pub metric: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlannedLearning {
    pub category: String,
    pub summary: String,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlannedDiagnostic {
    pub kind: Option<String>,
    pub priority: Option<String>,
    pub category: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// A brain-cycle plan. Missing array fields deserialize to empty.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Plan {
    pub reasoning: String,
    pub actions: Vec<PlanAction>,
    pub experiments: Vec<PlannedExperiment>,
    pub learnings: Vec<PlannedLearning>,
    pub diagnostic_items: Vec<PlannedDiagnostic>,
    pub weekly_assessment: Option<String>,
    /// Set when the plan was produced by the deterministic fallback instead
    /// of the reasoning service.
    #[serde(skip_deserializing)]
    pub fallback: bool,
}

/// Weekly analysis reply shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WeeklyAnalysis {
    pub analysis: String,
    pub criteria_updates: Option<CriteriaUpdate>,
    pub goal_updates: Option<GoalsUpdate>,
    pub learnings: Vec<PlannedLearning>,
    pub experiments: Vec<PlannedExperiment>,
}

/// Strip markdown code fences around the whole payload, if any.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// First balanced `{...}` object in the text, ignoring braces inside JSON
/// strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the first JSON object from free-form reasoning output.
pub fn extract_json(raw: &str) -> Result<Value, ParseError> {
    let cleaned = strip_fences(raw);

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        if value.is_object() {
            return Ok(value);
        }
    }

    let candidate = first_balanced_object(cleaned).ok_or(ParseError::NoJson)?;
    serde_json::from_str(candidate).map_err(|e| ParseError::Invalid(e.to_string()))
}

/// Parse a brain-cycle plan out of raw reasoning output.
pub fn parse_plan(raw: &str) -> Result<Plan, ParseError> {
    let value = extract_json(raw)?;
    serde_json::from_value(value).map_err(|e| ParseError::Invalid(e.to_string()))
}

/// Parse a weekly analysis out of raw reasoning output.
pub fn parse_weekly_analysis(raw: &str) -> Result<WeeklyAnalysis, ParseError> {
    let value = extract_json(raw)?;
    serde_json::from_value(value).map_err(|e| ParseError::Invalid(e.to_string()))
}

/// Split a conversational reply into visible text and the entries of an
/// optional `<actions>[...]</actions>` block. A malformed block is dropped
/// entirely - chat must stay readable even when the JSON is not.
pub fn extract_actions_block(text: &str) -> (String, Vec<Value>) {
    const OPEN: &str = "<actions>";
    const CLOSE: &str = "</actions>";

    let Some(start) = text.find(OPEN) else {
        return (text.trim().to_string(), Vec::new());
    };
    let Some(end) = text[start..].find(CLOSE).map(|i| start + i) else {
        return (text.trim().to_string(), Vec::new());
    };

    let block = text[start + OPEN.len()..end].trim();
    let mut visible = String::new();
    visible.push_str(&text[..start]);
    visible.push_str(&text[end + CLOSE.len()..]);

    let entries = serde_json::from_str::<Vec<Value>>(strip_fences(block)).unwrap_or_default();
    (visible.trim().to_string(), entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_json() {
        let plan = parse_plan(r#"{"reasoning": "rien a faire", "actions": []}"#).unwrap();
        assert_eq!(plan.reasoning, "rien a faire");
        assert!(plan.actions.is_empty());
        assert!(!plan.fallback);
    }

    #[test]
    fn test_fenced_json() {
        let raw = "```json\n{\"reasoning\": \"ok\", \"actions\": []}\n```";
        let plan = parse_plan(raw).unwrap();
        assert_eq!(plan.reasoning, "ok");
    }

    #[test]
    fn test_prose_wrapped_json() {
        let raw = "Voici mon plan pour la semaine :\n{\"reasoning\": \"relance\", \"actions\": [{\"type\": \"search_leads\", \"auto_execute\": true}]}\nBonne journee.";
        let plan = parse_plan(raw).unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert!(plan.actions[0].auto_execute());
        assert_eq!(plan.actions[0].type_name(), "search_leads");
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_the_scan() {
        let raw = r#"note: {"reasoning": "utilise {placeholders} dans l'objet", "actions": []} fin"#;
        let plan = parse_plan(raw).unwrap();
        assert!(plan.reasoning.contains("{placeholders}"));
    }

    #[test]
    fn test_missing_arrays_default_to_empty() {
        let plan = parse_plan(r#"{"reasoning": "minimal"}"#).unwrap();
        assert!(plan.actions.is_empty());
        assert!(plan.experiments.is_empty());
        assert!(plan.learnings.is_empty());
        assert!(plan.diagnostic_items.is_empty());
        assert!(plan.weekly_assessment.is_none());
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(parse_plan("desole, je ne peux pas"), Err(ParseError::NoJson)));
        assert!(parse_plan("").is_err());
    }

    #[test]
    fn test_plan_action_parses_into_vocabulary() {
        let raw = r#"{"reasoning": "", "actions": [
            {"type": "send_email", "to": "a@b.com", "generate_first": true, "auto_execute": true},
            {"type": "format_disk", "auto_execute": true}
        ]}"#;
        let plan = parse_plan(raw).unwrap();
        assert!(plan.actions[0].parse().is_ok());
        let err = plan.actions[1].parse().unwrap_err();
        assert_eq!(err, "format_disk");
    }

    #[test]
    fn test_actions_block_extraction() {
        let reply = "C'est fait !\n<actions>[{\"type\": \"pause\"}]</actions>";
        let (visible, actions) = extract_actions_block(reply);
        assert_eq!(visible, "C'est fait !");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0]["type"], "pause");
    }

    #[test]
    fn test_actions_block_absent_or_malformed() {
        let (visible, actions) = extract_actions_block("juste du texte");
        assert_eq!(visible, "juste du texte");
        assert!(actions.is_empty());

        let (visible, actions) = extract_actions_block("texte <actions>pas du json</actions>");
        assert_eq!(visible, "texte");
        assert!(actions.is_empty());
    }

    #[test]
    fn test_weekly_analysis_parse() {
        let raw = r#"{"analysis": "bonne semaine", "criteria_updates": {"titles": ["CTO"]}, "learnings": [{"category": "best_send_times", "summary": "mardi matin"}]}"#;
        let analysis = parse_weekly_analysis(raw).unwrap();
        assert_eq!(analysis.analysis, "bonne semaine");
        assert_eq!(analysis.criteria_updates.unwrap().titles.unwrap(), vec!["CTO"]);
        assert_eq!(analysis.learnings.len(), 1);
    }
}
