//! Builtin code-review handlers: regex-based heuristics over the Python
//! source held in `state.data["code"]`, plus the demo graph wiring them
//! together. These are ordinary handlers; the engine knows nothing about
//! them beyond the invocation contract.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::workflow::{ConditionalEdge, GraphDefinition, NodeDefinition, WorkflowState};

use super::HandlerRegistry;

lazy_static! {
    static ref FUNC_RE: Regex =
        Regex::new(r"def\s+(\w+)\s*\([^)]*\):").expect("function pattern compiles");
}

/// Register the default set of code-review handlers.
pub fn register_builtin(registry: &mut HandlerRegistry) {
    registry.register_fn("extract_functions", extract_functions);
    registry.register_fn("check_complexity", check_complexity);
    registry.register_fn("detect_issues", detect_issues);
    registry.register_fn("suggest_improvements", suggest_improvements);
    registry.register_fn("calculate_quality_score", calculate_quality_score);
}

fn patch_from(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn code_from(state: &WorkflowState) -> String {
    state
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Extract function definitions from the code via pattern matching.
fn extract_functions(
    _params: &Map<String, Value>,
    state: &mut WorkflowState,
) -> anyhow::Result<Option<Map<String, Value>>> {
    let code = code_from(state);
    if code.is_empty() {
        return Ok(patch_from(json!({
            "functions": [],
            "function_count": 0,
        })));
    }

    let mut functions = Vec::new();
    for captures in FUNC_RE.captures_iter(&code) {
        let full = captures.get(0).expect("match has a full capture");
        let name = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let line = code[..full.start()].matches('\n').count() + 1;
        functions.push(json!({ "name": name, "line": line }));
    }

    Ok(patch_from(json!({
        "function_count": functions.len(),
        "functions": functions,
    })))
}

/// Estimate cyclomatic complexity per extracted function by counting
/// branching keywords.
fn check_complexity(
    _params: &Map<String, Value>,
    state: &mut WorkflowState,
) -> anyhow::Result<Option<Map<String, Value>>> {
    let code = code_from(state);
    let functions = state
        .get("functions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let branch_count =
        code.matches("if ").count() + code.matches("for ").count() + code.matches("while ").count();

    let mut complexity_scores = Vec::new();
    for function in &functions {
        let name = function
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let complexity = 1 + branch_count;
        complexity_scores.push(json!({
            "function": name,
            "complexity": complexity,
            "level": if complexity > 5 { "high" } else { "low" },
        }));
    }

    Ok(patch_from(json!({ "complexity_scores": complexity_scores })))
}

/// Detect style, documentation and maintenance issues line by line.
fn detect_issues(
    _params: &Map<String, Value>,
    state: &mut WorkflowState,
) -> anyhow::Result<Option<Map<String, Value>>> {
    let code = code_from(state);
    if code.is_empty() {
        return Ok(patch_from(json!({
            "issues": [],
            "issue_count": 0,
            "severity_counts": { "high": 0, "medium": 0, "low": 0 },
        })));
    }

    let lines: Vec<&str> = code.split('\n').collect();
    let mut issues = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_number = idx + 1;
        let stripped = line.trim();

        if line.len() > 100 {
            issues.push(json!({
                "type": "style",
                "line": line_number,
                "message": "Line too long (>100 characters)",
                "severity": "low",
            }));
        }

        if stripped.starts_with("def ") && line.contains(':') {
            let has_docstring = lines
                .iter()
                .skip(idx + 1)
                .take(3)
                .any(|next| next.contains("\"\"\"") || next.contains("'''"));
            if !has_docstring {
                issues.push(json!({
                    "type": "documentation",
                    "line": line_number,
                    "message": "Function missing docstring",
                    "severity": "medium",
                }));
            }
        }

        if line.contains("TODO") || line.contains("FIXME") {
            issues.push(json!({
                "type": "maintenance",
                "line": line_number,
                "message": "TODO/FIXME comment found",
                "severity": "low",
            }));
        }
    }

    let mut severity_counts: HashMap<&str, usize> =
        HashMap::from([("high", 0), ("medium", 0), ("low", 0)]);
    for issue in &issues {
        if let Some(severity) = issue.get("severity").and_then(Value::as_str) {
            *severity_counts.entry(severity).or_default() += 1;
        }
    }

    Ok(patch_from(json!({
        "issue_count": issues.len(),
        "issues": issues,
        "severity_counts": {
            "high": severity_counts["high"],
            "medium": severity_counts["medium"],
            "low": severity_counts["low"],
        },
    })))
}

/// Turn complexity scores and issue patterns into actionable suggestions.
fn suggest_improvements(
    _params: &Map<String, Value>,
    state: &mut WorkflowState,
) -> anyhow::Result<Option<Map<String, Value>>> {
    let complexity_scores = state
        .get("complexity_scores")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let issues = state
        .get("issues")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut suggestions = Vec::new();

    for score in &complexity_scores {
        let function = score
            .get("function")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let complexity = score.get("complexity").and_then(Value::as_i64).unwrap_or(0);

        if complexity > 10 {
            suggestions.push(json!({
                "type": "refactor",
                "target": function,
                "suggestion": format!("Consider breaking down {function} (complexity: {complexity})"),
                "priority": "high",
            }));
        } else if complexity > 5 {
            suggestions.push(json!({
                "type": "refactor",
                "target": function,
                "suggestion": format!("Consider simplifying {function} (complexity: {complexity})"),
                "priority": "medium",
            }));
        }
    }

    let mut issue_types: HashMap<String, usize> = HashMap::new();
    for issue in &issues {
        if let Some(issue_type) = issue.get("type").and_then(Value::as_str) {
            *issue_types.entry(issue_type.to_string()).or_default() += 1;
        }
    }

    if issue_types.get("documentation").copied().unwrap_or(0) > 2 {
        suggestions.push(json!({
            "type": "documentation",
            "target": "general",
            "suggestion": "Add docstrings to improve code documentation",
            "priority": "medium",
        }));
    }

    if issue_types.get("style").copied().unwrap_or(0) > 5 {
        suggestions.push(json!({
            "type": "style",
            "target": "general",
            "suggestion": "Consider using a code formatter (black, autopep8)",
            "priority": "low",
        }));
    }

    Ok(patch_from(json!({
        "suggestion_count": suggestions.len(),
        "suggestions": suggestions,
    })))
}

/// Aggregate an overall quality score from the analysis results.
fn calculate_quality_score(
    _params: &Map<String, Value>,
    state: &mut WorkflowState,
) -> anyhow::Result<Option<Map<String, Value>>> {
    let function_count = state
        .get("function_count")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let avg_complexity = state
        .get("average_complexity")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let severity_counts = state
        .get("severity_counts")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let severity = |key: &str| {
        severity_counts
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };

    let mut score = 10.0;

    if avg_complexity > 10.0 {
        score -= 3.0;
    } else if avg_complexity > 5.0 {
        score -= 1.0;
    }

    score -= severity("high") * 2.0;
    score -= severity("medium");
    score -= severity("low") * 0.5;

    if function_count > 0 {
        score += 1.0;
    }

    let quality_score = score.clamp(0.0, 10.0);
    let quality_level = if quality_score >= 8.0 {
        "excellent"
    } else if quality_score >= 6.0 {
        "good"
    } else if quality_score >= 4.0 {
        "fair"
    } else {
        "poor"
    };

    Ok(patch_from(json!({
        "quality_score": quality_score,
        "quality_level": quality_level,
    })))
}

/// The code-review demo workflow: a linear analysis pipeline with a
/// quality-gated loop back through the improvement stage.
pub fn code_review_graph() -> GraphDefinition {
    let node = |name: &str, function_name: &str| NodeDefinition {
        name: name.to_string(),
        function_name: function_name.to_string(),
        parameters: Map::new(),
    };

    GraphDefinition {
        name: "Code Review Mini-Agent".to_string(),
        nodes: vec![
            node("extract_functions", "extract_functions"),
            node("check_complexity", "check_complexity"),
            node("detect_issues", "detect_issues"),
            node("suggest_improvements", "suggest_improvements"),
            node("calculate_quality", "calculate_quality_score"),
            node("final_review", "calculate_quality_score"),
        ],
        edges: HashMap::from([
            (
                "extract_functions".to_string(),
                "check_complexity".to_string(),
            ),
            ("check_complexity".to_string(), "detect_issues".to_string()),
            (
                "detect_issues".to_string(),
                "suggest_improvements".to_string(),
            ),
            (
                "suggest_improvements".to_string(),
                "calculate_quality".to_string(),
            ),
        ]),
        conditional_edges: HashMap::from([(
            "calculate_quality".to_string(),
            vec![
                ConditionalEdge {
                    condition: "quality_score >= 7".to_string(),
                    target: "final_review".to_string(),
                },
                ConditionalEdge {
                    condition: "quality_score < 7".to_string(),
                    target: "suggest_improvements".to_string(),
                },
            ],
        )]),
        start_node: "extract_functions".to_string(),
    }
}

/// Sample input for the demo endpoint.
pub const SAMPLE_CODE: &str = r#"
import os
import sys

def calculate_total(numbers):
    total = 0
    for num in numbers:
        if num > 0:
            total += num
        elif num < 0:
            total -= abs(num)
    return total

def process_data(data):
    # TODO: Add validation
    result = []
    for item in data:
        if item:
            if len(item) > 10:
                result.append(item[:10])
            else:
                result.append(item)
    return result

def complex_function(a, b, c, d, e):
    if a > 0:
        if b > 0:
            if c > 0:
                if d > 0:
                    if e > 0:
                        return a + b + c + d + e
                    else:
                        return a + b + c + d - e
                else:
                    return a + b + c - d
            else:
                return a + b - c
        else:
            return a - b
    else:
        return 0
"#;
