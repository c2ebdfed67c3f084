//! JSON scores: a list of function calls run in order
//!
//! ```json
//! {
//!   "calls": [
//!     { "function": "makegen", "args": [2, 10, 1024, 1] },
//!     { "function": "maketable", "args": ["line", 1000, 0, 0, 1, 1, 2, 0], "assign": "env" },
//!     { "function": "WAVETABLE", "args": [0, 2, { "op": "*", "left": { "ref": "env" }, "right": 0.5 }, 440] }
//!   ]
//! }
//! ```
//!
//! A bare array of calls is accepted too. `assign` stores a call's result
//! under a name that later `{"ref": ...}` arguments read; `{"op", "left",
//! "right"}` combines two operands with a binary operator.

use crate::config::FatalPolicy;
use crate::dispatch::{compose, ScriptValue};
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::pfield::BinaryOp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// One argument as written in a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    Float(f64),
    Str(String),
    List(Vec<ScoreValue>),
    Ref {
        #[serde(rename = "ref")]
        name: String,
    },
    Op {
        op: String,
        left: Box<ScoreValue>,
        right: Box<ScoreValue>,
    },
    /// Passes a void argument, which dispatch rejects
    Null(()),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCall {
    pub function: String,
    #[serde(default)]
    pub args: Vec<ScoreValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Score {
    pub calls: Vec<ScoreCall>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScoreFile {
    Object(Score),
    Calls(Vec<ScoreCall>),
}

/// Outcome of running a score
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreReport {
    pub calls: usize,
    pub failed: usize,
}

impl Score {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(match serde_json::from_str(text)? {
            ScoreFile::Object(score) => score,
            ScoreFile::Calls(calls) => Score { calls },
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text).map_err(|e| EngineError::Score(format!("{}: {}", path.display(), e)))
    }

    /// Dispatch every call on `engine` in order.
    ///
    /// A failing call is reported; it stops the score only under
    /// `FatalPolicy::Abort`.
    pub fn run(&self, engine: &mut Engine) -> Result<ScoreReport> {
        let mut vars: HashMap<String, ScriptValue> = HashMap::new();
        let mut report = ScoreReport::default();

        for (index, call) in self.calls.iter().enumerate() {
            report.calls += 1;
            let result = call
                .args
                .iter()
                .map(|arg| resolve(arg, &vars))
                .collect::<Result<Vec<_>>>()
                .and_then(|values| engine.dispatch(&call.function, &values));

            match result {
                Ok(value) => {
                    debug!("call {} {}(..) -> {}", index, call.function, value);
                    if let Some(name) = &call.assign {
                        vars.insert(name.clone(), value.into_script());
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    engine.reporter().fatal_error(Some(&call.function), &err);
                    if engine.config().fatal_policy == FatalPolicy::Abort {
                        return Err(EngineError::Score(format!("call {} ({}): {}", index, call.function, err)));
                    }
                }
            }
        }
        Ok(report)
    }
}

/// Turn a score value into a script value, looking up references
fn resolve(value: &ScoreValue, vars: &HashMap<String, ScriptValue>) -> Result<ScriptValue> {
    Ok(match value {
        ScoreValue::Float(v) => ScriptValue::Float(*v),
        ScoreValue::Str(s) => ScriptValue::Str(s.clone()),
        ScoreValue::List(items) => ScriptValue::List(Some(
            items.iter().map(|item| resolve(item, vars)).collect::<Result<_>>()?,
        )),
        ScoreValue::Ref { name } => vars
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::Score(format!("no value named \"{}\"", name)))?,
        ScoreValue::Op { op, left, right } => {
            let op: BinaryOp = op.parse()?;
            compose(&resolve(left, vars)?, &resolve(right, vars)?, op)?
        }
        ScoreValue::Null(()) => ScriptValue::Void,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn engine(policy: FatalPolicy) -> Engine {
        Engine::new(EngineConfig {
            sample_rate: 1000.0,
            block_frames: 100,
            output_channels: 1,
            worker_threads: 1,
            fatal_policy: policy,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parse_every_value_form() {
        let values: Vec<ScoreValue> =
            serde_json::from_str(r#"[1.5, "out 0-1", [1, 2], {"ref": "amp"}, {"op": "+", "left": 1, "right": 2}, null]"#)
                .unwrap();
        assert_eq!(values[0], ScoreValue::Float(1.5));
        assert_eq!(values[1], ScoreValue::Str("out 0-1".into()));
        assert_eq!(values[2], ScoreValue::List(vec![ScoreValue::Float(1.0), ScoreValue::Float(2.0)]));
        assert_eq!(values[3], ScoreValue::Ref { name: "amp".into() });
        assert!(matches!(values[4], ScoreValue::Op { .. }));
        assert_eq!(values[5], ScoreValue::Null(()));
    }

    #[test]
    fn test_bare_array_and_object_forms() {
        let a = Score::from_json_str(r#"[{"function": "print_on", "args": [3]}]"#).unwrap();
        let b = Score::from_json_str(r#"{"calls": [{"function": "print_on", "args": [3]}]}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_assign_and_ref() {
        let score = Score::from_json_str(
            r#"[
                {"function": "maketable", "args": ["literal", 2, 0.5, 0.5], "assign": "amp"},
                {"function": "WAVETABLE", "args": [0, 0.1, {"op": "*", "left": {"ref": "amp"}, "right": 2}, 100]}
            ]"#,
        )
        .unwrap();
        let mut engine = engine(FatalPolicy::Abort);
        let report = score.run(&mut engine).unwrap();
        assert_eq!(report, ScoreReport { calls: 2, failed: 0 });
        assert_eq!(engine.scheduler().pending_count(), 1);
    }

    #[test]
    fn test_failures_follow_policy() {
        let text = r#"[
            {"function": "nope"},
            {"function": "WAVETABLE", "args": [0, 0.1, {"ref": "missing"}, 100]},
            {"function": "WAVETABLE", "args": [0, 0.1, 0.5, 100]}
        ]"#;
        let score = Score::from_json_str(text).unwrap();

        let mut lenient = engine(FatalPolicy::SkipInstrument);
        let report = score.run(&mut lenient).unwrap();
        assert_eq!(report, ScoreReport { calls: 3, failed: 2 });
        assert_eq!(lenient.scheduler().pending_count(), 1);

        let mut strict = engine(FatalPolicy::Abort);
        assert!(matches!(score.run(&mut strict), Err(EngineError::Score(_))));
    }

    #[test]
    fn test_failed_note_is_reported_once() {
        let score = Score::from_json_str(r#"[{"function": "WAVETABLE", "args": [0]}]"#).unwrap();
        for policy in [FatalPolicy::SkipInstrument, FatalPolicy::Abort] {
            let mut engine = engine(policy);
            let _ = score.run(&mut engine);
            assert_eq!(engine.reporter().count(crate::diagnostics::Severity::Fatal), 1, "{:?}", policy);
        }
    }
}
