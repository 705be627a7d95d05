//! Engine event stream folding.
//!
//! The engine emits one JSON object per line. The fold counts assistant turns
//! and stops listening at the first terminal `result` event; anything after it,
//! and any line that is not a recognizable event, is ignored.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::core::types::{EngineOutcome, EngineRun, ResultSubtype};

/// One progress or terminal event from the engine's stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    System {
        #[serde(default)]
        subtype: Option<String>,
    },
    Assistant {
        #[serde(default)]
        message: Option<Value>,
    },
    User {
        #[serde(default)]
        message: Option<Value>,
    },
    Result(TerminalResult),
    #[serde(other)]
    Other,
}

/// Payload of the terminal `result` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TerminalResult {
    pub subtype: ResultSubtype,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub num_turns: Option<u32>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// Incremental fold over the event stream.
#[derive(Debug, Default)]
pub struct EventTally {
    turns: u32,
    terminal: Option<TerminalResult>,
}

impl EventTally {
    /// Feed one raw stdout line.
    pub fn observe_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<EngineEvent>(line) {
            Ok(event) => self.observe(event),
            Err(err) => trace!(err = %err, "ignoring non-event line"),
        }
    }

    pub fn observe(&mut self, event: EngineEvent) {
        if self.terminal.is_some() {
            return;
        }
        match event {
            EngineEvent::Assistant { .. } => self.turns += 1,
            EngineEvent::Result(result) => {
                debug!(subtype = ?result.subtype, cost = ?result.total_cost_usd, "terminal event");
                self.terminal = Some(result);
            }
            EngineEvent::System { .. } | EngineEvent::User { .. } | EngineEvent::Other => {}
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn finish(self) -> EngineRun {
        match self.terminal {
            Some(result) => EngineRun {
                outcome: EngineOutcome::Finished(result.subtype),
                turns: self.turns,
                cost_usd: result.total_cost_usd.unwrap_or(0.0),
                errors: result.errors.iter().map(render_error).collect(),
            },
            None => EngineRun {
                outcome: EngineOutcome::NoResult,
                turns: self.turns,
                cost_usd: 0.0,
                errors: Vec::new(),
            },
        }
    }
}

fn render_error(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
