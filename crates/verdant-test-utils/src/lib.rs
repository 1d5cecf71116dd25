//! Testing utilities for the Verdant workspace
//!
//! Shared fixtures: histories, sessions, cell snapshots and outputs.

#![allow(missing_docs)]

use serde_json::{json, Value};
use std::sync::Arc;
use verdant_history::{History, HistoryConfig};
use verdant_nodey::NodeName;
use verdant_stage::{CellSnapshot, NotebookSession};

pub fn history() -> Arc<History> {
    history_with(HistoryConfig::default())
}

pub fn history_with(config: HistoryConfig) -> Arc<History> {
    Arc::new(History::new(config).unwrap())
}

pub fn session() -> NotebookSession {
    NotebookSession::new(history()).unwrap()
}

pub fn session_with(config: HistoryConfig) -> NotebookSession {
    NotebookSession::new(history_with(config)).unwrap()
}

/// Session with `cells` loaded cold
pub fn loaded_session(cells: Vec<CellSnapshot>) -> NotebookSession {
    let session = session();
    session.load(cells, false).unwrap();
    session
}

pub fn code(source: &str) -> CellSnapshot {
    CellSnapshot::code(source)
}

pub fn markdown(source: &str) -> CellSnapshot {
    CellSnapshot::markdown(source)
}

/// Code cell with one stdout stream output
pub fn code_with_stdout(source: &str, stdout: &str) -> CellSnapshot {
    CellSnapshot::code(source).with_outputs(vec![stream_output(stdout)])
}

pub fn stream_output(text: &str) -> Value {
    json!({
        "output_type": "stream",
        "name": "stdout",
        "text": text,
    })
}

/// `display_data` output with a PNG payload of roughly `bytes` bytes
pub fn image_output(bytes: usize) -> Value {
    json!({
        "output_type": "display_data",
        "data": { "image/png": "A".repeat(bytes) },
        "metadata": {},
    })
}

/// Three-cell notebook: heading, computation, print
pub fn sample_notebook() -> Vec<CellSnapshot> {
    vec![
        markdown("# Exploration\nLoading the data."),
        code_with_stdout("import math\nradius = 2\narea = math.pi * radius ** 2\n", ""),
        code_with_stdout("print(area)", "12.566370614359172\n"),
    ]
}

/// Rendered text of a committed version
pub fn rendered(history: &History, name: NodeName) -> String {
    let snapshot = history.store().snapshot();
    verdant_nodey::render(&snapshot.get(&name).unwrap(), &*snapshot).unwrap()
}
