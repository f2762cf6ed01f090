// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-text rendering for CLI output.

use serde_json::Value;

/// Render rows under a header with left-aligned, padded columns.
pub fn print_table(header: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let render = |cells: Vec<&str>| {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", render(header.to_vec()));
    for row in rows {
        println!("{}", render(row.iter().map(String::as_str).collect()));
    }
}

/// A `-` for missing values.
pub fn dash(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => "-".to_string(),
    }
}

/// One process row for `sc ps`.
pub fn process_row(state: &Value) -> Vec<String> {
    vec![
        dash(state.get("name")),
        dash(state.get("status")),
        dash(state.get("pid")),
        dash(state.get("port")),
        dash(state.get("url")),
        dash(state.get("restart_count")),
    ]
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
