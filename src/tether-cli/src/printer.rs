//! Rendering command results as JSON, YAML or plain text.

use anyhow::Result;
use serde_json::{Map, Value};

/// Output format selectable with `--format`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

impl OutputFormat {
    pub fn printer(self) -> Box<dyn Printer> {
        match self {
            Self::Text => Box::new(TextPrinter),
            Self::Json => Box::new(JsonPrinter),
            Self::Yaml => Box::new(YamlPrinter),
        }
    }
}

/// Turns a value into formatted text.
pub trait Printer {
    fn render(&self, value: &Value) -> Result<String>;
}

pub struct JsonPrinter;

impl Printer for JsonPrinter {
    fn render(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }
}

pub struct YamlPrinter;

impl Printer for YamlPrinter {
    fn render(&self, value: &Value) -> Result<String> {
        Ok(serde_yaml::to_string(value)?.trim_end().to_string())
    }
}

/// Arrays of objects become aligned tables; objects become `key: value`
/// lines with nested values indented below their key.
pub struct TextPrinter;

impl Printer for TextPrinter {
    fn render(&self, value: &Value) -> Result<String> {
        let mut out = String::new();
        match value {
            Value::Array(rows) if rows.iter().all(Value::is_object) && !rows.is_empty() => {
                render_table(rows, &mut out);
            }
            other => render_nested(other, 0, &mut out),
        }
        Ok(out.trim_end().to_string())
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn is_flat(value: &Value) -> bool {
    match value {
        Value::Object(_) => false,
        Value::Array(items) => !items.iter().any(|i| i.is_object() || i.is_array()),
        _ => true,
    }
}

fn render_table(rows: &[Value], out: &mut String) {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key.as_str());
                }
            }
        }
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| row.get(*col).map(scalar).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(col.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = columns.iter().map(|c| c.to_uppercase()).collect();
    push_row(&header, &widths, out);
    for row in &cells {
        push_row(row, &widths, out);
    }
}

fn push_row(cells: &[String], widths: &[usize], out: &mut String) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

fn render_nested(value: &Value, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    match value {
        Value::Object(map) => render_object(map, indent, out),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(map) => {
                        let mut block = String::new();
                        render_object(map, indent + 2, &mut block);
                        // First line carries the list marker.
                        let block = block.replacen(&format!("{pad}  "), &format!("{pad}- "), 1);
                        out.push_str(&block);
                    }
                    other => {
                        out.push_str(&format!("{pad}- {}\n", scalar(other)));
                    }
                }
            }
        }
        other => {
            out.push_str(&format!("{pad}{}\n", scalar(other)));
        }
    }
}

fn render_object(map: &Map<String, Value>, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    for (key, value) in map {
        if value.as_array().is_some_and(Vec::is_empty) {
            out.push_str(&format!("{pad}{key}: -\n"));
        } else if is_flat(value) {
            out.push_str(&format!("{pad}{key}: {}\n", scalar(value)));
        } else {
            out.push_str(&format!("{pad}{key}:\n"));
            render_nested(value, indent + 2, out);
        }
    }
}
