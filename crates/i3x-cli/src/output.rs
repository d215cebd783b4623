//! Output formatting for i3x-cli (table, json, csv)

use clap::ValueEnum;
use colored::Colorize;
use i3x_client::ValueSnapshot;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }

    /// Parse a format name from the config file, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    let table = Table::new(data).to_string();
                    println!("{}", table);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => {
                print_csv(data);
            }
        }
    }
}

/// Print data as CSV
fn print_csv<T: Serialize>(data: &[T]) {
    if let Some(csv) = to_csv(data) {
        print!("{}", csv);
    }
}

/// Render rows as CSV, header taken from the first row's fields
fn to_csv<T: Serialize>(data: &[T]) -> Option<String> {
    let first = serde_json::to_value(data.first()?).ok()?;
    let serde_json::Value::Object(map) = &first else {
        return None;
    };

    let headers: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
    let mut out = headers.join(",");
    out.push('\n');

    for item in data {
        if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(item) {
            let values: Vec<String> = headers
                .iter()
                .map(|h| {
                    row.get(*h)
                        .map(|v| match v {
                            serde_json::Value::String(s) => escape_csv(s),
                            other => escape_csv(&other.to_string()),
                        })
                        .unwrap_or_default()
                })
                .collect();
            out.push_str(&values.join(","));
            out.push('\n');
        }
    }

    Some(out)
}

/// Join fields into one CSV line, escaping each
pub fn csv_line(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| escape_csv(field))
        .collect::<Vec<_>>()
        .join(",")
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn format_json_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Namespace display for namespaces command
#[derive(Debug, Tabled, Serialize)]
pub struct NamespaceRow {
    #[tabled(rename = "URI")]
    pub uri: String,
    #[tabled(rename = "Name")]
    pub name: String,
}

/// Object type display for types command
#[derive(Debug, Tabled, Serialize)]
pub struct ObjectTypeRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Namespace")]
    pub namespace: String,
}

/// Relationship type display for relationships command
#[derive(Debug, Tabled, Serialize)]
pub struct RelationshipRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Namespace")]
    pub namespace: String,
    #[tabled(rename = "Reverse Of")]
    pub reverse_of: String,
}

/// Object display for objects command
#[derive(Debug, Tabled, Serialize)]
pub struct ObjectRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Type")]
    pub type_id: String,
    #[tabled(rename = "Parent")]
    pub parent: String,
}

/// One VQT for value, history and monitor commands
#[derive(Debug, Clone, PartialEq, Tabled, Serialize)]
pub struct ValueRow {
    #[tabled(rename = "Element")]
    pub element: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Quality")]
    pub quality: String,
    #[tabled(rename = "Timestamp")]
    pub timestamp: String,
}

/// Subscription display for subscriptions command
#[derive(Debug, Tabled, Serialize)]
pub struct SubscriptionRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Created")]
    pub created: String,
    #[tabled(rename = "Streaming")]
    pub streaming: String,
    #[tabled(rename = "Queued")]
    pub queued: u64,
    #[tabled(rename = "Objects")]
    pub objects: String,
}

/// Flatten a snapshot into rows; children are named `parent/child`
pub fn value_rows(snapshot: &ValueSnapshot) -> Vec<ValueRow> {
    let mut rows = Vec::new();
    collect_value_rows(&snapshot.element_id, snapshot, &mut rows);
    rows
}

fn collect_value_rows(path: &str, snapshot: &ValueSnapshot, rows: &mut Vec<ValueRow>) {
    for vqt in &snapshot.data {
        rows.push(ValueRow {
            element: path.to_string(),
            value: format_json_value(&vqt.value),
            quality: vqt.quality.clone(),
            timestamp: vqt.timestamp.clone(),
        });
    }
    for (name, child) in &snapshot.children {
        collect_value_rows(&format!("{}/{}", path, name), child, rows);
    }
}
