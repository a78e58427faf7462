//! Configuration view formatting: JSON, Table, and Markdown output.

use std::fmt;
use std::str::FromStr;

use docid_core::DocIdError;

use crate::registry::{ConfigurationView, DocumentTypeView};

/// Output format for `config show`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = DocIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(DocIdError::InvalidConfig(format!(
                "unknown output format '{other}'"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Table => "table",
            Self::Markdown => "markdown",
        })
    }
}

const COLUMNS: [&str; 8] = [
    "key", "name", "reset", "bucket", "start", "last", "next", "preview",
];

fn cells(view: &DocumentTypeView) -> [String; 8] {
    [
        view.config.key.clone(),
        view.config.name.clone(),
        view.config.reset_policy.to_string(),
        view.bucket.clone(),
        view.config.start_from.to_string(),
        view.last_number.map_or_else(|| "-".to_string(), |n| n.to_string()),
        view.next_number.to_string(),
        view.preview.clone(),
    ]
}

/// Format a configuration view in the requested output format.
#[must_use]
pub fn format_configuration(view: &ConfigurationView, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(view),
        OutputFormat::Table => format_table(view),
        OutputFormat::Markdown => format_markdown(view),
    }
}

fn format_json(view: &ConfigurationView) -> String {
    serde_json::to_string_pretty(view).unwrap_or_else(|_| "{}".to_string())
}

fn settings_line(view: &ConfigurationView) -> String {
    format!(
        "tenant {} | company {} | branch {} | dept {} | financial year {}",
        view.tenant,
        view.settings.company_code,
        view.settings.branch_code,
        view.settings.department_code,
        view.financial_year
    )
}

fn format_table(view: &ConfigurationView) -> String {
    let mut output = settings_line(view);
    output.push('\n');

    if view.document_types.is_empty() {
        output.push_str("(no document types)\n");
        return output;
    }

    let rows: Vec<[String; 8]> = view.document_types.iter().map(cells).collect();

    let mut widths: Vec<usize> = COLUMNS.iter().map(|c| c.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let header: Vec<String> = COLUMNS
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
        .collect();
    output.push_str(header.join(" | ").trim_end());
    output.push('\n');

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&sep.join("-+-"));
    output.push('\n');

    for row in &rows {
        let vals: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:width$}", cell, width = widths[i]))
            .collect();
        output.push_str(vals.join(" | ").trim_end());
        output.push('\n');
    }

    output
}

fn format_markdown(view: &ConfigurationView) -> String {
    let mut output = format!("**{}**\n\n", settings_line(view));

    if view.document_types.is_empty() {
        output.push_str("*No document types*\n");
        return output;
    }

    output.push_str("| ");
    output.push_str(&COLUMNS.join(" | "));
    output.push_str(" |\n");

    output.push_str("| ");
    let seps: Vec<&str> = COLUMNS.iter().map(|_| "---").collect();
    output.push_str(&seps.join(" | "));
    output.push_str(" |\n");

    for view in &view.document_types {
        let vals: Vec<String> = cells(view).iter().map(|c| c.replace('|', "\\|")).collect();
        output.push_str("| ");
        output.push_str(&vals.join(" | "));
        output.push_str(" |\n");
    }

    output
}
