use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color as TableColor, Table};
use serde::Serialize;

use changeward::{ChangeEntry, ChangeState, LockEntry};

use crate::theme::{ICONS, THEME};

/// Output format options for CLI commands
#[derive(Clone, Copy, Debug, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub no_color: bool,
}

/// Data that can be rendered as a table.
pub trait TableDisplay {
    fn to_table(&self, options: &GlobalOptions) -> Table;
}

pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        if options.no_color {
            colored::control::set_override(false);
        }
        Self { options }
    }

    pub fn is_json(&self) -> bool {
        self.options.output_format == OutputFormat::Json
    }

    /// Display data according to the configured output format
    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay,
    {
        if self.options.quiet {
            return Ok(());
        }
        match self.options.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
            OutputFormat::Table => println!("{}", data.to_table(&self.options)),
        }
        Ok(())
    }

    pub fn success(&self, message: &str) {
        if !self.options.quiet && !self.is_json() {
            println!("{} {}", ICONS.success.color(THEME.success), message.color(THEME.success));
        }
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", ICONS.error.color(THEME.error), message.color(THEME.error));
    }

    pub fn warning(&self, message: &str) {
        if !self.options.quiet && !self.is_json() {
            println!("{} {}", ICONS.warning.color(THEME.warning), message.color(THEME.warning));
        }
    }

    pub fn info(&self, message: &str) {
        if !self.options.quiet && !self.is_json() {
            println!("{} {}", ICONS.info.color(THEME.info), message.color(THEME.info));
        }
    }

    pub fn heading(&self, text: &str) {
        if !self.options.quiet && !self.is_json() {
            println!("\n{}", text.color(THEME.primary).bold());
        }
    }

    pub fn key_value(&self, key: &str, value: &str) {
        if !self.options.quiet && !self.is_json() {
            println!("{}: {}", key.color(THEME.key).bold(), value.color(THEME.value));
        }
    }
}

fn themed_table(options: &GlobalOptions, headers: &[&str]) -> Table {
    let mut table = Table::new();
    if options.no_color {
        table.load_preset(comfy_table::presets::ASCII_FULL);
    } else {
        table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
    }
    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|header| {
            let cell = Cell::new(header).add_attribute(Attribute::Bold);
            if options.no_color { cell } else { cell.fg(TableColor::Cyan) }
        })
        .collect();
    table.set_header(header_cells);
    table
}

fn state_cell(state: ChangeState, options: &GlobalOptions) -> Cell {
    let cell = Cell::new(state.to_string());
    if options.no_color {
        return cell;
    }
    match state {
        ChangeState::Executed => cell.fg(TableColor::Green),
        ChangeState::RolledBack => cell.fg(TableColor::Yellow),
        ChangeState::Failed => cell.fg(TableColor::Red),
    }
}

/// Change entries as printed by `status` and `history`.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct EntryList(pub Vec<ChangeEntry>);

impl TableDisplay for EntryList {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Change", "Author", "State", "Timestamp", "Millis", "Execution"]);
        if self.0.is_empty() {
            table.add_row(vec![Cell::new("No change entries recorded")]);
            return table;
        }
        for entry in &self.0 {
            let change = if entry.run_always {
                format!("{} (always)", entry.change_id)
            } else {
                entry.change_id.clone()
            };
            table.add_row(vec![
                Cell::new(change),
                Cell::new(&entry.author),
                state_cell(entry.state, options),
                Cell::new(entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
                Cell::new(entry.execution_millis.to_string()),
                Cell::new(&entry.execution_id),
            ]);
        }
        table
    }
}

/// Lock holder plus latest entries, the payload of `status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub lock: Option<LockEntry>,
    pub entries: EntryList,
}

impl TableDisplay for StatusReport {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        self.entries.to_table(options)
    }
}

pub fn describe_lock(lock: Option<&LockEntry>) -> String {
    match lock {
        Some(entry) if entry.is_held_at(chrono::Utc::now()) => format!(
            "{} held by {} until {}",
            ICONS.lock,
            entry.owner,
            entry.lock_until.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        Some(entry) => format!("{} expired lease from {}", ICONS.unlock, entry.owner),
        None => format!("{} free", ICONS.unlock),
    }
}
