use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::models::{FixStatus, OverallStatus, ReviewStatus, Severity};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn color_coded_success_cell(rate: f64) -> Cell {
    let text = format!("{rate:.1}%");
    if rate > 80.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if rate >= 50.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

pub fn color_coded_risk_cell(score: u32) -> Cell {
    let text = score.to_string();
    if score >= 70 {
        Cell::new(text).fg(TableColor::Red)
    } else if score >= 40 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Green)
    }
}

pub fn severity_cell(severity: Severity) -> Cell {
    let cell = Cell::new(severity);
    match severity {
        Severity::Critical | Severity::High => cell.fg(TableColor::Red),
        Severity::Medium => cell.fg(TableColor::Yellow),
        Severity::Low => cell.fg(TableColor::DarkGrey),
    }
}

pub fn fix_status_cell(status: FixStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        FixStatus::Completed => cell.fg(TableColor::Green),
        FixStatus::Failed => cell.fg(TableColor::Red),
        FixStatus::RequiresApproval => cell.fg(TableColor::Yellow),
        FixStatus::Pending | FixStatus::Executing => cell,
    }
}

pub fn overall_status_cell(status: OverallStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        OverallStatus::Completed => cell.fg(TableColor::Green),
        OverallStatus::Failed => cell.fg(TableColor::Red),
        OverallStatus::PartialSuccess | OverallStatus::AwaitingApproval => {
            cell.fg(TableColor::Yellow)
        }
        OverallStatus::InProgress => cell,
    }
}

pub fn review_status_cell(status: ReviewStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        ReviewStatus::Approved | ReviewStatus::AutoApproved => cell.fg(TableColor::Green),
        ReviewStatus::Pending => cell.fg(TableColor::Yellow),
        ReviewStatus::Rejected => cell.fg(TableColor::Red),
    }
}
