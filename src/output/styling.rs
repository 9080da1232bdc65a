use console::style;

use crate::models::{Recommendation, Severity};

/// Styling helpers for terminal output
pub fn bright_yellow(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().yellow()
}

pub fn bright_green(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().green()
}

pub fn bright_red(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().red()
}

pub fn cyan(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).cyan()
}

pub fn dim(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn bright(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright()
}

pub fn magenta_bold(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

pub fn recommendation(value: Recommendation) -> console::StyledObject<String> {
    match value {
        Recommendation::Proceed => bright_green(value),
        Recommendation::ProceedWithCaution | Recommendation::FixThenDeploy => bright_yellow(value),
        Recommendation::BlockDeployment => bright_red(value),
    }
}

/// Green above 80%, yellow from 50%, red below.
pub fn rate(value: u32) -> console::StyledObject<String> {
    let text = format!("{value}%");
    if value > 80 {
        bright_green(text)
    } else if value >= 50 {
        bright_yellow(text)
    } else {
        bright_red(text)
    }
}

pub fn severity(value: Severity) -> console::StyledObject<String> {
    match value {
        Severity::Low => dim(value),
        Severity::Medium => bright_yellow(value),
        Severity::High | Severity::Critical => bright_red(value),
    }
}
