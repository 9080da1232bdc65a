use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};
use indexmap::IndexMap;

use crate::engine::analytics::AnalyticsSummary;
use crate::models::{
    FixExecution, GitOpsTracking, PreDeploymentAnalysis, Recommendation, RollbackStrategy,
    SyncStatus,
};
use crate::policy::PipelineConfig;

use super::styling::{
    bright, bright_green, bright_red, bright_yellow, cyan, dim, rate, recommendation, severity,
};
use super::tables::{
    color_coded_risk_cell, color_coded_success_cell, create_cyan_header, create_table,
    fix_status_cell, overall_status_cell, review_status_cell, severity_cell,
};

const MAX_ROWS: usize = 10;

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn yes_no(value: bool) -> Cell {
    if value {
        Cell::new("yes").fg(TableColor::Green)
    } else {
        Cell::new("no").fg(TableColor::DarkGrey)
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

fn more_rows(table: &mut comfy_table::Table, hidden: usize, columns: usize) {
    let mut row = vec![Cell::new(format!("... and {hidden} more")).fg(TableColor::DarkGrey)];
    row.extend(vec![Cell::new(""); columns - 1]);
    table.add_row(row);
}

/// Analysis overview, the issues table and what to do next.
pub fn render_analysis(pipeline_id: &str, analysis: &PreDeploymentAnalysis) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "🛡️", "Pre-deployment Analysis");

    let confidence = if analysis.meets_required_confidence {
        rate(analysis.ai_confidence)
    } else {
        bright_red(format!("{}% (below required)", analysis.ai_confidence))
    };
    let strategy = match analysis.rollback_plan.strategy {
        RollbackStrategy::Automated => "automated",
        RollbackStrategy::Manual => "manual",
    };

    let _ = write!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {} ({})\n\n",
        dim("Pipeline:"),
        cyan(pipeline_id),
        dim("Analysis:"),
        cyan(&analysis.analysis_id),
        dim("Environment:"),
        bright(analysis.environment),
        dim("Risk score:"),
        bright_yellow(analysis.risk_score),
        dim("Recommendation:"),
        recommendation(analysis.recommendation),
        dim("Confidence:"),
        confidence,
        dim("Estimated fix time:"),
        bright(&analysis.estimated_fix_time),
        dim("Rollback:"),
        bright(strategy),
        dim(&analysis.rollback_plan.estimated_time),
    );

    if analysis.issues.is_empty() {
        let _ = writeln!(output, "{}\n", bright_green("No issues detected."));
    } else {
        add_section_header(&mut output, "🔎", "Detected Issues");

        let mut table = create_table();
        table.set_header(create_cyan_header(&[
            "#",
            "Type",
            "Severity",
            "Resources",
            "Auto-fix",
            "Impact",
        ]));

        for (idx, issue) in analysis.issues.iter().enumerate() {
            table.add_row(vec![
                Cell::new(idx + 1),
                Cell::new(&issue.issue_type),
                severity_cell(issue.severity),
                Cell::new(issue.affected_resources.join("\n")),
                yes_no(issue.auto_fix_available),
                Cell::new(&issue.estimated_impact),
            ]);
        }

        let _ = write!(output, "{table}\n\n");
    }

    add_section_header(&mut output, "💡", "Next Steps");
    let next = match analysis.recommendation {
        Recommendation::BlockDeployment => {
            "Deployment is blocked; resolve critical issues and analyze again".to_string()
        }
        Recommendation::Proceed if analysis.issues.is_empty() => {
            "Nothing to fix; safe to deploy".to_string()
        }
        _ => format!(
            "Run: deployguard execute -P {pipeline_id} -a {}",
            analysis.analysis_id
        ),
    };
    let _ = writeln!(output, "  {}", dim(next));

    output
}

/// Execution overview plus one row per fix.
pub fn render_execution(execution: &FixExecution) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "🔧", "Fix Execution");

    let _ = write!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n\n",
        dim("Pipeline:"),
        cyan(&execution.pipeline_id),
        dim("Execution:"),
        cyan(&execution.execution_id),
        dim("Analysis:"),
        dim(&execution.analysis_id),
        dim("Status:"),
        bright(execution.overall_status),
        dim("Success rate:"),
        rate(execution.success_rate),
    );

    if !execution.fixes.is_empty() {
        let mut table = create_table();
        table.set_header(create_cyan_header(&[
            "Type",
            "Risk",
            "Confidence",
            "Status",
            "Auto-applied",
            "Approval",
            "Time",
        ]));

        for fix in &execution.fixes {
            table.add_row(vec![
                Cell::new(&fix.fix_type),
                severity_cell(fix.risk_level),
                Cell::new(format!("{}%", fix.confidence)),
                fix_status_cell(fix.status),
                yes_no(fix.auto_applied),
                yes_no(fix.approval_required),
                Cell::new(
                    fix.execution_time_ms
                        .map_or_else(|| "-".to_string(), |ms| format!("{ms}ms")),
                ),
            ]);
        }

        let _ = write!(output, "{table}\n\n");
    }

    if let Some(commit) = &execution.gitops_commit {
        add_section_header(&mut output, "📦", "GitOps Commit");
        let state = match &commit.commit_hash {
            Some(hash) if commit.committed => bright_green(format!("committed {}", short_hash(hash))),
            _ => bright_yellow("staged for review".to_string()),
        };
        let _ = writeln!(output, "  {} {}", dim("Commit:"), state);
        for file in &commit.files_changed {
            let _ = writeln!(output, "  {} {}", dim("•"), file);
        }
    }

    output
}

pub fn render_analysis_history(pipeline_id: &str, analyses: &[PreDeploymentAnalysis]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "📜", &format!("Analysis History: {pipeline_id}"));

    if analyses.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No analyses recorded."));
        return output;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Analysis",
        "Date",
        "Environment",
        "Risk",
        "Issues",
        "Recommendation",
    ]));

    // Newest first.
    for analysis in analyses.iter().rev().take(MAX_ROWS) {
        let worst = analysis.issues.iter().map(|i| i.severity).max();
        table.add_row(vec![
            Cell::new(&analysis.analysis_id),
            Cell::new(analysis.timestamp.format("%Y-%m-%d %H:%M UTC")),
            Cell::new(analysis.environment),
            color_coded_risk_cell(analysis.risk_score),
            Cell::new(match worst {
                Some(worst) => format!("{} (worst {})", analysis.issues.len(), severity(worst)),
                None => "0".to_string(),
            }),
            Cell::new(analysis.recommendation),
        ]);
    }
    if analyses.len() > MAX_ROWS {
        more_rows(&mut table, analyses.len() - MAX_ROWS, 6);
    }

    let _ = writeln!(output, "{table}");
    output
}

pub fn render_execution_history(pipeline_id: &str, executions: &[FixExecution]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "📜", &format!("Execution History: {pipeline_id}"));

    if executions.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No executions recorded."));
        return output;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Execution",
        "Date",
        "Analysis",
        "Fixes",
        "Success",
        "Status",
    ]));

    for execution in executions.iter().rev().take(MAX_ROWS) {
        table.add_row(vec![
            Cell::new(&execution.execution_id),
            Cell::new(execution.timestamp.format("%Y-%m-%d %H:%M UTC")),
            Cell::new(&execution.analysis_id),
            Cell::new(execution.fixes.len()),
            color_coded_success_cell(f64::from(execution.success_rate)),
            overall_status_cell(execution.overall_status),
        ]);
    }
    if executions.len() > MAX_ROWS {
        more_rows(&mut table, executions.len() - MAX_ROWS, 6);
    }

    let _ = writeln!(output, "{table}");
    output
}

pub fn render_tracking(pipeline_id: &str, tracking: Option<&GitOpsTracking>) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🌿", &format!("GitOps Tracking: {pipeline_id}"));

    let Some(tracking) = tracking else {
        let _ = writeln!(output, "{}", bright_yellow("No commits recorded yet."));
        return output;
    };

    let sync = match tracking.sync_status {
        SyncStatus::Synced => bright_green(tracking.sync_status),
        SyncStatus::OutOfSync | SyncStatus::SyncInProgress => bright_yellow(tracking.sync_status),
        SyncStatus::SyncFailed => bright_red(tracking.sync_status),
    };
    let last_sync = tracking.last_sync.map_or_else(
        || "never".to_string(),
        |at| at.format("%Y-%m-%d %H:%M UTC").to_string(),
    );

    let _ = write!(
        output,
        "  {} {}@{}\n  {} {}\n  {} {}\n  {} {}\n\n",
        dim("Repository:"),
        cyan(&tracking.repository),
        cyan(&tracking.branch),
        dim("Sync status:"),
        sync,
        dim("Last sync:"),
        dim(last_sync),
        dim("Commits:"),
        bright_yellow(tracking.commits.len()),
    );

    if tracking.conflict_resolution.has_conflicts {
        let _ = writeln!(
            output,
            "  {} {}\n",
            bright_red("Conflicts (manual review):"),
            tracking.conflict_resolution.conflicting_files.join(", ")
        );
    }

    if !tracking.commits.is_empty() {
        let mut table = create_table();
        table.set_header(create_cyan_header(&["Hash", "Date", "Message", "Files", "Review"]));

        for commit in tracking.commits.iter().rev().take(MAX_ROWS) {
            table.add_row(vec![
                Cell::new(short_hash(&commit.hash)),
                Cell::new(commit.timestamp.format("%Y-%m-%d %H:%M UTC")),
                Cell::new(&commit.message),
                Cell::new(commit.files_changed.join("\n")),
                review_status_cell(commit.review_status),
            ]);
        }
        if tracking.commits.len() > MAX_ROWS {
            more_rows(&mut table, tracking.commits.len() - MAX_ROWS, 5);
        }

        let _ = writeln!(output, "{table}");
    }

    output
}

pub fn render_analytics(summary: &AnalyticsSummary) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");

    let mut table = create_table();
    table.set_header(create_cyan_header(&["Metric", "Value"]));
    let rows = [
        ("Pipelines", summary.total_pipelines),
        ("Analyses", summary.total_analyses),
        ("Blocked deployments", summary.blocked_deployments),
        ("Executions", summary.total_executions),
        ("Fixes", summary.total_fixes),
        ("Auto-applied fixes", summary.auto_applied_fixes),
        ("Approval-gated fixes", summary.approval_gated_fixes),
        ("Commits", summary.total_commits),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    table.add_row(vec![
        Cell::new("Average success rate"),
        color_coded_success_cell(summary.average_success_rate),
    ]);

    let _ = write!(
        output,
        "{table}\n  {} {}\n\n",
        dim("Generated:"),
        dim(summary.generated_at.format("%Y-%m-%d %H:%M UTC"))
    );

    add_section_header(&mut output, "💡", "Recommendations");
    for advice in &summary.recommendations {
        let _ = writeln!(output, "  {} {}", dim("•"), advice);
    }

    output
}

pub fn render_pipelines(pipelines: &IndexMap<String, PipelineConfig>) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "⚙️", "Pipelines");

    if pipelines.is_empty() {
        let _ = writeln!(
            output,
            "{}",
            bright_yellow("No pipelines configured. Run: deployguard config init <pipeline>")
        );
        return output;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Pipeline",
        "Environment",
        "AI Level",
        "Risk / Confidence",
        "Auto-block",
        "Fix Threshold",
        "Concurrency",
        "Approval",
        "GitOps",
    ]));

    for (id, config) in pipelines {
        let pre = &config.pre_deployment;
        let remediation = &config.remediation;
        let approval = remediation
            .approval_required
            .iter()
            .map(|rule| rule.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let sync = if config.sync.enabled {
            format!(
                "{}@{}{}",
                config.sync.repository,
                config.sync.branch,
                if config.sync.auto_commit { "\nauto-commit" } else { "" }
            )
        } else {
            "disabled".to_string()
        };

        table.add_row(vec![
            Cell::new(id),
            Cell::new(config.environment),
            Cell::new(config.ai_integration_level.as_str()),
            Cell::new(format!("{} / {}%", pre.risk_threshold, pre.required_confidence)),
            yes_no(pre.auto_block_on_critical),
            Cell::new(format!("{}%", remediation.confidence_threshold)),
            Cell::new(remediation.max_concurrent_fixes),
            Cell::new(if approval.is_empty() { "none".to_string() } else { approval }),
            Cell::new(sync),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}
