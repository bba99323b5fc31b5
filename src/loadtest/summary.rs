//! Terminal report renderer.
//!
//! Every function here is pure: structured data in, [`String`] out. Colour is
//! applied through the `colored` crate, which respects the global override set
//! by `colored::control::set_override(false)` when `--no-color` is active or
//! stdout is piped. Table cells are never coloured so the columns stay aligned.

use colored::Colorize;

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::engine::LoadTestResult;
use crate::loadtest::metrics::StageReport;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 24;

const TABLE_RULE: &str = "----------------------------------------------------";
const STATS_HEADER: &str = " # reqs     Avg     Min     Max  |  Median   req/s  ";
const PERCENTILE_HEADER: &str = " # reqs     50%    80%    90%    95%    99%   100%  ";

/// Render the run banner printed before the first stage.
///
/// ```text
///   cannonade
///   target..................: http://localhost:8080/predict
///   schedule................: 2 stages, 15 requests
///   timeout.................: 60s
///   payload.................: example.jpg (fresh noise per request)
/// ```
pub fn render_header(endpoint: &str, config: &LoadTestConfig) -> String {
    let schedule = config.schedule();
    let stage_word = if schedule.len() == 1 { "stage" } else { "stages" };
    let payload = match config.payload.image_path() {
        Some(path) if config.payload.regenerate => {
            format!("{} (fresh noise per request)", path.display())
        },
        Some(path) => path.display().to_string(),
        None => format!(
            "static body ({} bytes)",
            config.payload.body.as_deref().map_or(0, str::len)
        ),
    };

    [
        format!("  {}", "cannonade".bold()),
        format_metric_row("target", endpoint, PAD_WIDTH),
        format_metric_row(
            "schedule",
            &format!(
                "{} {stage_word}, {} requests",
                schedule.len(),
                config.total_requests()
            ),
            PAD_WIDTH,
        ),
        format_metric_row(
            "timeout",
            &format!("{}s", config.settings.timeout_secs),
            PAD_WIDTH,
        ),
        format_metric_row("payload", &payload, PAD_WIDTH),
    ]
    .join("\n")
}

/// Render the report for one stage.
///
/// ```text
///   stage 1/2: 10 requests, concurrency 2
///
///  # reqs     Avg     Min     Max  |  Median   req/s
/// ----------------------------------------------------
///      10      50      50      51  |      50   39.80
///
///  # reqs     50%    80%    90%    95%    99%   100%
/// ----------------------------------------------------
///      10      50     50     50     51     51     51
///
///   failures................: 3 of 10 (30.0%)
///     http..................: 3
/// ```
///
/// Latency cells are milliseconds over successful requests; `NaN` when none
/// succeeded.
pub fn render_report(report: &StageReport) -> String {
    let mut lines = Vec::new();
    let title = format!(
        "{}: {} requests, concurrency {}",
        report.label(),
        report.stage.requests,
        report.stage.concurrency
    );
    lines.push(format!("  {}", title.bold()));
    lines.push(String::new());
    lines.extend(render_tables(report));

    lines.push(String::new());
    let rate = if report.requests > 0 {
        report.failures as f64 / report.requests as f64 * 100.0
    } else {
        0.0
    };
    let failures = format!("{} of {} ({rate:.1}%)", report.failures, report.requests);
    let failures = if report.failures > 0 {
        failures.red().to_string()
    } else {
        failures.green().to_string()
    };
    lines.push(format_metric_row("failures", &failures, PAD_WIDTH));

    let mut categories: Vec<_> = report.error_categories.iter().collect();
    categories.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (category, count) in categories {
        lines.push(format_metric_row(
            &format!("  {category}"),
            &count.to_string().red().to_string(),
            PAD_WIDTH,
        ));
    }

    lines.join("\n")
}

/// The two fixed-width statistics tables, uncoloured.
pub fn render_tables(report: &StageReport) -> Vec<String> {
    let stats = &report.latency;
    let stats_row = format!(
        "{:7}{:8.0}{:8.0}{:8.0}  |{:8.0}{:8.2}",
        report.requests, stats.mean, stats.min, stats.max, stats.median, report.throughput
    );
    let mut percentile_row = format!("{:7} ", report.requests);
    for value in stats.percentiles {
        percentile_row.push_str(&format!("{value:7.0}"));
    }

    vec![
        STATS_HEADER.to_string(),
        TABLE_RULE.to_string(),
        stats_row,
        String::new(),
        PERCENTILE_HEADER.to_string(),
        TABLE_RULE.to_string(),
        percentile_row,
    ]
}

/// Render the closing line for a multi-stage run.
pub fn render_totals(result: &LoadTestResult) -> String {
    let failures = result.total_failures();
    let failures = if failures > 0 {
        failures.to_string().red().to_string()
    } else {
        failures.to_string()
    };
    format_metric_row(
        "total",
        &format!(
            "{} requests, {} failed, {:.1}s",
            result.total_requests(),
            failures,
            result.elapsed.as_secs_f64()
        ),
        PAD_WIDTH,
    )
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  metric_name..........: value_string"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}
