use std::cmp::Ordering;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{ChurnRisk, ChurnRiskDistribution, EngagementReport, EngagementScore};

const RANKING_SIZE: usize = 10;

/// Days-since-last-activity ceiling for counting a client as active.
const ACTIVE_WINDOW_DAYS: i64 = 30;

/// Aggregate one completed pass into fleet-level numbers. The input must
/// come from a single batch pass; the report never mixes passes.
pub fn build_report(scores: &[EngagementScore], now: DateTime<Utc>) -> EngagementReport {
    let total_clients = scores.len();
    let active_clients = scores
        .iter()
        .filter(|s| s.days_since_last_activity <= ACTIVE_WINDOW_DAYS)
        .count();
    let at_risk_clients = scores
        .iter()
        .filter(|s| s.churn_risk == ChurnRisk::High)
        .count();

    // Stable sort: ties keep the pass order.
    let mut ranked: Vec<EngagementScore> = scores.to_vec();
    ranked.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(Ordering::Equal)
    });

    let top_engaged_clients: Vec<EngagementScore> =
        ranked.iter().take(RANKING_SIZE).cloned().collect();
    let low_engaged_clients: Vec<EngagementScore> =
        ranked.iter().rev().take(RANKING_SIZE).cloned().collect();

    let mut churn_risk_distribution = ChurnRiskDistribution::default();
    for score in scores {
        match score.churn_risk {
            ChurnRisk::Low => churn_risk_distribution.low += 1,
            ChurnRisk::Medium => churn_risk_distribution.medium += 1,
            ChurnRisk::High => churn_risk_distribution.high += 1,
        }
    }

    let average_engagement_score = if scores.is_empty() {
        0.0
    } else {
        let sum: f64 = scores.iter().map(|s| s.overall_score).sum();
        (sum / total_clients as f64).round()
    };

    EngagementReport {
        total_clients,
        active_clients,
        at_risk_clients,
        top_engaged_clients,
        low_engaged_clients,
        churn_risk_distribution,
        average_engagement_score,
        generated_at: now,
    }
}

pub fn render_markdown(report: &EngagementReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Client Engagement Report");
    let _ = writeln!(
        output,
        "Generated {}",
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Fleet Summary");
    let _ = writeln!(output, "- Total clients: {}", report.total_clients);
    let _ = writeln!(
        output,
        "- Active in the last {ACTIVE_WINDOW_DAYS} days: {}",
        report.active_clients
    );
    let _ = writeln!(output, "- At risk of churning: {}", report.at_risk_clients);
    let _ = writeln!(
        output,
        "- Average engagement score: {:.0}",
        report.average_engagement_score
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Churn Risk Mix");
    let dist = &report.churn_risk_distribution;
    let _ = writeln!(output, "- low: {}", dist.low);
    let _ = writeln!(output, "- medium: {}", dist.medium);
    let _ = writeln!(output, "- high: {}", dist.high);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Engaged Clients");
    if report.top_engaged_clients.is_empty() {
        let _ = writeln!(output, "No clients scored in this pass.");
    } else {
        for score in &report.top_engaged_clients {
            let _ = writeln!(
                output,
                "- {} ({}) score {:.0}, {} risk, last active {}",
                score.client_name,
                score.client_email,
                score.overall_score,
                score.churn_risk.label(),
                recency_label(score)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Lowest Engaged Clients");
    if report.low_engaged_clients.is_empty() {
        let _ = writeln!(output, "No clients scored in this pass.");
    } else {
        for score in &report.low_engaged_clients {
            let _ = writeln!(
                output,
                "- {} ({}) score {:.0}, {} risk, last active {}",
                score.client_name,
                score.client_email,
                score.overall_score,
                score.churn_risk.label(),
                recency_label(score)
            );
            for insight in &score.insights {
                let _ = writeln!(output, "  - {insight}");
            }
        }
    }

    output
}

fn recency_label(score: &EngagementScore) -> String {
    match score.last_activity {
        Some(_) => format!("{} days ago", score.days_since_last_activity),
        None => "never".to_string(),
    }
}
