//! Human-readable summaries for `--format summary`.

use std::fmt::Write;

use crate::compare::ComparisonResult;
use crate::experiment::{Experiment, ExperimentEvaluation};
use crate::metrics::VersionMetrics;

pub fn metrics(m: &VersionMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  {} .. {}",
        m.prompt_version,
        m.window_start.to_rfc3339(),
        m.window_end.to_rfc3339()
    );
    let _ = writeln!(
        out,
        "  requests     {} total, {} ok, {} failed ({:.2}% success)",
        m.total_requests, m.successful_requests, m.failed_requests, m.success_rate
    );
    let _ = writeln!(
        out,
        "  latency ms   avg {:.2}  p50 {}  p95 {}  p99 {}",
        m.avg_latency_ms, m.p50_latency_ms, m.p95_latency_ms, m.p99_latency_ms
    );
    let _ = writeln!(
        out,
        "  tokens       {} in, {} out",
        m.total_input_tokens, m.total_output_tokens
    );
    let _ = writeln!(
        out,
        "  cost usd     {} total, {} per request",
        m.total_cost_usd, m.avg_cost_per_request
    );
    let _ = writeln!(
        out,
        "  completeness {:.2}% ({:.2} fields)",
        m.avg_completeness_pct, m.avg_fields_extracted
    );
    out
}

pub fn comparison(c: &ComparisonResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} (n={}) vs {} (n={})",
        c.control_version, c.control_n, c.treatment_version, c.treatment_n
    );
    let _ = writeln!(
        out,
        "  success rate {:.2}% -> {:.2}% ({:+.2}pp)",
        c.control_success_rate, c.treatment_success_rate, c.success_rate_delta
    );
    let _ = writeln!(
        out,
        "  latency ms   {:.2} -> {:.2} ({:+.2})",
        c.control_avg_latency_ms, c.treatment_avg_latency_ms, c.time_delta_ms
    );
    let _ = writeln!(
        out,
        "  cost usd     {} -> {} ({:+.2}%)",
        c.control_avg_cost, c.treatment_avg_cost, c.cost_delta_pct
    );
    if let Some(test) = &c.success_rate_test {
        let _ = writeln!(
            out,
            "  z-test       z={:.3} p={:.4} (advisory at {:.0}%)",
            test.z,
            test.p_value,
            c.confidence_level * 100.0
        );
    }
    let _ = writeln!(out, "  significant  {}", c.is_significant);
    let _ = writeln!(out, "{}", c.summary);
    out
}

pub fn experiment(e: &Experiment) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  {}  [{}]", e.experiment_id, e.name, e.status);
    let _ = writeln!(
        out,
        "  {} vs {} at {}",
        e.control_version, e.treatment_version, e.traffic_allocation
    );
    let _ = writeln!(
        out,
        "  requests {} / {} (target {} per arm)",
        e.control_requests, e.treatment_requests, e.target_sample_size
    );
    if let Some(winner) = &e.winner {
        let _ = writeln!(out, "  winner {winner}");
    }
    if let Some(conclusion) = &e.conclusion {
        let _ = writeln!(out, "  {conclusion}");
    }
    out
}

pub fn experiment_list(experiments: &[Experiment]) -> String {
    if experiments.is_empty() {
        return "no experiments\n".to_string();
    }
    let mut out = String::new();
    for e in experiments {
        let _ = writeln!(
            out,
            "{}  {:<11}  {} vs {}  {}",
            e.experiment_id,
            e.status.as_str(),
            e.control_version,
            e.treatment_version,
            e.name
        );
    }
    out
}

pub fn evaluation(ev: &ExperimentEvaluation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  [{}]", ev.experiment_id, ev.status);
    let _ = writeln!(
        out,
        "  samples {} / {} of {} (target reached: {})",
        ev.control_requests, ev.treatment_requests, ev.target_sample_size, ev.target_reached
    );
    if let Some(days) = ev.days_running {
        let _ = writeln!(
            out,
            "  running {days} days (duration exceeded: {})",
            ev.duration_exceeded
        );
    }
    let _ = writeln!(
        out,
        "  meets success threshold: {}, within cost limit: {}",
        ev.meets_success_threshold, ev.within_cost_limit
    );
    match &ev.suggested_winner {
        Some(winner) => {
            let _ = writeln!(out, "  suggested winner {winner}");
        }
        None => {
            let _ = writeln!(out, "  no winner yet");
        }
    }
    if ev.ready_to_complete {
        let _ = writeln!(out, "  ready to complete");
    }
    out.push_str(&comparison(&ev.comparison));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::NewExperiment;
    use chrono::Utc;
    use xp_common::ExperimentId;

    #[test]
    fn empty_list() {
        assert_eq!(experiment_list(&[]), "no experiments\n");
    }

    #[test]
    fn experiment_summary_names_versions_and_status() {
        let e = NewExperiment::new("Tone test", "v1.0.0", "v1.1.0")
            .into_experiment(ExperimentId::new(), Utc::now());
        let text = experiment(&e);
        assert!(text.contains("Tone test"));
        assert!(text.contains("[draft]"));
        assert!(text.contains("v1.0.0 vs v1.1.0 at 50/50"));
    }
}
