//! Deterministic LLM prompt rendering.
//!
//! The renderer trims the analysis result to configured caps, serializes
//! it as stable pretty-printed JSON, and substitutes it into a fixed text
//! template. Trimming never reorders: outages, candidates and paths keep
//! the ordering the analyzer produced, and impact events are already
//! sorted by (occurred_at, id). If the template is missing a slot the
//! renderer falls back to a plain concatenation.

use serde::Serialize;

use faultline_core::config::PromptOptions;
use faultline_core::model::{AlarmPath, AnalysisResult, AppOutage, Candidate, PathImpact};

const PROMPT_TEMPLATE: &str = "\
You are {{role}}.
Language: {{language}}

A burst of infrastructure alarms inside one observation window was
correlated against the deployment topology. The structured data below
lists detected application outages, probable root-cause candidates
ranked by confidence, and the affected subtree for each candidate.

Structured Data:
{{payload}}

{{expectation}}
";

fn default_options() -> PromptOptions {
    PromptOptions {
        assistant_role: "a senior SRE on-call engineer".to_string(),
        language: "en-US".to_string(),
        output_expectation: "Respond with a JSON array of objects carrying \
                             \"cause\", \"confidence\", \"coverage\", \"summary\" \
                             and \"next_action\" fields."
            .to_string(),
        max_app_outages: 3,
        max_affected_nodes: 5,
        max_candidates: 5,
        max_explained_event_ids: 6,
        max_paths: 5,
        max_impacts_per_level: 5,
        max_events_per_impact: 5,
    }
}

/// Replace zero-valued caps and empty strings with the defaults
fn normalize(mut opts: PromptOptions) -> PromptOptions {
    let defaults = default_options();
    if opts.assistant_role.is_empty() {
        opts.assistant_role = defaults.assistant_role;
    }
    if opts.language.is_empty() {
        opts.language = defaults.language;
    }
    if opts.output_expectation.is_empty() {
        opts.output_expectation = defaults.output_expectation;
    }
    if opts.max_app_outages == 0 {
        opts.max_app_outages = defaults.max_app_outages;
    }
    if opts.max_affected_nodes == 0 {
        opts.max_affected_nodes = defaults.max_affected_nodes;
    }
    if opts.max_candidates == 0 {
        opts.max_candidates = defaults.max_candidates;
    }
    if opts.max_explained_event_ids == 0 {
        opts.max_explained_event_ids = defaults.max_explained_event_ids;
    }
    if opts.max_paths == 0 {
        opts.max_paths = defaults.max_paths;
    }
    if opts.max_impacts_per_level == 0 {
        opts.max_impacts_per_level = defaults.max_impacts_per_level;
    }
    if opts.max_events_per_impact == 0 {
        opts.max_events_per_impact = defaults.max_events_per_impact;
    }
    opts
}

#[derive(Debug, Serialize)]
struct PromptPayload {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    app_outages: Vec<AppOutage>,
    candidates: Vec<Candidate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    paths: Vec<AlarmPath>,
}

/// Render the triage prompt for an analysis result
pub fn render_prompt(result: &AnalysisResult, opts: &PromptOptions) -> String {
    let opts = normalize(opts.clone());
    let payload = trim_result(result, &opts);
    let json = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string());

    match render_template(
        PROMPT_TEMPLATE,
        &[
            ("{{role}}", &opts.assistant_role),
            ("{{language}}", &opts.language),
            ("{{payload}}", &json),
            ("{{expectation}}", &opts.output_expectation),
        ],
    ) {
        Some(prompt) => prompt,
        None => fallback_prompt(&opts.assistant_role, &json),
    }
}

/// Substitute every slot; `None` when the template is missing one
fn render_template(template: &str, slots: &[(&str, &str)]) -> Option<String> {
    let mut rendered = template.to_string();
    for (slot, value) in slots {
        if !rendered.contains(slot) {
            return None;
        }
        rendered = rendered.replace(slot, value);
    }
    Some(rendered)
}

fn fallback_prompt(role: &str, payload: &str) -> String {
    format!("Role: {role}\nStructured Data:\n{payload}\n")
}

fn trim_result(result: &AnalysisResult, opts: &PromptOptions) -> PromptPayload {
    let app_outages: Vec<AppOutage> = result
        .app_outages
        .iter()
        .take(opts.max_app_outages)
        .map(|outage| {
            let mut outage = outage.clone();
            outage.affected_nodes.truncate(opts.max_affected_nodes);
            outage
        })
        .collect();

    let candidates: Vec<Candidate> = result
        .candidates
        .iter()
        .take(opts.max_candidates)
        .map(|candidate| {
            let mut candidate = candidate.clone();
            candidate.explained.truncate(opts.max_explained_event_ids);
            candidate
        })
        .collect();

    let kept: std::collections::BTreeSet<&str> =
        candidates.iter().map(|c| c.node.key.as_str()).collect();

    let paths: Vec<AlarmPath> = result
        .paths
        .iter()
        .filter(|path| kept.contains(path.candidate.key.as_str()))
        .take(opts.max_paths)
        .map(|path| AlarmPath {
            candidate: path.candidate.clone(),
            impacts: trim_impacts(&path.impacts, opts),
        })
        .collect();

    PromptPayload {
        app_outages,
        candidates,
        paths,
    }
}

fn trim_impacts(impacts: &[PathImpact], opts: &PromptOptions) -> Vec<PathImpact> {
    impacts
        .iter()
        .take(opts.max_impacts_per_level)
        .map(|impact| PathImpact {
            node: impact.node.clone(),
            events: impact
                .events
                .iter()
                .take(opts.max_events_per_impact)
                .cloned()
                .collect(),
            impacts: trim_impacts(&impact.impacts, opts),
        })
        .collect()
}
