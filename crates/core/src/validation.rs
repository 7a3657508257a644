//! Administrative validation of interstitial definitions. Invalid rule data
//! is rejected here so the decision engine never has to evaluate it.

use crate::error::{InterludeError, InterludeResult};
use crate::event_name::EventRegistry;
use crate::types::{CreateInterstitialRequest, Frequency};

const MAX_FIELD_LEN: usize = 255;

/// Validate a definition. Returns every problem found, not just the first.
pub fn check(req: &CreateInterstitialRequest, events: &EventRegistry) -> Vec<String> {
    let mut problems = Vec::new();

    required_short_field("name", &req.name, &mut problems);
    required_short_field("title", &req.title, &mut problems);

    for (field, value) in [
        ("view_name", &req.view_name),
        ("redirect_after", &req.redirect_after),
        ("inline_slot", &req.inline_slot),
        ("audience_condition", &req.audience_condition),
    ] {
        if value.as_ref().is_some_and(|v| v.len() > MAX_FIELD_LEN) {
            problems.push(format!("{field} exceeds {MAX_FIELD_LEN} characters"));
        }
    }

    if let (Some(start), Some(end)) = (req.trigger_schedule_start, req.trigger_schedule_end) {
        if end < start {
            problems.push("trigger_schedule_end must not be before trigger_schedule_start".into());
        }
    }

    match (req.frequency, req.frequency_days) {
        (Frequency::EveryXDays, None) => {
            problems.push("frequency_days is required for every_x_days frequency".into());
        }
        (_, Some(0)) => problems.push("frequency_days must be at least 1".into()),
        _ => {}
    }

    if req.trigger_routes.iter().any(|r| r.trim().is_empty()) {
        problems.push("trigger_routes must not contain blank patterns".into());
    }

    if req.cta_buttons.iter().any(|b| b.label.trim().is_empty()) {
        problems.push("every cta button needs a label".into());
    }

    if let Some(event) = &req.trigger_event {
        if let Err(e) = events.validate(event) {
            problems.push(match e {
                InterludeError::Validation(msg) => msg,
                other => other.to_string(),
            });
        }
    }

    problems
}

/// Validate a definition, folding all problems into one `Validation` error.
pub fn validate(req: &CreateInterstitialRequest, events: &EventRegistry) -> InterludeResult<()> {
    let problems = check(req, events);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(InterludeError::Validation(problems.join("; ")))
    }
}

fn required_short_field(field: &str, value: &str, problems: &mut Vec<String>) {
    if value.trim().is_empty() {
        problems.push(format!("{field} is required"));
    } else if value.len() > MAX_FIELD_LEN {
        problems.push(format!("{field} exceeds {MAX_FIELD_LEN} characters"));
    }
}
