use std::{collections::HashMap, fmt::Write as _};

use super::core::{MetricsState, METRICS_STATE};

pub(crate) const BROADCAST_DROP_REASON_CLOSED: &str = "closed";
pub(crate) const BROADCAST_DROP_REASON_FULL_QUEUE: &str = "full_queue";
pub(crate) const BROADCAST_DROP_REASON_OVERSIZED: &str = "oversized_outbound";
pub(crate) const BROADCAST_DROP_REASON_SERIALIZE_ERROR: &str = "serialize_error";

pub(crate) fn metrics_state() -> &'static MetricsState {
    METRICS_STATE.get_or_init(MetricsState::default)
}

fn sorted<K: Ord + Clone>(counters: &std::sync::Mutex<HashMap<K, u64>>) -> Vec<(K, u64)> {
    let mut entries: Vec<_> = counters
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone())
        .into_iter()
        .collect();
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));
    entries
}

pub(crate) fn render_metrics() -> String {
    let state = metrics_state();
    let mut output = String::new();

    output.push_str(
        "# HELP nexus_authorization_denials_total Count of denied privileged actions by action and reason\n",
    );
    output.push_str("# TYPE nexus_authorization_denials_total counter\n");
    for ((action, reason), value) in sorted(&state.authorization_denials) {
        let _ = writeln!(
            output,
            "nexus_authorization_denials_total{{action=\"{action}\",reason=\"{reason}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP nexus_broadcast_events_total Count of broadcast payloads delivered to subscribers\n",
    );
    output.push_str("# TYPE nexus_broadcast_events_total counter\n");
    for (event_type, value) in sorted(&state.broadcast_events) {
        let _ = writeln!(
            output,
            "nexus_broadcast_events_total{{event_type=\"{event_type}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP nexus_broadcast_dropped_total Count of broadcast payloads dropped by reason\n",
    );
    output.push_str("# TYPE nexus_broadcast_dropped_total counter\n");
    for (reason, value) in sorted(&state.broadcast_dropped) {
        let _ = writeln!(
            output,
            "nexus_broadcast_dropped_total{{reason=\"{reason}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP nexus_outbound_url_blocked_total Count of outbound URLs refused by the private address guard\n",
    );
    output.push_str("# TYPE nexus_outbound_url_blocked_total counter\n");
    for (surface, value) in sorted(&state.outbound_url_blocked) {
        let _ = writeln!(
            output,
            "nexus_outbound_url_blocked_total{{surface=\"{surface}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP nexus_webhook_deliveries_total Count of outgoing webhook deliveries by outcome\n",
    );
    output.push_str("# TYPE nexus_webhook_deliveries_total counter\n");
    for (outcome, value) in sorted(&state.webhook_deliveries) {
        let _ = writeln!(
            output,
            "nexus_webhook_deliveries_total{{outcome=\"{outcome}\"}} {value}"
        );
    }

    output
}

pub(crate) fn record_authorization_denial(action: &'static str, reason: &'static str) {
    if let Ok(mut counters) = metrics_state().authorization_denials.lock() {
        let entry = counters.entry((action, reason)).or_insert(0);
        *entry += 1;
    }
}

pub(crate) fn record_broadcast_delivered(event_type: &'static str, delivered: usize) {
    if delivered == 0 {
        return;
    }
    if let Ok(mut counters) = metrics_state().broadcast_events.lock() {
        let entry = counters.entry(event_type).or_insert(0);
        *entry += u64::try_from(delivered).unwrap_or(u64::MAX);
    }
}

pub(crate) fn record_broadcast_dropped(reason: &'static str) {
    if let Ok(mut counters) = metrics_state().broadcast_dropped.lock() {
        let entry = counters.entry(reason).or_insert(0);
        *entry += 1;
    }
}

pub(crate) fn record_outbound_url_blocked(surface: &'static str) {
    if let Ok(mut counters) = metrics_state().outbound_url_blocked.lock() {
        let entry = counters.entry(surface).or_insert(0);
        *entry += 1;
    }
}

pub(crate) fn record_webhook_delivery(outcome: &'static str) {
    if let Ok(mut counters) = metrics_state().webhook_deliveries.lock() {
        let entry = counters.entry(outcome).or_insert(0);
        *entry += 1;
    }
}
