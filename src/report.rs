//! Console formatting for received events and health records

use relaypool::{ReceivedEvent, RelayHealth, RelayStatus};

const CONTENT_PREVIEW_CHARS: usize = 80;

fn status_label(status: RelayStatus) -> &'static str {
    match status {
        RelayStatus::Connecting => "connecting",
        RelayStatus::Connected => "connected",
        RelayStatus::WaitingRetry => "waiting_retry",
        RelayStatus::Disconnected => "disconnected",
    }
}

/// One line per health record
pub fn health_line(health: &RelayHealth) -> String {
    let mut line = format!(
        "{} {} subs={}",
        health.url,
        status_label(health.status),
        health.active_subscriptions
    );

    if health.status == RelayStatus::WaitingRetry {
        line.push_str(&format!(" attempt={}", health.retry_attempt));
        if let Some(next_retry) = health.next_retry {
            line.push_str(&format!(" next_retry={}", next_retry.format("%H:%M:%S")));
        }
    }

    if let Some(error) = &health.error_description {
        line.push_str(&format!(" error=\"{}\"", error));
    }

    line
}

/// One line per received event, content shortened to a single-line preview
pub fn event_line(received: &ReceivedEvent) -> String {
    let event = &received.event;
    let mut preview: String = event
        .content
        .chars()
        .take(CONTENT_PREVIEW_CHARS)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if event.content.chars().count() > CONTENT_PREVIEW_CHARS {
        preview.push_str("...");
    }

    let short_id: String = event.id.chars().take(12).collect();

    format!(
        "[{}] sub={} kind={} id={} {}",
        received.relay, received.subscription_id, event.kind, short_id, preview
    )
}
