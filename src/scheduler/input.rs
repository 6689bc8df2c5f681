//! `HH:MM <channel> <period> <format>` schedule definitions

use crate::config::parse_clock_time;
use crate::error::TrackerError;
use crate::storage::ScheduleStore;
use crate::types::{ChannelId, OutputFormat, Period, Schedule, ScheduleSpec, ServerId};

/// Usage string shown with input errors
pub const SCHEDULE_USAGE: &str = "<HH:MM> <here|channel id|#channel> <daily|weekly|monthly> <table|graph>";

fn invalid(reason: impl Into<String>) -> TrackerError {
    TrackerError::InvalidScheduleInput {
        reason: reason.into(),
    }
}

/// Parse a schedule definition such as `21:00 here daily graph`.
/// `here` resolves to `current_channel`.
pub fn parse_schedule_input(
    text: &str,
    current_channel: ChannelId,
) -> Result<ScheduleSpec, TrackerError> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(invalid(format!(
            "expected 4 fields, e.g. `21:00 here daily graph` ({})",
            SCHEDULE_USAGE
        )));
    }

    let time_text = parts[0];
    if !time_text.contains(':') {
        return Err(invalid(format!("time must look like 21:00, got `{}`", time_text)));
    }
    let time = parse_clock_time(time_text)
        .ok_or_else(|| invalid(format!("time must look like 21:00, got `{}`", time_text)))?;

    let channel_id = parse_channel(parts[1], current_channel)?;

    let period: Period = parts[2].parse()?;
    let format: OutputFormat = parts[3].parse()?;

    Ok(ScheduleSpec {
        time,
        channel_id,
        period,
        format,
    })
}

/// Replace the time, channel, period and format of an existing schedule.
/// The enabled state and creator are kept.
pub fn edit_schedule(
    store: &dyn ScheduleStore,
    server_id: ServerId,
    local_id: u32,
    text: &str,
    current_channel: ChannelId,
) -> crate::error::Result<Schedule> {
    let spec = parse_schedule_input(text, current_channel)?;
    store.update_schedule(server_id, local_id, &spec)
}

fn parse_channel(text: &str, current_channel: ChannelId) -> Result<ChannelId, TrackerError> {
    if text.eq_ignore_ascii_case("here") {
        return Ok(current_channel);
    }

    if let Some(inner) = text.strip_prefix("<#").and_then(|rest| rest.strip_suffix('>')) {
        return parse_digits(inner).ok_or_else(|| invalid("malformed channel mention"));
    }

    parse_digits(text).ok_or_else(|| {
        invalid("channel must be `here`, a channel id, or a channel mention")
    })
}

fn parse_digits(text: &str) -> Option<ChannelId> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
