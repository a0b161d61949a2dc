//! Schedule-rule evaluation (spec.md §4.8 step 2): one function per
//! [`ScheduleRule`] variant, plus the count each fired variant contributes.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use publisher_contracts::model::{DaysOfWeek, ScheduleRule};

/// Converts `now` into the given IANA timezone. Callers treat a parse
/// failure on the user's stored timezone string as a per-automation
/// evaluation error, not a panic.
pub fn to_local(now: DateTime<Utc>, tz: &Tz) -> DateTime<Tz> {
    now.with_timezone(tz)
}

/// `fixed_time` fires when today's day-of-week passes the filter and the
/// rule's `HH:MM` falls within the window `[HH:MM, HH:MM + 7min]` of the
/// local time — the 7-minute window absorbs the 5-minute tick cadence plus
/// 2 minutes of slack.
pub fn fixed_time_fires(days_of_week: &DaysOfWeek, time_of_day: (u8, u8), local_now: DateTime<Tz>) -> bool {
    if !days_of_week.passes(local_now.weekday()) {
        return false;
    }
    let rule_minutes = time_of_day.0 as i64 * 60 + time_of_day.1 as i64;
    let now_minutes = local_now.hour() as i64 * 60 + local_now.minute() as i64;
    let elapsed = now_minutes - rule_minutes;
    (0..=7).contains(&elapsed)
}

/// `fixed_interval` fires when no prior execution log exists, or the most
/// recent one is at least `interval_minutes` old.
pub fn fixed_interval_fires(
    days_of_week: &DaysOfWeek,
    interval_minutes: i64,
    now: DateTime<Utc>,
    local_now: DateTime<Tz>,
    last_executed_at: Option<DateTime<Utc>>,
) -> bool {
    if !days_of_week.passes(local_now.weekday()) {
        return false;
    }
    match last_executed_at {
        None => true,
        Some(last) => now - last >= chrono::Duration::minutes(interval_minutes),
    }
}

/// `daily_quota` fires while the sum of `scheduledCount` logged so far today
/// (local day) is still under the quota.
pub fn daily_quota_fires(days_of_week: &DaysOfWeek, daily_quota: u32, published_today: u32, local_now: DateTime<Tz>) -> bool {
    if !days_of_week.passes(local_now.weekday()) {
        return false;
    }
    published_today < daily_quota
}

/// Count of drafts to schedule this tick for a fired rule (spec.md §4.8
/// step 3).
pub fn count_for_rule(rule: &ScheduleRule) -> u32 {
    match rule {
        ScheduleRule::FixedTime { .. } => 1,
        ScheduleRule::FixedInterval {
            deviations_per_interval,
            ..
        } => *deviations_per_interval,
        ScheduleRule::DailyQuota { .. } => 1,
    }
}

/// Local midnight-to-midnight bounds (as UTC instants) for the day
/// containing `local_now`, used to query `count_published_today`.
pub fn local_day_bounds(local_now: DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    let tz = local_now.timezone();
    let start = tz
        .from_local_datetime(&start)
        .single()
        .unwrap_or(local_now);
    let end = start + chrono::Duration::days(1);
    (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

/// Orders an automation's enabled rules for evaluation: ascending priority,
/// ties broken deterministically by rule id.
pub fn ordered_rules(rules: &[ScheduleRule]) -> Vec<&ScheduleRule> {
    let mut enabled: Vec<&ScheduleRule> = rules.iter().filter(|r| r.enabled()).collect();
    enabled.sort_by_key(|r| (r.priority(), r.id()));
    enabled
}
