//! Scheduling engine (C8): one tick evaluates every enabled automation,
//! fires at most one rule per automation, selects and locks drafts, applies
//! defaults, and enqueues a delayed publish job for each (spec.md §4.8).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use publisher_contracts::model::{
    Automation, DraftStatus, ExecutionLog, PublishJobPayload, ScheduleRule, ScheduleRuleVariant,
};
use publisher_contracts::ports::{Clock, Persistence};
use publisher_contracts::PublisherError;
use publisher_queue::JobQueue;
use rand::Rng;
use uuid::Uuid;

use crate::{defaults, rules, selection};

/// Default staleness window before a held automation lease may be taken
/// over by another scheduler instance (spec.md §4.8 step 1).
pub const DEFAULT_LEASE_STALE_AFTER: chrono::Duration = chrono::Duration::minutes(5);

pub struct SchedulingEngine<Q: JobQueue<PublishJobPayload>> {
    persistence: Arc<dyn Persistence>,
    queue: Arc<Q>,
    clock: Arc<dyn Clock>,
    lease_stale_after: chrono::Duration,
}

impl<Q: JobQueue<PublishJobPayload>> SchedulingEngine<Q> {
    pub fn new(persistence: Arc<dyn Persistence>, queue: Arc<Q>, clock: Arc<dyn Clock>) -> Self {
        Self {
            persistence,
            queue,
            clock,
            lease_stale_after: DEFAULT_LEASE_STALE_AFTER,
        }
    }

    pub fn with_lease_stale_after(mut self, d: chrono::Duration) -> Self {
        self.lease_stale_after = d;
        self
    }

    /// Runs one tick: every enabled automation is evaluated independently;
    /// a per-automation error is caught, logged, and does not abort the
    /// rest of the tick.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn run_tick(&self) {
        let automations = match self.persistence.list_enabled_automations().await {
            Ok(a) => a,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %_err, "failed to list enabled automations");
                return;
            }
        };

        for automation in automations {
            self.run_automation(automation).await;
        }
    }

    async fn run_automation(&self, automation: Automation) {
        let now = self.clock.now();
        let acquired = match self
            .persistence
            .try_acquire_automation_lock(automation.id, now, self.lease_stale_after)
            .await
        {
            Ok(acquired) => acquired,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(automation_id = %automation.id, error = %_err, "failed to acquire automation lease");
                return;
            }
        };
        if !acquired {
            return;
        }

        let outcome = self.evaluate_and_enqueue(&automation, now).await;

        if let Err(_err) = self.persistence.release_automation_lock(automation.id).await {
            #[cfg(feature = "tracing")]
            tracing::error!(automation_id = %automation.id, error = %_err, "failed to release automation lease");
        }

        match outcome {
            Ok(Some((variant, scheduled_count))) => {
                self.write_log(automation.id, now, scheduled_count, None, Some(variant)).await;
            }
            Ok(None) => {}
            Err(err) => {
                self.write_log(automation.id, now, 0, Some(err.to_string()), None).await;
            }
        }
    }

    async fn write_log(
        &self,
        automation_id: Uuid,
        executed_at: DateTime<Utc>,
        scheduled_count: u32,
        error_message: Option<String>,
        rule_variant: Option<ScheduleRuleVariant>,
    ) {
        let log = ExecutionLog {
            id: Uuid::new_v4(),
            automation_id,
            executed_at,
            scheduled_count,
            error_message,
            rule_variant,
        };
        if let Err(_err) = self.persistence.append_execution_log(log).await {
            #[cfg(feature = "tracing")]
            tracing::error!(%automation_id, error = %_err, "failed to append execution log");
        }
    }

    async fn evaluate_and_enqueue(
        &self,
        automation: &Automation,
        now: DateTime<Utc>,
    ) -> Result<Option<(ScheduleRuleVariant, u32)>, PublisherError> {
        let user = self
            .persistence
            .get_user(automation.user_id)
            .await?
            .ok_or_else(|| PublisherError::validation(format!("unknown user {}", automation.user_id)))?;
        let tz: Tz = user
            .timezone
            .parse()
            .map_err(|_| PublisherError::validation(format!("invalid timezone: {}", user.timezone)))?;
        let local_now = rules::to_local(now, &tz);

        for rule in rules::ordered_rules(&automation.rules) {
            if self.rule_fires(automation, rule, now, local_now).await? {
                let count = rules::count_for_rule(rule);
                let scheduled = self.select_and_enqueue(automation, count, now).await?;
                return Ok(Some((ScheduleRuleVariant::from(rule), scheduled)));
            }
        }
        Ok(None)
    }

    async fn rule_fires(
        &self,
        automation: &Automation,
        rule: &ScheduleRule,
        now: DateTime<Utc>,
        local_now: DateTime<Tz>,
    ) -> Result<bool, PublisherError> {
        match rule {
            ScheduleRule::FixedTime {
                days_of_week,
                time_of_day,
                ..
            } => Ok(rules::fixed_time_fires(days_of_week, *time_of_day, local_now)),
            ScheduleRule::FixedInterval {
                days_of_week,
                interval_minutes,
                ..
            } => {
                let last_executed_at = self
                    .persistence
                    .last_execution_log(automation.id)
                    .await?
                    .map(|log| log.executed_at);
                Ok(rules::fixed_interval_fires(
                    days_of_week,
                    *interval_minutes,
                    now,
                    local_now,
                    last_executed_at,
                ))
            }
            ScheduleRule::DailyQuota {
                days_of_week,
                daily_quota,
                ..
            } => {
                let (day_start, day_end) = rules::local_day_bounds(local_now);
                let published_today = self
                    .persistence
                    .count_published_today(automation.id, day_start, day_end)
                    .await?;
                Ok(rules::daily_quota_fires(days_of_week, *daily_quota, published_today, local_now))
            }
        }
    }

    async fn select_and_enqueue(
        &self,
        automation: &Automation,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<u32, PublisherError> {
        let candidates = self.persistence.list_schedulable_drafts(automation.user_id).await?;
        let ordered = selection::order_candidates(candidates, automation.draft_selection_method);

        let mut scheduled = 0u32;
        for draft in ordered {
            if scheduled >= count {
                break;
            }

            let expected_version = draft.execution_version;
            let automation_for_update = automation.clone();
            let jitter_seconds = if automation.jitter_min_seconds >= automation.jitter_max_seconds {
                automation.jitter_min_seconds
            } else {
                rand::rng().random_range(automation.jitter_min_seconds..=automation.jitter_max_seconds)
            };
            let fire_at = now + chrono::Duration::seconds(jitter_seconds);

            let applied = self
                .persistence
                .update_draft_if_version_matches(
                    draft.id,
                    expected_version,
                    Box::new(move |d| {
                        d.status = DraftStatus::Scheduled;
                        defaults::apply_defaults(d, &automation_for_update);
                        d.scheduled_at = Some(now);
                        d.jitter_seconds = Some(jitter_seconds);
                        d.actual_publish_at = Some(fire_at);
                    }),
                )
                .await?;
            if !applied {
                // Lost the optimistic-lock race to another scheduler tick
                // or worker; move on to the next candidate.
                continue;
            }

            let payload = PublishJobPayload {
                draft_id: draft.id,
                user_id: draft.user_id,
                upload_mode: draft.upload_mode,
            };
            let job_id = PublishJobPayload::job_id(draft.id);

            match self.queue.schedule(job_id, payload, fire_at).await {
                Ok(()) => scheduled += 1,
                Err(err) => {
                    let message = err.to_string();
                    let _ = self
                        .persistence
                        .update_draft_if_version_matches(
                            draft.id,
                            expected_version + 1,
                            Box::new(move |d| {
                                d.status = DraftStatus::Draft;
                                d.error_message = Some(format!("enqueue failed: {message}"));
                            }),
                        )
                        .await;
                }
            }
        }
        Ok(scheduled)
    }
}
