//! Domain model for the publisher core.
//!
//! These types mirror the persistence-layer rows a real collaborator would
//! store in its database; this crate owns only their in-memory shape and the
//! invariants the rest of the workspace depends on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upstream identity for a user, including the OAuth token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    /// IANA timezone name used by the scheduling engine to compute local time/day.
    pub timezone: String,
    pub requires_reauth: bool,
    /// Set once a reauth-needed alert has been sent, so the alert collaborator
    /// does not re-notify on every token check. Cleared on successful refresh.
    pub reauth_email_sent: bool,
}

impl User {
    /// `tokenExpiresAt <= refreshTokenExpiresAt`, and either both token fields
    /// are set or the user is flagged `requires_reauth`.
    pub fn invariants_hold(&self) -> bool {
        if self.requires_reauth {
            return true;
        }
        match (self.access_token.is_some(), self.refresh_token.is_some()) {
            (true, true) => match (self.token_expires_at, self.refresh_token_expires_at) {
                (Some(access_exp), Some(refresh_exp)) => access_exp <= refresh_exp,
                _ => false,
            },
            (false, false) => true,
            _ => false,
        }
    }
}

/// Bucketed classification of how close a refresh token is to expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenExpiryStatus {
    /// More than 14 days remaining.
    Valid,
    /// Between 0 and 14 days remaining.
    ExpiringSoon,
    /// Already expired.
    Invalid,
}

impl RefreshTokenExpiryStatus {
    pub fn classify(refresh_token_expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let remaining = refresh_token_expires_at - now;
        if remaining <= chrono::Duration::zero() {
            Self::Invalid
        } else if remaining <= chrono::Duration::days(14) {
            Self::ExpiringSoon
        } else {
            Self::Valid
        }
    }
}

/// Upload mode for a draft's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    Single,
    Multiple,
}

/// Lifecycle status of a [`Draft`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl DraftStatus {
    /// Whether `self -> next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use DraftStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Scheduled, Draft)
                | (Failed, Scheduled)
                | (Scheduled, Publishing)
                | (Publishing, Published)
                | (Publishing, Failed)
        )
    }
}

/// Maturity rating applied to a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaturityLevel {
    Moderate,
    Strict,
}

/// A single binary artifact attached to a [`Draft`], ordered by `sort_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftFile {
    pub id: Uuid,
    pub draft_id: Uuid,
    pub blob_key: String,
    pub mime: String,
    pub size_bytes: u64,
    pub sort_order: i32,
}

/// A user-authored artwork submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub gallery_ids: Vec<String>,
    pub category_path: String,
    pub is_mature: bool,
    pub maturity_level: Option<MaturityLevel>,
    pub is_dirty: bool,
    pub allow_free_download: bool,
    pub add_watermark: bool,
    pub display_resolution: Option<u8>,
    pub upload_mode: UploadMode,
    pub status: DraftStatus,
    pub files: Vec<DraftFile>,
    /// Optimistic-concurrency token; every state-changing update predicates
    /// on this value and increments it.
    pub execution_version: i64,
    pub stash_item_id: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub jitter_seconds: Option<i64>,
    pub actual_publish_at: Option<DateTime<Utc>>,
    pub deviantart_deviation_id: Option<String>,
    pub deviantart_url: Option<String>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Draft {
    pub fn is_eligible_for_publish(&self) -> bool {
        matches!(
            self.status,
            DraftStatus::Scheduled | DraftStatus::Publishing | DraftStatus::Failed
        ) && !self.files.is_empty()
    }

    /// Files ordered by `sort_order` ascending, per the publish executor's
    /// iteration contract.
    pub fn files_in_order(&self) -> Vec<&DraftFile> {
        let mut files: Vec<&DraftFile> = self.files.iter().collect();
        files.sort_by_key(|f| f.sort_order);
        files
    }

    /// Field is "empty" in the sense `AutomationDefaultValue.apply_if_empty`
    /// uses: null, empty string, empty list, false, or zero.
    pub fn field_is_empty(&self, field: DefaultField) -> bool {
        match field {
            DefaultField::Title => self.title.is_empty(),
            DefaultField::Description => self.description.is_empty(),
            DefaultField::Tags => self.tags.is_empty(),
            DefaultField::GalleryIds => self.gallery_ids.is_empty(),
            DefaultField::CategoryPath => self.category_path.is_empty(),
            DefaultField::IsMature => !self.is_mature,
            DefaultField::MaturityLevel => self.maturity_level.is_none(),
            DefaultField::AllowFreeDownload => !self.allow_free_download,
            DefaultField::AddWatermark => !self.add_watermark,
            DefaultField::DisplayResolution => {
                self.display_resolution.is_none() || self.display_resolution == Some(0)
            }
        }
    }
}

/// Draft selection order used by [`Automation::draft_selection_method`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftSelectionMethod {
    Fifo,
    Lifo,
    Random,
}

/// Days-of-week filter shared by every schedule rule variant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaysOfWeek {
    pub days: Option<Vec<chrono::Weekday>>,
}

impl DaysOfWeek {
    pub fn passes(&self, day: chrono::Weekday) -> bool {
        match &self.days {
            None => true,
            Some(days) => days.contains(&day),
        }
    }
}

/// A schedule rule: one automation may carry several, tie-broken by `priority`
/// and then deterministically by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleRule {
    FixedTime {
        id: Uuid,
        enabled: bool,
        priority: i32,
        days_of_week: DaysOfWeek,
        /// `HH:MM` in the user's local timezone.
        time_of_day: (u8, u8),
    },
    FixedInterval {
        id: Uuid,
        enabled: bool,
        priority: i32,
        days_of_week: DaysOfWeek,
        interval_minutes: i64,
        deviations_per_interval: u32,
    },
    DailyQuota {
        id: Uuid,
        enabled: bool,
        priority: i32,
        days_of_week: DaysOfWeek,
        daily_quota: u32,
    },
}

impl ScheduleRule {
    pub fn id(&self) -> Uuid {
        match self {
            ScheduleRule::FixedTime { id, .. }
            | ScheduleRule::FixedInterval { id, .. }
            | ScheduleRule::DailyQuota { id, .. } => *id,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            ScheduleRule::FixedTime { enabled, .. }
            | ScheduleRule::FixedInterval { enabled, .. }
            | ScheduleRule::DailyQuota { enabled, .. } => *enabled,
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            ScheduleRule::FixedTime { priority, .. }
            | ScheduleRule::FixedInterval { priority, .. }
            | ScheduleRule::DailyQuota { priority, .. } => *priority,
        }
    }
}

/// One of the fixed fields an [`AutomationDefaultValue`] may overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultField {
    Title,
    Description,
    Tags,
    GalleryIds,
    CategoryPath,
    IsMature,
    MaturityLevel,
    AllowFreeDownload,
    AddWatermark,
    DisplayResolution,
}

/// The value carried by an [`AutomationDefaultValue`]; schema depends on
/// `field_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefaultValue {
    Text(String),
    TextList(Vec<String>),
    Bool(bool),
    Maturity(MaturityLevel),
    /// 0-8, used by `display_resolution`.
    Int(u8),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationDefaultValue {
    pub field_name: DefaultField,
    pub value: DefaultValue,
    pub apply_if_empty: bool,
}

/// A user-configured rule set that auto-schedules drafts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub enabled: bool,
    pub draft_selection_method: DraftSelectionMethod,
    pub jitter_min_seconds: i64,
    pub jitter_max_seconds: i64,
    pub stash_only_by_default: bool,
    pub auto_add_to_sale_queue: bool,
    pub rules: Vec<ScheduleRule>,
    pub default_values: Vec<AutomationDefaultValue>,
    pub is_executing: bool,
    pub last_execution_lock: Option<DateTime<Utc>>,
}

/// Append-only record of one scheduling-engine evaluation of an [`Automation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub automation_id: Uuid,
    pub executed_at: DateTime<Utc>,
    pub scheduled_count: u32,
    pub error_message: Option<String>,
    pub rule_variant: Option<ScheduleRuleVariant>,
}

/// Tag identifying which [`ScheduleRule`] variant triggered an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleRuleVariant {
    FixedTime,
    FixedInterval,
    DailyQuota,
}

impl From<&ScheduleRule> for ScheduleRuleVariant {
    fn from(rule: &ScheduleRule) -> Self {
        match rule {
            ScheduleRule::FixedTime { .. } => Self::FixedTime,
            ScheduleRule::FixedInterval { .. } => Self::FixedInterval,
            ScheduleRule::DailyQuota { .. } => Self::DailyQuota,
        }
    }
}

/// Payload carried by a [`crate::ports`]-queued publish job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishJobPayload {
    pub draft_id: Uuid,
    pub user_id: Uuid,
    pub upload_mode: UploadMode,
}

impl PublishJobPayload {
    /// The deterministic job id for a draft: `publish:<draft_id>`.
    pub fn job_id(draft_id: Uuid) -> String {
        format!("publish:{draft_id}")
    }
}
