//! Applies an [`Automation`]'s default values to a freshly-locked draft
//! (spec.md §4.8 step 5).

use publisher_contracts::model::{Automation, DefaultField, DefaultValue, Draft};

/// Overwrites `draft`'s fields per `automation`'s `default_values`: a value
/// is applied when `apply_if_empty=false`, or when the existing field is
/// "empty" (per [`Draft::field_is_empty`]). When `auto_add_to_sale_queue` is
/// set, also forces the sale-queue preset (display resolution 8 only if
/// currently empty; watermark on; free download off).
pub fn apply_defaults(draft: &mut Draft, automation: &Automation) {
    for default in &automation.default_values {
        let should_apply = !default.apply_if_empty || draft.field_is_empty(default.field_name);
        if should_apply {
            apply_one(draft, default.field_name, &default.value);
        }
    }

    if automation.auto_add_to_sale_queue {
        if draft.field_is_empty(DefaultField::DisplayResolution) {
            draft.display_resolution = Some(8);
        }
        draft.add_watermark = true;
        draft.allow_free_download = false;
    }
}

fn apply_one(draft: &mut Draft, field: DefaultField, value: &DefaultValue) {
    match (field, value) {
        (DefaultField::Title, DefaultValue::Text(v)) => draft.title = v.clone(),
        (DefaultField::Description, DefaultValue::Text(v)) => draft.description = v.clone(),
        (DefaultField::Tags, DefaultValue::TextList(v)) => draft.tags = v.clone(),
        (DefaultField::GalleryIds, DefaultValue::TextList(v)) => draft.gallery_ids = v.clone(),
        (DefaultField::CategoryPath, DefaultValue::Text(v)) => draft.category_path = v.clone(),
        (DefaultField::IsMature, DefaultValue::Bool(v)) => draft.is_mature = *v,
        (DefaultField::MaturityLevel, DefaultValue::Maturity(v)) => draft.maturity_level = Some(*v),
        (DefaultField::AllowFreeDownload, DefaultValue::Bool(v)) => draft.allow_free_download = *v,
        (DefaultField::AddWatermark, DefaultValue::Bool(v)) => draft.add_watermark = *v,
        (DefaultField::DisplayResolution, DefaultValue::Int(v)) => draft.display_resolution = Some(*v),
        // A default value whose schema doesn't match its declared field is a
        // collaborator-side configuration bug; the scheduler leaves the
        // draft field untouched rather than guessing at a coercion.
        _ => {
            #[cfg(feature = "tracing")]
            tracing::warn!(?field, "default value schema mismatch for field");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use publisher_contracts::model::{AutomationDefaultValue, DraftSelectionMethod, DraftStatus, MaturityLevel, UploadMode};
    use uuid::Uuid;

    fn draft() -> Draft {
        let now = chrono::Utc::now();
        Draft {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: String::new(),
            description: String::new(),
            tags: vec![],
            gallery_ids: vec![],
            category_path: String::new(),
            is_mature: false,
            maturity_level: None,
            is_dirty: false,
            allow_free_download: false,
            add_watermark: false,
            display_resolution: None,
            upload_mode: UploadMode::Single,
            status: DraftStatus::Draft,
            files: vec![],
            execution_version: 0,
            stash_item_id: None,
            scheduled_at: None,
            jitter_seconds: None,
            actual_publish_at: None,
            deviantart_deviation_id: None,
            deviantart_url: None,
            error_message: None,
            updated_at: now,
            created_at: now,
        }
    }

    fn automation(default_values: Vec<AutomationDefaultValue>) -> Automation {
        Automation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            enabled: true,
            draft_selection_method: DraftSelectionMethod::Fifo,
            jitter_min_seconds: 0,
            jitter_max_seconds: 0,
            stash_only_by_default: false,
            auto_add_to_sale_queue: false,
            rules: vec![],
            default_values,
            is_executing: false,
            last_execution_lock: None,
        }
    }

    #[test]
    fn applies_default_only_when_field_is_empty() {
        let mut d = draft();
        d.title = "already set".into();
        let automation = automation(vec![AutomationDefaultValue {
            field_name: DefaultField::Title,
            value: DefaultValue::Text("default title".into()),
            apply_if_empty: true,
        }]);
        apply_defaults(&mut d, &automation);
        assert_eq!(d.title, "already set");
    }

    #[test]
    fn overwrites_unconditionally_when_apply_if_empty_is_false() {
        let mut d = draft();
        d.title = "already set".into();
        let automation = automation(vec![AutomationDefaultValue {
            field_name: DefaultField::Title,
            value: DefaultValue::Text("forced title".into()),
            apply_if_empty: false,
        }]);
        apply_defaults(&mut d, &automation);
        assert_eq!(d.title, "forced title");
    }

    #[test]
    fn fills_empty_tags_list() {
        let mut d = draft();
        let automation = automation(vec![AutomationDefaultValue {
            field_name: DefaultField::Tags,
            value: DefaultValue::TextList(vec!["a".into(), "b".into()]),
            apply_if_empty: true,
        }]);
        apply_defaults(&mut d, &automation);
        assert_eq!(d.tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn maturity_level_default_applies() {
        let mut d = draft();
        let automation = automation(vec![AutomationDefaultValue {
            field_name: DefaultField::MaturityLevel,
            value: DefaultValue::Maturity(MaturityLevel::Strict),
            apply_if_empty: true,
        }]);
        apply_defaults(&mut d, &automation);
        assert_eq!(d.maturity_level, Some(MaturityLevel::Strict));
    }

    #[test]
    fn sale_queue_preset_forces_watermark_and_download_flag_but_only_fills_empty_resolution() {
        let mut d = draft();
        d.display_resolution = Some(4);
        let mut automation = automation(vec![]);
        automation.auto_add_to_sale_queue = true;
        apply_defaults(&mut d, &automation);
        assert_eq!(d.display_resolution, Some(4));
        assert!(d.add_watermark);
        assert!(!d.allow_free_download);
    }

    #[test]
    fn sale_queue_preset_fills_resolution_when_empty() {
        let mut d = draft();
        let mut automation = automation(vec![]);
        automation.auto_add_to_sale_queue = true;
        apply_defaults(&mut d, &automation);
        assert_eq!(d.display_resolution, Some(8));
    }

    #[test]
    fn mismatched_schema_is_ignored() {
        let mut d = draft();
        let automation = automation(vec![AutomationDefaultValue {
            field_name: DefaultField::Title,
            value: DefaultValue::Bool(true),
            apply_if_empty: true,
        }]);
        apply_defaults(&mut d, &automation);
        assert_eq!(d.title, "");
    }
}
