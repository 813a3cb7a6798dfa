use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Marker the backend uses for the viewer's own patient record.
pub const GRANTED_FOR_SELF: &str = "Self";

/// Backend-sourced user metadata. Shared-read by many components, written
/// only through explicit update calls, cached in the session layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub language: Option<String>,
    pub theme: Option<String>,
    pub medical_conditions: Vec<String>,
    pub family_history: Vec<FamilyHistoryEntry>,
    pub is_new_user: Option<bool>,
    pub onboarding_completed: bool,
    pub onboarding_skipped: bool,
    pub onboarding_step: Option<u8>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Effective first-run flag: an explicit backend flag wins; otherwise a
    /// profile that neither completed nor skipped onboarding is new.
    pub fn effective_is_new_user(&self) -> bool {
        self.is_new_user
            .unwrap_or(!(self.onboarding_completed || self.onboarding_skipped))
    }

    pub fn display_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyHistoryEntry {
    pub relation: String,
    pub condition: String,
}

/// Partial profile update; only populated fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_conditions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_history: Option<Vec<FamilyHistoryEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_step: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_skipped: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self == &ProfileUpdate::default()
    }
}

/// Seed profile created for a first-time OAuth user whose backend record
/// does not exist yet.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewOAuthProfile {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Per-(viewer, patient) capability booleans controlling which data
/// categories are visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionSet {
    pub can_view_health_records: bool,
    pub can_view_health_plans: bool,
    pub can_view_medications: bool,
    pub can_view_messages: bool,
    pub can_view_appointments: bool,
}

impl PermissionSet {
    /// Full access, as granted to the viewer's own record.
    pub fn all() -> Self {
        Self {
            can_view_health_records: true,
            can_view_health_plans: true,
            can_view_medications: true,
            can_view_messages: true,
            can_view_appointments: true,
        }
    }

    pub fn any(&self) -> bool {
        self.can_view_health_records
            || self.can_view_health_plans
            || self.can_view_medications
            || self.can_view_messages
            || self.can_view_appointments
    }
}

/// One patient the current viewer may access. Exactly one entry per viewer
/// carries `granted_for == "Self"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessiblePatient {
    pub patient_id: String,
    pub patient_name: String,
    #[serde(default)]
    pub patient_email: Option<String>,
    pub granted_for: String,
    #[serde(default)]
    pub permissions: PermissionSet,
}

impl AccessiblePatient {
    pub fn is_self(&self) -> bool {
        self.granted_for == GRANTED_FOR_SELF
    }
}

/// External health-data integration switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Integrations {
    pub wearable_sync_enabled: bool,
    pub lab_results_import_enabled: bool,
    pub pharmacy_sync_enabled: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial integrations update; only populated fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrationsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wearable_sync_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_results_import_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pharmacy_sync_enabled: Option<bool>,
}
