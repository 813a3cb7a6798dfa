use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::types::{FamilyHistoryEntry, PermissionSet, ProfileUpdate};
use crate::api::PortalApi;
use crate::error::PortalError;
use crate::session::{SessionAction, SessionStore};
use crate::storage::{keys, StorageBackend};

/// Steps of the first-run data collection flow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    PersonalInfo,
    MedicalConditions,
    FamilyHistory,
    HealthRecords,
    HealthPlan,
    Appointments,
    AccessGrants,
    Settings,
}

impl OnboardingStep {
    pub const ORDER: [OnboardingStep; 8] = [
        OnboardingStep::PersonalInfo,
        OnboardingStep::MedicalConditions,
        OnboardingStep::FamilyHistory,
        OnboardingStep::HealthRecords,
        OnboardingStep::HealthPlan,
        OnboardingStep::Appointments,
        OnboardingStep::AccessGrants,
        OnboardingStep::Settings,
    ];

    /// 1-based step number, as shown in the progress indicator and stored
    /// on the backend profile.
    pub fn number(&self) -> u8 {
        OnboardingStep::ORDER
            .iter()
            .position(|step| step == self)
            .map(|index| index as u8 + 1)
            .unwrap_or(1)
    }

    pub fn next(&self) -> Option<OnboardingStep> {
        let index = OnboardingStep::ORDER.iter().position(|step| step == self)?;
        OnboardingStep::ORDER.get(index + 1).copied()
    }
}

impl Default for OnboardingStep {
    fn default() -> Self {
        OnboardingStep::PersonalInfo
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalInfo {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
}

/// A health record queued for upload once onboarding finishes. Gets a local
/// staging id so entries can be edited or removed before anything is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedHealthRecord {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub record_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedAppointment {
    pub id: Uuid,
    pub provider_name: String,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Invitation to let someone else view this patient's data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessGrantRequest {
    pub email: String,
    #[serde(default)]
    pub permissions: PermissionSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    pub language: Option<String>,
    pub theme: Option<String>,
}

/// Everything collected across the flow, plus progress bookkeeping.
///
/// Survives reloads via local storage; destroyed when onboarding completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingDraft {
    pub personal_info: PersonalInfo,
    pub medical_conditions: Vec<String>,
    pub family_history: Vec<FamilyHistoryEntry>,
    pub staged_records: Vec<StagedHealthRecord>,
    pub health_plan_notes: Option<String>,
    pub appointments: Vec<StagedAppointment>,
    pub access_grants: Vec<AccessGrantRequest>,
    pub settings: PortalSettings,
    pub completed_steps: BTreeSet<u8>,
    pub current_step: OnboardingStep,
}

impl OnboardingDraft {
    pub fn is_step_completed(&self, step: OnboardingStep) -> bool {
        self.completed_steps.contains(&step.number())
    }

    pub fn stage_record(
        &mut self,
        title: impl Into<String>,
        record_type: Option<String>,
        file_name: Option<String>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.staged_records.push(StagedHealthRecord {
            id,
            title: title.into(),
            record_type,
            file_name,
            notes: None,
        });
        id
    }

    pub fn unstage_record(&mut self, id: Uuid) -> bool {
        let before = self.staged_records.len();
        self.staged_records.retain(|record| record.id != id);
        self.staged_records.len() < before
    }

    pub fn stage_appointment(
        &mut self,
        provider_name: impl Into<String>,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.appointments.push(StagedAppointment {
            id,
            provider_name: provider_name.into(),
            scheduled_for,
            reason: None,
        });
        id
    }
}

/// Drives the onboarding flow: per-step validation, local draft persistence,
/// and mirroring of step data onto the backend profile.
pub struct OnboardingFlow {
    store: Arc<SessionStore>,
    api: Arc<dyn PortalApi>,
    storage: Arc<dyn StorageBackend>,
}

impl OnboardingFlow {
    pub fn new(
        store: Arc<SessionStore>,
        api: Arc<dyn PortalApi>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            store,
            api,
            storage,
        }
    }

    /// The saved draft, or a fresh one. An unreadable draft is dropped, not
    /// surfaced; the viewer simply starts over.
    pub fn load_draft(&self) -> OnboardingDraft {
        let Some(raw) = self.storage.get(keys::ONBOARDING_DRAFT) else {
            return OnboardingDraft::default();
        };
        match serde_json::from_str(&raw) {
            Ok(draft) => draft,
            Err(e) => {
                warn!("discarding unreadable onboarding draft: {}", e);
                OnboardingDraft::default()
            }
        }
    }

    pub fn save_draft(&self, draft: &OnboardingDraft) {
        match serde_json::to_string(draft) {
            Ok(raw) => self.storage.set(keys::ONBOARDING_DRAFT, &raw),
            Err(e) => warn!("failed to serialize onboarding draft: {}", e),
        }
    }

    /// Check the step's slice of the draft. Field errors surface inline and
    /// never reach the backend.
    pub fn validate_step(step: OnboardingStep, draft: &OnboardingDraft) -> Result<(), PortalError> {
        let mut field_errors = HashMap::new();

        match step {
            OnboardingStep::PersonalInfo => {
                let info = &draft.personal_info;
                require_text(&mut field_errors, "first_name", info.first_name.as_deref());
                require_text(&mut field_errors, "last_name", info.last_name.as_deref());
                if info.date_of_birth.is_none() {
                    field_errors
                        .insert("date_of_birth".to_string(), "This field is required".to_string());
                }
            }
            OnboardingStep::MedicalConditions => {
                for (index, condition) in draft.medical_conditions.iter().enumerate() {
                    if condition.trim().is_empty() {
                        field_errors.insert(
                            format!("medical_conditions[{}]", index),
                            "This field is required".to_string(),
                        );
                    }
                }
            }
            OnboardingStep::FamilyHistory => {
                for (index, entry) in draft.family_history.iter().enumerate() {
                    require_text(
                        &mut field_errors,
                        &format!("family_history[{}].relation", index),
                        Some(&entry.relation),
                    );
                    require_text(
                        &mut field_errors,
                        &format!("family_history[{}].condition", index),
                        Some(&entry.condition),
                    );
                }
            }
            OnboardingStep::HealthRecords => {
                for (index, record) in draft.staged_records.iter().enumerate() {
                    require_text(
                        &mut field_errors,
                        &format!("staged_records[{}].title", index),
                        Some(&record.title),
                    );
                }
            }
            OnboardingStep::HealthPlan => {}
            OnboardingStep::Appointments => {
                for (index, appointment) in draft.appointments.iter().enumerate() {
                    require_text(
                        &mut field_errors,
                        &format!("appointments[{}].provider_name", index),
                        Some(&appointment.provider_name),
                    );
                }
            }
            OnboardingStep::AccessGrants => {
                for (index, grant) in draft.access_grants.iter().enumerate() {
                    if grant.email.trim().is_empty() || !grant.email.contains('@') {
                        field_errors.insert(
                            format!("access_grants[{}].email", index),
                            "A valid email address is required".to_string(),
                        );
                    }
                }
            }
            OnboardingStep::Settings => {}
        }

        if field_errors.is_empty() {
            Ok(())
        } else {
            Err(PortalError::validation(
                "Missing required fields",
                field_errors,
            ))
        }
    }

    /// Validate and record the step, persist the draft locally, then mirror
    /// the step's data onto the backend profile.
    ///
    /// A backend mirror that fails on connectivity is tolerated: the draft
    /// is already safe locally and re-syncs on a later transition. Other
    /// failures propagate.
    pub async fn complete_step(
        &self,
        draft: &mut OnboardingDraft,
        step: OnboardingStep,
    ) -> Result<(), PortalError> {
        Self::validate_step(step, draft)?;

        draft.completed_steps.insert(step.number());
        if let Some(next) = step.next() {
            draft.current_step = next;
        }
        self.save_draft(draft);

        if step == OnboardingStep::Settings {
            self.persist_preferences(&draft.settings);
        }

        let update = Self::step_update(step, draft);
        match self.api.update_profile(&self.access_token()?, &update).await {
            Ok(profile) => {
                self.store.dispatch(SessionAction::ProfileUpdated { profile });
                Ok(())
            }
            Err(e) if e.is_connectivity() => {
                warn!("step mirror unreachable, draft kept locally: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Finish the flow: mark the profile complete and destroy the draft.
    pub async fn complete(&self, draft: &OnboardingDraft) -> Result<(), PortalError> {
        let update = ProfileUpdate {
            onboarding_completed: Some(true),
            onboarding_step: None,
            ..Self::step_update(OnboardingStep::Settings, draft)
        };

        let profile = self.api.update_profile(&self.access_token()?, &update).await?;
        self.storage.remove(keys::ONBOARDING_DRAFT);
        self.store.dispatch(SessionAction::ProfileUpdated { profile });
        info!("onboarding completed");
        Ok(())
    }

    /// Skip the flow for now. The draft stays around in case the viewer
    /// comes back to it.
    pub async fn skip(&self) -> Result<(), PortalError> {
        let update = ProfileUpdate {
            onboarding_skipped: Some(true),
            ..ProfileUpdate::default()
        };

        let profile = self.api.update_profile(&self.access_token()?, &update).await?;
        self.store.dispatch(SessionAction::ProfileUpdated { profile });
        info!("onboarding skipped");
        Ok(())
    }

    fn access_token(&self) -> Result<String, PortalError> {
        self.store
            .state()
            .access_token
            .ok_or_else(|| PortalError::auth("no active session"))
    }

    fn persist_preferences(&self, settings: &PortalSettings) {
        if let Some(language) = &settings.language {
            self.storage.set(keys::LANGUAGE, language);
        }
        if let Some(theme) = &settings.theme {
            self.storage.set(keys::THEME, theme);
        }
    }

    /// The slice of the draft that belongs on the backend profile after the
    /// given step. Staged records, appointments, and access grants are
    /// submitted through their own services after onboarding; the profile
    /// only tracks where the viewer is.
    fn step_update(step: OnboardingStep, draft: &OnboardingDraft) -> ProfileUpdate {
        let resume_at = step.next().unwrap_or(OnboardingStep::Settings);
        let mut update = ProfileUpdate {
            onboarding_step: Some(resume_at.number()),
            ..ProfileUpdate::default()
        };

        match step {
            OnboardingStep::PersonalInfo => {
                let info = &draft.personal_info;
                update.first_name = info.first_name.clone();
                update.last_name = info.last_name.clone();
                update.date_of_birth = info.date_of_birth;
                update.gender = info.gender.clone();
                update.phone = info.phone.clone();
            }
            OnboardingStep::MedicalConditions => {
                update.medical_conditions = Some(draft.medical_conditions.clone());
            }
            OnboardingStep::FamilyHistory => {
                update.family_history = Some(draft.family_history.clone());
            }
            OnboardingStep::Settings => {
                update.language = draft.settings.language.clone();
                update.theme = draft.settings.theme.clone();
            }
            OnboardingStep::HealthRecords
            | OnboardingStep::HealthPlan
            | OnboardingStep::Appointments
            | OnboardingStep::AccessGrants => {}
        }

        update
    }
}

fn require_text(field_errors: &mut HashMap<String, String>, field: &str, value: Option<&str>) {
    let present = value.map(|v| !v.trim().is_empty()).unwrap_or(false);
    if !present {
        field_errors.insert(field.to_string(), "This field is required".to_string());
    }
}
