use url::Url;

use crate::api::types::PermissionSet;

/// Route table for the patient area.
pub mod routes {
    pub const LOGIN: &str = "/login";
    pub const ONBOARDING: &str = "/onboarding";
    pub const DASHBOARD: &str = "/patient/dashboard";
    pub const HEALTH_RECORDS: &str = "/patient/health-records";
    pub const HEALTH_PLAN: &str = "/patient/health-plan";
    pub const MEDICATIONS: &str = "/patient/medications";
    pub const MESSAGES: &str = "/patient/messages";
    pub const APPOINTMENTS: &str = "/patient/appointments";
    pub const PROFILE: &str = "/patient/profile";
    pub const PERMISSIONS: &str = "/patient/permissions";
}

/// A grantable data category, tied to the route that renders it.
///
/// Keeping route, grant bit, and scan order together is what makes the
/// navigation functions agree with each other: a page picked by
/// [`first_accessible_page`] is gated by the same bit
/// [`is_page_accessible`] checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    HealthRecords,
    HealthPlan,
    Medications,
    Messages,
    Appointments,
}

impl Capability {
    /// Fixed scan order for picking a landing page on another patient's data.
    pub const PRIORITY: [Capability; 5] = [
        Capability::HealthRecords,
        Capability::HealthPlan,
        Capability::Medications,
        Capability::Messages,
        Capability::Appointments,
    ];

    pub fn route(&self) -> &'static str {
        match self {
            Capability::HealthRecords => routes::HEALTH_RECORDS,
            Capability::HealthPlan => routes::HEALTH_PLAN,
            Capability::Medications => routes::MEDICATIONS,
            Capability::Messages => routes::MESSAGES,
            Capability::Appointments => routes::APPOINTMENTS,
        }
    }

    pub fn allowed(&self, permissions: &PermissionSet) -> bool {
        match self {
            Capability::HealthRecords => permissions.can_view_health_records,
            Capability::HealthPlan => permissions.can_view_health_plans,
            Capability::Medications => permissions.can_view_medications,
            Capability::Messages => permissions.can_view_messages,
            Capability::Appointments => permissions.can_view_appointments,
        }
    }

    /// The capability gating a path, if the path is capability-gated at all.
    /// Matches the route itself and any subpath under it; query and fragment
    /// are ignored.
    pub fn for_path(pathname: &str) -> Option<Capability> {
        Capability::PRIORITY
            .into_iter()
            .find(|capability| path_matches(pathname, capability.route()))
    }
}

fn strip_query(pathname: &str) -> &str {
    pathname
        .split(['?', '#'])
        .next()
        .unwrap_or(pathname)
}

pub(crate) fn path_matches(pathname: &str, route: &str) -> bool {
    let path = strip_query(pathname);
    path == route
        || path
            .strip_prefix(route)
            .map_or(false, |rest| rest.starts_with('/'))
}

/// First page the viewer may land on.
///
/// Own data always lands on the dashboard. Another patient's data gets the
/// first capability in priority order whose grant is on; with every grant
/// off the health-records route is still returned and that page renders the
/// denied state. Dashboard, profile, and permissions management are never
/// returned for another patient.
pub fn first_accessible_page(
    permissions: Option<&PermissionSet>,
    viewing_other_patient: bool,
) -> &'static str {
    if !viewing_other_patient {
        return routes::DASHBOARD;
    }

    permissions
        .and_then(|perms| {
            Capability::PRIORITY
                .into_iter()
                .find(|capability| capability.allowed(perms))
        })
        .map(|capability| capability.route())
        .unwrap_or(routes::HEALTH_RECORDS)
}

/// Whether `pathname` may render for the viewer right now.
///
/// Own data is unrestricted. On another patient's data, profile and
/// permissions management are always off limits, capability-gated pages
/// follow their grant bit, and unknown paths are off limits.
pub fn is_page_accessible(
    pathname: &str,
    permissions: Option<&PermissionSet>,
    viewing_other_patient: bool,
) -> bool {
    if !viewing_other_patient {
        return true;
    }

    if path_matches(pathname, routes::PROFILE) || path_matches(pathname, routes::PERMISSIONS) {
        return false;
    }

    match Capability::for_path(pathname) {
        Some(capability) => permissions.map_or(false, |perms| capability.allowed(perms)),
        None => false,
    }
}

/// Which patient the URL says we are looking at. Derived on every
/// evaluation, never stored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NavigationContext {
    pub patient_id: Option<String>,
    pub patient_token: Option<String>,
    pub is_viewing_other_patient: bool,
}

impl NavigationContext {
    /// Parse from a full URL. Unparseable input reads as viewing self.
    pub fn from_url(url: &str) -> Self {
        Url::parse(url)
            .map(|parsed| Self::from_parsed(&parsed))
            .unwrap_or_default()
    }

    /// Parse from a path plus optional query, the form guards receive,
    /// e.g. `/patient/medications?patientId=42`.
    pub fn from_path(path_and_query: &str) -> Self {
        Url::parse("http://portal.invalid")
            .ok()
            .and_then(|base| base.join(path_and_query).ok())
            .map(|parsed| Self::from_parsed(&parsed))
            .unwrap_or_default()
    }

    fn from_parsed(url: &Url) -> Self {
        let mut patient_id = None;
        let mut patient_token = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "patientId" if !value.is_empty() => patient_id = Some(value.into_owned()),
                "patientToken" if !value.is_empty() => patient_token = Some(value.into_owned()),
                _ => {}
            }
        }

        let is_viewing_other_patient = patient_id.is_some() || patient_token.is_some();
        Self {
            patient_id,
            patient_token,
            is_viewing_other_patient,
        }
    }

    /// The identifier to preserve across permission redirects.
    pub fn patient_selector(&self) -> Option<(&'static str, &str)> {
        if let Some(id) = &self.patient_id {
            return Some(("patientId", id));
        }
        if let Some(token) = &self.patient_token {
            return Some(("patientToken", token));
        }
        None
    }

    /// Redirect target for a denied page: the first accessible page with the
    /// patient selector carried along as a query parameter.
    pub fn redirect_target(&self, permissions: Option<&PermissionSet>) -> String {
        let page = first_accessible_page(permissions, self.is_viewing_other_patient);
        match self.patient_selector() {
            Some((key, value)) => {
                let query: String = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair(key, value)
                    .finish();
                format!("{}?{}", page, query)
            }
            None => page.to_string(),
        }
    }
}
