use chrono::{DateTime, Utc};

/// Identity of the actor running an import, passed to every merge call.
#[derive(Debug, Clone)]
pub struct ImportContext {
    pub user_id: String,
    /// Owning organization; products are namespaced and owner fields tracked when set.
    pub org_id: Option<String>,
    pub now: DateTime<Utc>,
}

impl ImportContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            org_id: None,
            now: Utc::now(),
        }
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn owner(&self) -> Option<String> {
        self.org_id.as_ref().map(|org| format!("org-{org}"))
    }
}
