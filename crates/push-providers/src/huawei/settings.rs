//! Push Kit credentials.

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

const SEND_URL_BASE: &str = "https://push-api.cloud.huawei.com";

/// Client secret plus exactly one of `project_id` (v2 API) or `app_id`
/// (legacy v1 API).
#[derive(Clone, Serialize, Deserialize)]
pub struct HuaweiSettings {
    pub client_secret: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
}

impl HuaweiSettings {
    /// Settings for the v2 API.
    pub fn for_project(
        client_secret: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Result<Self, SettingsError> {
        let settings = Self {
            client_secret: client_secret.into(),
            project_id: Some(project_id.into()),
            app_id: None,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Settings for the legacy v1 API.
    pub fn for_app(
        client_secret: impl Into<String>,
        app_id: impl Into<String>,
    ) -> Result<Self, SettingsError> {
        let settings = Self {
            client_secret: client_secret.into(),
            project_id: None,
            app_id: Some(app_id.into()),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `HUAWEI_CLIENT_SECRET`, `HUAWEI_PROJECT_ID` and
    /// `HUAWEI_APP_ID`.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let settings = Self {
            client_secret: non_empty("HUAWEI_CLIENT_SECRET")
                .ok_or(SettingsError::Missing("HUAWEI_CLIENT_SECRET"))?,
            project_id: non_empty("HUAWEI_PROJECT_ID"),
            app_id: non_empty("HUAWEI_APP_ID"),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.client_secret.trim().is_empty() {
            return Err(SettingsError::Missing("client_secret"));
        }

        let blank = |id: &Option<String>| id.as_deref().is_none_or(|v| v.trim().is_empty());
        match (blank(&self.project_id), blank(&self.app_id)) {
            (true, true) => Err(SettingsError::Missing("project_id or app_id")),
            (false, false) => Err(SettingsError::invalid(
                "project_id",
                "only one of project_id or app_id may be set",
            )),
            _ => Ok(()),
        }
    }

    /// OAuth client id: the app id when set, otherwise the project id.
    pub fn client_id(&self) -> &str {
        self.app_id
            .as_deref()
            .or(self.project_id.as_deref())
            .unwrap_or_default()
    }

    pub fn send_url(&self) -> String {
        match (&self.project_id, &self.app_id) {
            (Some(project_id), _) => format!("{}/v2/{}/messages:send", SEND_URL_BASE, project_id),
            (None, Some(app_id)) => format!("{}/v1/{}/messages:send", SEND_URL_BASE, app_id),
            (None, None) => String::new(),
        }
    }
}

impl std::fmt::Debug for HuaweiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuaweiSettings")
            .field("client_secret", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("app_id", &self.app_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_project_id_uses_v2() {
        let settings = HuaweiSettings::for_project("secret", "736430079244623135").unwrap();
        assert_eq!(
            settings.send_url(),
            "https://push-api.cloud.huawei.com/v2/736430079244623135/messages:send"
        );
        assert_eq!(settings.client_id(), "736430079244623135");
    }

    #[test]
    fn test_app_id_uses_v1() {
        let settings = HuaweiSettings::for_app("secret", "104523611").unwrap();
        assert_eq!(
            settings.send_url(),
            "https://push-api.cloud.huawei.com/v1/104523611/messages:send"
        );
        assert_eq!(settings.client_id(), "104523611");
    }

    #[test]
    fn test_exactly_one_id_required() {
        let err = HuaweiSettings::from_lookup(lookup(&[("HUAWEI_CLIENT_SECRET", "s")])).unwrap_err();
        assert!(matches!(err, SettingsError::Missing("project_id or app_id")));

        let err = HuaweiSettings::from_lookup(lookup(&[
            ("HUAWEI_CLIENT_SECRET", "s"),
            ("HUAWEI_PROJECT_ID", "p"),
            ("HUAWEI_APP_ID", "a"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { .. }));
    }

    #[test]
    fn test_from_lookup() {
        let settings = HuaweiSettings::from_lookup(lookup(&[
            ("HUAWEI_CLIENT_SECRET", "s3cret"),
            ("HUAWEI_APP_ID", "104523611"),
            ("HUAWEI_PROJECT_ID", ""),
        ]))
        .unwrap();

        assert_eq!(settings.app_id.as_deref(), Some("104523611"));
        assert!(settings.project_id.is_none());
        assert!(!format!("{settings:?}").contains("s3cret"));

        let err = HuaweiSettings::from_lookup(lookup(&[("HUAWEI_APP_ID", "a")])).unwrap_err();
        assert!(matches!(err, SettingsError::Missing("HUAWEI_CLIENT_SECRET")));
    }
}
