use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::errors::StudyRoomError;

const DEFAULT_DATA_DIR: &str = ".studyroom";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root of the REST backend, always ending in `/`.
    pub api_base_url: Url,
    /// Where media settings are persisted.
    pub data_dir: PathBuf,
    /// Bearer token for the REST backend, if logged in.
    pub access_token: Option<String>,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_base_url: &str) -> Result<Self, StudyRoomError> {
        Ok(Self {
            api_base_url: parse_base_url(api_base_url)?,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            access_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    /// Build from `STUDYROOM_*` environment variables.
    pub fn from_env() -> Result<Self, StudyRoomError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StudyRoomError> {
        let base = lookup("STUDYROOM_API_URL")
            .ok_or_else(|| StudyRoomError::Config("STUDYROOM_API_URL is not set".into()))?;
        let mut config = Self::new(&base)?;

        if let Some(dir) = lookup("STUDYROOM_DATA_DIR").filter(|d| !d.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        config.access_token = lookup("STUDYROOM_ACCESS_TOKEN").filter(|t| !t.is_empty());
        if let Some(secs) = lookup("STUDYROOM_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                StudyRoomError::Config(format!("STUDYROOM_REQUEST_TIMEOUT_SECS: not a number: '{secs}'"))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }
}

/// Parse a base URL so relative endpoint paths join underneath it.
fn parse_base_url(raw: &str) -> Result<Url, StudyRoomError> {
    let raw = raw.trim();
    let mut url = Url::parse(raw).map_err(|e| StudyRoomError::InvalidUrl(format!("'{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(StudyRoomError::InvalidUrl(format!("'{raw}': expected http or https")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = ClientConfig::new("https://api.example.com/v1").unwrap();
        assert_eq!(config.api_base_url.as_str(), "https://api.example.com/v1/");
        assert_eq!(
            config.api_base_url.join("study-rooms").unwrap().as_str(),
            "https://api.example.com/v1/study-rooms"
        );
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(ClientConfig::new("not a url").is_err());
        assert!(ClientConfig::new("ftp://example.com").is_err());
    }

    #[test]
    fn from_env_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[("STUDYROOM_API_URL", "http://localhost:8080")])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.access_token, None);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn from_env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("STUDYROOM_API_URL", "http://localhost:8080/api"),
            ("STUDYROOM_DATA_DIR", "/tmp/sr"),
            ("STUDYROOM_ACCESS_TOKEN", "jwt"),
            ("STUDYROOM_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/sr"));
        assert_eq!(config.access_token.as_deref(), Some("jwt"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn from_env_requires_api_url() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[])),
            Err(StudyRoomError::Config(_))
        ));
        assert!(ClientConfig::from_lookup(lookup(&[
            ("STUDYROOM_API_URL", "http://localhost"),
            ("STUDYROOM_REQUEST_TIMEOUT_SECS", "soon"),
        ]))
        .is_err());
    }
}
