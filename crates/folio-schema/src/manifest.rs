//! Plugin manifests, installation sources, and the durable installation
//! record.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestAuthor {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Platform-specific block nested inside a plugin manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformManifest {
    pub bot_id: String,
    pub api_version: String,
    pub bot_api_version: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub min_platform_version: Option<String>,
    #[serde(default)]
    pub supports_file_uploads: bool,
}

/// Descriptor accompanying a loaded plugin module. Invariant: the declared
/// `platform.bot_id` must equal the loaded bot's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: ManifestAuthor,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    pub platform: PlatformManifest,
}

impl BotManifest {
    pub fn semver(&self) -> Result<semver::Version, semver::Error> {
        semver::Version::parse(&self.version)
    }
}

/// Where a plugin comes from. Transport for non-local sources is handled
/// by the loader's collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstallSource {
    Package {
        name: String,
        #[serde(default)]
        version: Option<String>,
    },
    Git {
        url: String,
        #[serde(default)]
        reference: Option<String>,
    },
    Local {
        path: PathBuf,
    },
    Url {
        url: String,
    },
}

impl InstallSource {
    pub fn package(name: &str) -> Self {
        Self::Package {
            name: name.to_string(),
            version: None,
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    /// Same source pinned at a different version, for update flows.
    /// Sources without a version notion are returned unchanged.
    pub fn at_version(&self, version: &str) -> Self {
        match self {
            Self::Package { name, .. } => Self::Package {
                name: name.clone(),
                version: Some(version.to_string()),
            },
            Self::Git { url, .. } => Self::Git {
                url: url.clone(),
                reference: Some(version.to_string()),
            },
            other => other.clone(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Package { name, version } => match version {
                Some(v) => format!("package {name}@{v}"),
                None => format!("package {name}"),
            },
            Self::Git { url, .. } => format!("git {url}"),
            Self::Local { path } => format!("local {}", path.display()),
            Self::Url { url } => format!("url {url}"),
        }
    }
}

/// Durable record binding a bot to its effective configuration and enabled
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInstallation {
    pub id: Uuid,
    pub bot_id: String,
    pub source: InstallSource,
    pub version: String,
    pub manifest: BotManifest,
    /// Effective configuration: shipped defaults merged under the supplied
    /// config.
    pub config: Value,
    /// Raw YAML (comments preserved) for round-trip editing, when the
    /// config was supplied as text.
    #[serde(default)]
    pub config_yaml: Option<String>,
    pub enabled: bool,
    pub is_default: bool,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BotInstallation {
    pub fn new(bot_id: &str, source: InstallSource, manifest: BotManifest, config: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            bot_id: bot_id.to_string(),
            version: manifest.version.clone(),
            is_default: manifest.platform.is_default,
            source,
            manifest,
            config,
            config_yaml: None,
            enabled: true,
            installed_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> BotManifest {
        BotManifest {
            name: "editorial-bot".into(),
            version: "1.2.0".into(),
            description: "Editorial workflow automation".into(),
            author: ManifestAuthor {
                name: "Folio".into(),
                email: None,
                url: None,
            },
            license: Some("MIT".into()),
            keywords: vec!["editorial".into()],
            homepage: None,
            repository: None,
            platform: PlatformManifest {
                bot_id: "editorial-bot".into(),
                api_version: "1".into(),
                bot_api_version: "1".into(),
                permissions: vec![],
                is_default: true,
                category: Some("workflow".into()),
                min_platform_version: None,
                supports_file_uploads: false,
            },
        }
    }

    #[test]
    fn manifest_semver_parses() {
        let m = manifest();
        assert_eq!(m.semver().unwrap().minor, 2);
    }

    #[test]
    fn install_source_serde_tagged() {
        let src = InstallSource::Package {
            name: "editorial-bot".into(),
            version: Some("1.2.0".into()),
        };
        let json = serde_json::to_string(&src).unwrap();
        assert!(json.contains(r#""type":"package""#));
        let back: InstallSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn install_source_at_version() {
        let src = InstallSource::package("editorial-bot").at_version("2.0.0");
        match src {
            InstallSource::Package { version, .. } => {
                assert_eq!(version.as_deref(), Some("2.0.0"));
            }
            _ => panic!("expected package source"),
        }

        let local = InstallSource::local("/tmp/bot").at_version("2.0.0");
        assert_eq!(local, InstallSource::local("/tmp/bot"));
    }

    #[test]
    fn installation_carries_manifest_defaults() {
        let rec = BotInstallation::new(
            "editorial-bot",
            InstallSource::package("editorial-bot"),
            manifest(),
            serde_json::json!({}),
        );
        assert!(rec.enabled);
        assert!(rec.is_default);
        assert_eq!(rec.version, "1.2.0");
    }

    #[test]
    fn manifest_yaml_back_compat() {
        let yaml = r#"
name: reviewer-bot
version: 0.3.1
description: Reviewer reminders
author:
  name: Folio
platform:
  bot_id: reviewer-bot
  api_version: "1"
  bot_api_version: "1"
"#;
        let m: BotManifest = serde_yaml::from_str(yaml).unwrap();
        assert!(m.platform.permissions.is_empty());
        assert!(!m.platform.is_default);
        assert!(m.license.is_none());
    }
}
