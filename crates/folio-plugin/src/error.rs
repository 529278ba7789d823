use thiserror::Error;

/// Machine-readable failure class. Callers branch on the code to decide
/// whether a failure is benign (skip and log) or fatal (re-throw).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginErrorCode {
    AlreadyInstalled,
    NotInstalled,
    NotLoaded,
    InstallFailed,
    UninstallFailed,
    UpdateFailed,
    ValidationFailed,
    LoadFailed,
    NpmInstallFailed,
    GitCloneFailed,
    UrlDownloadFailed,
    ModuleLoadFailed,
}

impl PluginErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyInstalled => "ALREADY_INSTALLED",
            Self::NotInstalled => "NOT_INSTALLED",
            Self::NotLoaded => "NOT_LOADED",
            Self::InstallFailed => "INSTALL_FAILED",
            Self::UninstallFailed => "UNINSTALL_FAILED",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::LoadFailed => "LOAD_FAILED",
            Self::NpmInstallFailed => "NPM_INSTALL_FAILED",
            Self::GitCloneFailed => "GIT_CLONE_FAILED",
            Self::UrlDownloadFailed => "URL_DOWNLOAD_FAILED",
            Self::ModuleLoadFailed => "MODULE_LOAD_FAILED",
        }
    }
}

impl std::fmt::Display for PluginErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("[{code}] {message}")]
pub struct PluginError {
    pub code: PluginErrorCode,
    pub message: String,
    #[source]
    pub cause: Option<anyhow::Error>,
}

impl PluginError {
    pub fn new(code: PluginErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: anyhow::Error) -> Self {
        self.cause = Some(cause);
        self
    }
}
