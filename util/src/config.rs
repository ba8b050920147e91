//! Process configuration loaded from the environment.
//!
//! `AppConfig` holds the values that are fixed for the lifetime of the process
//! (paths, logging, token expiry). It is loaded once at startup and passed
//! explicitly to whoever needs it. Values that an administrator can change at
//! runtime live in [`crate::settings::Settings`] instead.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Raised when an environment variable is present but cannot be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

/// Complete process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub static_root: PathBuf,
    pub templates_dir: PathBuf,
    pub attendance_template: String,
    pub report_template: String,
    pub reports_dir: PathBuf,
    pub frontend_url: String,
    pub reset_token_expiry_minutes: i64,
    pub mail_queue_capacity: usize,
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub admin_login: Option<String>,
    pub admin_password: Option<String>,
}

impl AppConfig {
    /// Loads the configuration from `.env` and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Missing keys fall back to their defaults; present keys that fail to
    /// parse are reported with the variable name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_path: text("DATABASE_PATH", "data/attendance.db"),
            static_root: PathBuf::from(text("STATIC_ROOT", "static")),
            templates_dir: PathBuf::from(text("TEMPLATES_DIR", ".")),
            attendance_template: text("ATTENDANCE_TEMPLATE", "szablon.docx"),
            report_template: text("REPORT_TEMPLATE", "rejestr.docx"),
            reports_dir: PathBuf::from(text("REPORTS_DIR", "reports")),
            frontend_url: text("FRONTEND_URL", "http://localhost:5000"),
            reset_token_expiry_minutes: parsed(&lookup, "RESET_TOKEN_EXPIRY_MINUTES", 60)?,
            mail_queue_capacity: parsed(&lookup, "MAIL_QUEUE_CAPACITY", 64)?,
            log_level: text("LOG_LEVEL", "info"),
            log_dir: text("LOG_DIR", "logs"),
            log_file: text("LOG_FILE", "attendance.log"),
            log_to_stdout: is_truthy(&text("LOG_TO_STDOUT", "true")),
            admin_login: optional("ADMIN_LOGIN"),
            admin_password: optional("ADMIN_PASSWORD"),
        })
    }

    /// Full path of the attendance-list template.
    pub fn attendance_template_path(&self) -> PathBuf {
        self.templates_dir.join(&self.attendance_template)
    }

    /// Full path of the monthly-report template.
    pub fn report_template_path(&self) -> PathBuf {
        self.templates_dir.join(&self.report_template)
    }

    /// Location of a stored signature image under the static root.
    pub fn signature_path(&self, filename: &str) -> PathBuf {
        self.static_root.join(filename)
    }

    /// Connection URL for the configured database.
    ///
    /// A value that is already a DSN is used as-is; anything else is treated
    /// as a SQLite file path (created on first connect).
    pub fn database_url(&self) -> String {
        let path = &self.database_path;
        if path.starts_with("sqlite:") {
            path.clone()
        } else {
            format!("sqlite://{}?mode=rwc", Path::new(path).display())
        }
    }
}

/// `1`, `true`, `yes` and `on`, in any case, switch a flag on.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parsed<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
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
    fn defaults_apply_when_environment_is_empty() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.reset_token_expiry_minutes, 60);
        assert_eq!(cfg.attendance_template_path(), PathBuf::from("./szablon.docx"));
        assert_eq!(cfg.report_template_path(), PathBuf::from("./rejestr.docx"));
        assert!(cfg.admin_login.is_none());
        assert!(cfg.log_to_stdout);
    }

    #[test]
    fn stdout_logging_flag_is_case_insensitive() {
        for on in ["TRUE", "1", "yes", " True "] {
            let cfg = AppConfig::from_lookup(lookup(&[("LOG_TO_STDOUT", on)])).unwrap();
            assert!(cfg.log_to_stdout, "{on:?}");
        }
        for off in ["false", "0", "no", ""] {
            let cfg = AppConfig::from_lookup(lookup(&[("LOG_TO_STDOUT", off)])).unwrap();
            assert!(!cfg.log_to_stdout, "{off:?}");
        }
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = AppConfig::from_lookup(lookup(&[("RESET_TOKEN_EXPIRY_MINUTES", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("RESET_TOKEN_EXPIRY_MINUTES"));
    }

    #[test]
    fn database_url_accepts_paths_and_dsns() {
        let cfg = AppConfig::from_lookup(lookup(&[("DATABASE_PATH", "sqlite::memory:")])).unwrap();
        assert_eq!(cfg.database_url(), "sqlite::memory:");

        let cfg = AppConfig::from_lookup(lookup(&[("DATABASE_PATH", "data/app.db")])).unwrap();
        assert_eq!(cfg.database_url(), "sqlite://data/app.db?mode=rwc");
    }
}
