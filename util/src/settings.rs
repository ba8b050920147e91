//! Runtime settings editable from the admin panel.
//!
//! A [`Settings`] value is an immutable snapshot: environment defaults overlaid
//! by the rows of the `settings` table. [`SettingsStore`] owns the current
//! snapshot. Readers clone the `Arc`; a reload builds a new snapshot and swaps
//! it in, so a reader never observes a half-applied update.

use std::collections::BTreeMap;
use std::env;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::is_truthy;

pub const SMTP_HOST: &str = "smtp_host";
pub const SMTP_PORT: &str = "smtp_port";
pub const EMAIL_RECIPIENT: &str = "email_recipient";
pub const EMAIL_SENDER_NAME: &str = "email_sender_name";
pub const EMAIL_USE_TRAINER_NAME: &str = "email_use_trainer_name";
pub const EMAIL_LOGIN: &str = "email_login";
pub const EMAIL_PASSWORD: &str = "email_password";
pub const EMAIL_FOOTER: &str = "email_footer";
pub const EMAIL_LIST_SUBJECT: &str = "email_list_subject";
pub const EMAIL_LIST_BODY: &str = "email_list_body";
pub const EMAIL_REPORT_SUBJECT: &str = "email_report_subject";
pub const EMAIL_REPORT_BODY: &str = "email_report_body";
pub const REGISTRATION_EMAIL_SUBJECT: &str = "registration_email_subject";
pub const REGISTRATION_EMAIL_BODY: &str = "registration_email_body";
pub const ACTIVATION_EMAIL_SUBJECT: &str = "reg_email_subject";
pub const ACTIVATION_EMAIL_BODY: &str = "reg_email_body";
pub const RESET_EMAIL_SUBJECT: &str = "reset_email_subject";
pub const RESET_EMAIL_BODY: &str = "reset_email_body";

/// Sender name used when nothing else is configured.
pub const DEFAULT_SENDER_NAME: &str = "Vest Media";

/// Every scalar setting the admin form may submit.
pub const SETTING_KEYS: &[&str] = &[
    SMTP_HOST,
    SMTP_PORT,
    EMAIL_RECIPIENT,
    EMAIL_SENDER_NAME,
    EMAIL_USE_TRAINER_NAME,
    EMAIL_LOGIN,
    EMAIL_PASSWORD,
    EMAIL_FOOTER,
    EMAIL_LIST_SUBJECT,
    EMAIL_LIST_BODY,
    EMAIL_REPORT_SUBJECT,
    EMAIL_REPORT_BODY,
    REGISTRATION_EMAIL_SUBJECT,
    REGISTRATION_EMAIL_BODY,
    ACTIVATION_EMAIL_SUBJECT,
    ACTIVATION_EMAIL_BODY,
    RESET_EMAIL_SUBJECT,
    RESET_EMAIL_BODY,
];

/// Settings stored as `"1"` / `"0"`.
pub const BOOLEAN_KEYS: &[&str] = &[EMAIL_USE_TRAINER_NAME];

/// UI tables whose column widths are configurable.
pub const TABLE_IDS: &[&str] = &[
    "admin_new_users",
    "admin_trainers",
    "admin_sessions",
    "admin_stats",
    "panel_history",
    "panel_profile_data",
    "panel_participants",
    "panel_monthly_reports",
];

/// Values used when neither the environment nor the database provide one.
pub const DEFAULT_VALUES: &[(&str, &str)] = &[
    (EMAIL_LIST_SUBJECT, "Lista obecności – {date}"),
    (EMAIL_LIST_BODY, "W załączniku lista obecności z zajęć."),
    (EMAIL_REPORT_SUBJECT, "Raport miesięczny – {date}"),
    (EMAIL_REPORT_BODY, "W załączniku raport miesięczny do umowy."),
    (REGISTRATION_EMAIL_SUBJECT, "Nowa rejestracja prowadzącego"),
    (
        REGISTRATION_EMAIL_BODY,
        "Zarejestrował się {name} (login: {login}).\nPotwierdź konto tutaj: {link}",
    ),
    (ACTIVATION_EMAIL_SUBJECT, "Aktywacja konta w ShareOKO"),
    (
        ACTIVATION_EMAIL_BODY,
        "Twoje konto zostało zatwierdzone i jest już aktywne.",
    ),
    (RESET_EMAIL_SUBJECT, "Reset hasła w ShareOKO"),
    (RESET_EMAIL_BODY, "Aby ustawić nowe hasło, otwórz link: {link}"),
    (EMAIL_SENDER_NAME, DEFAULT_SENDER_NAME),
    (EMAIL_USE_TRAINER_NAME, "0"),
];

/// Settings key holding the column widths of `table`.
pub fn table_widths_key(table: &str) -> String {
    format!("table_{table}_widths")
}

/// Serializes widths as `col=value,col=value` in the given order.
pub fn serialize_widths(widths: &[(String, f64)]) -> String {
    widths
        .iter()
        .map(|(column, value)| format!("{column}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses a `col=value,...` string. Malformed pairs are ignored.
pub fn parse_widths(raw: &str) -> Vec<(String, f64)> {
    raw.split(',')
        .filter_map(|pair| {
            let (column, value) = pair.split_once('=')?;
            let value: f64 = value.trim().parse().ok()?;
            let column = column.trim();
            (!column.is_empty() && value.is_finite()).then(|| (column.to_string(), value))
        })
        .collect()
}

/// An immutable view of every runtime setting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Built-in defaults only.
    pub fn defaults() -> Self {
        Self {
            values: DEFAULT_VALUES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Defaults overlaid by the upper-cased environment variables
    /// (`SMTP_HOST` for `smtp_host`, ...).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::defaults();
        let table_keys = TABLE_IDS.iter().map(|t| table_widths_key(t));
        for key in SETTING_KEYS
            .iter()
            .map(|k| k.to_string())
            .chain(table_keys)
        {
            if let Some(value) = lookup(&key.to_uppercase()) {
                settings.values.insert(key, value);
            }
        }
        settings
    }

    /// Returns a copy with `rows` applied on top.
    pub fn overlay<I>(mut self, rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.values.extend(rows);
        self
    }

    /// The value of `key`, treating empty strings as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Raw value including empty strings, as shown in the settings form.
    pub fn raw(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(is_truthy)
    }

    pub fn smtp_port(&self) -> Option<u16> {
        self.get(SMTP_PORT).and_then(|p| p.parse().ok())
    }

    /// Configured column widths of `table`, in stored order.
    pub fn table_widths(&self, table: &str) -> Vec<(String, f64)> {
        self.get(&table_widths_key(table))
            .map(parse_widths)
            .unwrap_or_default()
    }
}

/// Owner of the current settings snapshot.
#[derive(Debug, Default)]
pub struct SettingsStore {
    current: RwLock<Arc<Settings>>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
        }
    }

    /// The snapshot in effect right now.
    pub fn snapshot(&self) -> Arc<Settings> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in `settings` and returns the previous snapshot.
    pub fn replace(&self, settings: Settings) -> Arc<Settings> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(settings))
    }
}
