//! The administrator's settings form: validation, persistence and reload of
//! the runtime [`Settings`] snapshot.

use std::sync::Arc;

use sea_orm::{ConnectionTrait, DbErr, TransactionTrait};
use tracing::{info, warn};

use db::models::setting::Model as Setting;
use db::models::user::Model as User;
use util::settings::{
    serialize_widths, table_widths_key, Settings, BOOLEAN_KEYS, SETTING_KEYS,
};
use util::state::AppState;

use crate::error::ServiceResult;

const WIDTH_FIELD_PREFIX: &str = "width_";
const ADMIN_LOGIN_FIELD: &str = "admin_login";
const ADMIN_PASSWORD_FIELD: &str = "admin_password";

/// Allowed distance of a table's column sum from 100%.
pub const WIDTH_TOLERANCE: f64 = 0.1;

/// Column widths of one table, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableWidths {
    pub table: String,
    pub columns: Vec<(String, f64)>,
}

impl TableWidths {
    pub fn total(&self) -> f64 {
        self.columns.iter().map(|(_, w)| w).sum()
    }

    /// Non-finite widths (`inf`, `NaN`) make the table invalid.
    pub fn is_valid(&self) -> bool {
        let total = self.total();
        total.is_finite() && (total - 100.0).abs() <= WIDTH_TOLERANCE
    }
}

/// Groups `width_<table>_<column>` fields by table.
///
/// The column is whatever follows the last underscore, so table ids may
/// contain underscores. Values that do not parse as numbers are skipped, but
/// `inf` and `NaN` parse and are kept; a repeated column keeps its first
/// position and its last value.
pub fn group_width_fields<'a, I>(fields: I) -> Vec<TableWidths>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut tables: Vec<TableWidths> = Vec::new();
    for (name, value) in fields {
        let Some(rest) = name.strip_prefix(WIDTH_FIELD_PREFIX) else {
            continue;
        };
        let Some((table, column)) = rest.rsplit_once('_') else {
            continue;
        };
        if table.is_empty() || column.is_empty() {
            continue;
        }
        let Ok(width) = value.trim().parse::<f64>() else {
            continue;
        };

        let idx = match tables.iter().position(|t| t.table == table) {
            Some(idx) => idx,
            None => {
                tables.push(TableWidths {
                    table: table.to_string(),
                    columns: Vec::new(),
                });
                tables.len() - 1
            }
        };
        let columns = &mut tables[idx].columns;
        match columns.iter_mut().find(|(c, _)| c == column) {
            Some(existing) => existing.1 = width,
            None => columns.push((column.to_string(), width)),
        }
    }
    tables
}

/// Result of submitting the settings form.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsOutcome {
    Saved { written: usize },
    /// Nothing was written. `submitted` holds the form as sent, for redisplay.
    Rejected {
        invalid_tables: Vec<String>,
        submitted: Vec<(String, String)>,
    },
}

impl SettingsOutcome {
    /// One user-facing message per invalid table.
    pub fn messages(&self) -> Vec<String> {
        match self {
            SettingsOutcome::Saved { .. } => vec!["Ustawienia zostały zapisane".to_string()],
            SettingsOutcome::Rejected { invalid_tables, .. } => invalid_tables
                .iter()
                .map(|t| {
                    format!(
                        "Suma szerokości w tabeli {} musi wynosić 100%",
                        t.replace('_', " ")
                    )
                })
                .collect(),
        }
    }
}

fn field<'a>(form: &'a [(String, String)], name: &str) -> Option<&'a str> {
    form.iter()
        .rev()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Setting rows the form asks to store: known keys that were submitted,
/// booleans always (`"1"` when ticked), then the width strings.
fn rows_to_write(form: &[(String, String)], widths: &[TableWidths]) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    for key in SETTING_KEYS {
        if BOOLEAN_KEYS.contains(key) {
            let on = field(form, key).is_some_and(|v| !v.trim().is_empty() && v != "0");
            rows.push((key.to_string(), if on { "1" } else { "0" }.to_string()));
        } else if let Some(value) = field(form, key) {
            rows.push((key.to_string(), value.to_string()));
        }
    }
    for table in widths {
        rows.push((table_widths_key(&table.table), serialize_widths(&table.columns)));
    }
    rows
}

pub struct SettingsService;

impl SettingsService {
    /// Defaults and environment overlaid by the stored rows.
    pub async fn load<C: ConnectionTrait>(db: &C) -> Result<Settings, DbErr> {
        let rows = Setting::all_pairs(db).await?;
        Ok(Settings::from_env().overlay(rows))
    }

    /// Rebuilds the snapshot from the database and swaps it in.
    pub async fn reload(state: &AppState) -> Result<Arc<Settings>, DbErr> {
        let settings = Self::load(state.db()).await?;
        state.settings_store().replace(settings);
        info!("runtime settings reloaded");
        Ok(state.settings())
    }

    /// Validates and stores the settings form.
    ///
    /// Any table whose widths do not add up to 100% rejects the whole
    /// submission. Otherwise every row is written in one transaction, the
    /// admin login/password are updated when given, and the snapshot is
    /// reloaded.
    pub async fn save(state: &AppState, form: &[(String, String)]) -> ServiceResult<SettingsOutcome> {
        let widths = group_width_fields(form.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let invalid_tables: Vec<String> = widths
            .iter()
            .filter(|t| !t.is_valid())
            .map(|t| t.table.clone())
            .collect();

        if !invalid_tables.is_empty() {
            warn!(tables = ?invalid_tables, "column widths rejected, nothing saved");
            return Ok(SettingsOutcome::Rejected {
                invalid_tables,
                submitted: form.to_vec(),
            });
        }

        let rows = rows_to_write(form, &widths);
        let admin_login = field(form, ADMIN_LOGIN_FIELD).map(str::trim).filter(|l| !l.is_empty());
        let admin_password = field(form, ADMIN_PASSWORD_FIELD).filter(|p| !p.is_empty());

        let txn = state.db().begin().await?;
        for (key, value) in &rows {
            Setting::upsert(&txn, key, value).await?;
        }
        if admin_login.is_some() || admin_password.is_some() {
            if let Some(mut admin) = User::first_admin(&txn).await? {
                if let Some(login) = admin_login.filter(|l| *l != admin.login) {
                    admin = admin.set_login(&txn, login).await?;
                    info!(admin_id = admin.id, "admin login changed");
                }
                if let Some(password) = admin_password {
                    admin.set_password(&txn, password).await?;
                    info!(admin_id = admin.id, "admin password changed");
                }
            }
        }
        txn.commit().await?;

        info!(written = rows.len(), tables = widths.len(), "settings saved");
        Self::reload(state).await?;
        Ok(SettingsOutcome::Saved {
            written: rows.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use db::models::user::Role;
    use util::settings::{EMAIL_FOOTER, EMAIL_USE_TRAINER_NAME, SMTP_HOST};

    fn form(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn groups_by_last_underscore_and_skips_garbage() {
        let fields = [
            ("width_admin_trainers_id", "10"),
            ("width_admin_trainers_name", "30"),
            ("width_panel_history_date", "abc"),
            ("width_panel_history_hours", "100"),
            ("smtp_host", "mail"),
            ("width_admin_trainers_id", "15"),
            ("width_nounderscore", "5"),
        ];
        let groups = group_width_fields(fields);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].table, "admin_trainers");
        assert_eq!(
            groups[0].columns,
            vec![("id".to_string(), 15.0), ("name".to_string(), 30.0)]
        );
        assert_eq!(groups[1].table, "panel_history");
        assert_eq!(groups[1].columns, vec![("hours".to_string(), 100.0)]);
    }

    #[test]
    fn tolerance_is_a_tenth_of_a_percent() {
        let t = |w: f64| TableWidths {
            table: "t".into(),
            columns: vec![("a".into(), 50.0), ("b".into(), w)],
        };
        assert!(t(50.0).is_valid());
        assert!(t(50.05).is_valid());
        assert!(t(49.95).is_valid());
        assert!(!t(50.2).is_valid());
        assert!(!t(30.0).is_valid());
    }

    #[test]
    fn infinite_width_invalidates_its_table() {
        let groups = group_width_fields([
            ("width_admin_trainers_id", "100"),
            ("width_admin_trainers_name", "inf"),
            ("width_panel_history_date", "NaN"),
        ]);
        assert_eq!(groups[0].columns.len(), 2);
        assert!(!groups[0].is_valid());
        assert!(!groups[1].is_valid());
    }

    #[tokio::test]
    async fn valid_widths_are_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let submitted = form(&[
            ("width_admin_trainers_id", "10"),
            ("width_admin_trainers_name", "30"),
            ("width_admin_trainers_signature", "20"),
            ("width_admin_trainers_participants", "20"),
            ("width_admin_trainers_action", "20"),
            ("email_footer", "Pozdrawiamy"),
        ]);

        let outcome = SettingsService::save(&state, &submitted).await.unwrap();
        assert!(matches!(outcome, SettingsOutcome::Saved { .. }));

        let stored = Setting::get(state.db(), "table_admin_trainers_widths")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, "id=10,name=30,signature=20,participants=20,action=20");

        let settings = state.settings();
        assert_eq!(settings.get(EMAIL_FOOTER), Some("Pozdrawiamy"));
        assert_eq!(settings.table_widths("admin_trainers").len(), 5);
        assert_eq!(settings.get(EMAIL_USE_TRAINER_NAME), Some("0"));
    }

    #[tokio::test]
    async fn round_trip_of_two_columns() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        SettingsService::save(
            &state,
            &form(&[("width_admin_trainers_id", "25"), ("width_admin_trainers_name", "75")]),
        )
        .await
        .unwrap();

        let reloaded = SettingsService::load(state.db()).await.unwrap();
        let widths = reloaded.table_widths("admin_trainers");
        assert_eq!(widths, vec![("id".to_string(), 25.0), ("name".to_string(), 75.0)]);
        assert_eq!(widths.iter().map(|(_, w)| w).sum::<f64>(), 100.0);
    }

    #[tokio::test]
    async fn one_bad_table_rejects_everything() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let submitted = form(&[
            ("smtp_host", "smtp.example.com"),
            ("width_admin_trainers_id", "50"),
            ("width_admin_trainers_name", "30"),
            ("width_panel_history_date", "40"),
            ("width_panel_history_hours", "60"),
        ]);

        let outcome = SettingsService::save(&state, &submitted).await.unwrap();
        match &outcome {
            SettingsOutcome::Rejected {
                invalid_tables,
                submitted: echoed,
            } => {
                assert_eq!(invalid_tables, &vec!["admin_trainers".to_string()]);
                assert_eq!(echoed, &submitted);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(
            outcome.messages(),
            vec!["Suma szerokości w tabeli admin trainers musi wynosić 100%".to_string()]
        );

        assert!(Setting::get(state.db(), "table_admin_trainers_widths").await.unwrap().is_none());
        assert!(Setting::get(state.db(), "table_panel_history_widths").await.unwrap().is_none());
        assert!(Setting::get(state.db(), SMTP_HOST).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn infinite_width_is_rejected_not_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let submitted = form(&[("width_admin_trainers_id", "100"), ("width_admin_trainers_name", "inf")]);

        let outcome = SettingsService::save(&state, &submitted).await.unwrap();
        assert!(matches!(
            outcome,
            SettingsOutcome::Rejected { ref invalid_tables, .. } if invalid_tables == &["admin_trainers"]
        ));
        assert!(Setting::get(state.db(), "table_admin_trainers_widths").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn boolean_keys_are_stored_as_flags() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        SettingsService::save(&state, &form(&[(EMAIL_USE_TRAINER_NAME, "on")]))
            .await
            .unwrap();
        assert_eq!(
            Setting::get(state.db(), EMAIL_USE_TRAINER_NAME).await.unwrap().as_deref(),
            Some("1")
        );
        assert!(state.settings().flag(EMAIL_USE_TRAINER_NAME));

        SettingsService::save(&state, &form(&[])).await.unwrap();
        assert!(!state.settings().flag(EMAIL_USE_TRAINER_NAME));
    }

    #[tokio::test]
    async fn admin_credentials_change_with_settings() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        User::create(state.db(), "root@example.com", "stare", Role::Admin, true, None)
            .await
            .unwrap();

        SettingsService::save(
            &state,
            &form(&[("admin_login", "szef@example.com"), ("admin_password", "nowe")]),
        )
        .await
        .unwrap();

        let admin = User::find_by_login(state.db(), "szef@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(admin.verify_password("nowe"));
    }
}
