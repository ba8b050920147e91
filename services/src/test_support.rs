use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use db::test_utils::setup_test_db;
use documents::builder::TemplateBuilder;
use util::config::AppConfig;
use util::settings::{Settings, EMAIL_LOGIN, EMAIL_RECIPIENT};
use util::state::AppState;

use crate::email::{MailTransport, OutgoingMail};
use crate::error::EmailError;

/// Keeps every message instead of delivering it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), EmailError> {
        if self.fail {
            return Err(EmailError::Transport("connection refused".into()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// State over an in-memory database with every path inside `dir`.
pub async fn test_state(dir: &TempDir) -> AppState {
    let root = dir.path().to_path_buf();
    let config = AppConfig::from_lookup(|key| match key {
        "STATIC_ROOT" => Some(root.join("static").display().to_string()),
        "TEMPLATES_DIR" => Some(root.display().to_string()),
        "REPORTS_DIR" => Some(root.join("reports").display().to_string()),
        "FRONTEND_URL" => Some("https://obecnosci.example.com".into()),
        _ => None,
    })
    .unwrap();
    let settings = Settings::defaults().overlay([
        (EMAIL_LOGIN.to_string(), "noreply@example.com".to_string()),
        (EMAIL_RECIPIENT.to_string(), "koordynator@example.com".to_string()),
    ]);
    AppState::new(setup_test_db().await, config, settings)
}

/// Report template: header paragraphs, one row per day, a total row and the signature line.
pub fn write_report_template(path: &Path) {
    let days: Vec<[String; 3]> = (1..=31)
        .map(|d| [format!("{d:02}."), String::new(), String::new()])
        .collect();
    let mut rows: Vec<Vec<&str>> = vec![vec!["Dzień", "Liczba godzin", "Podpis"]];
    rows.extend(days.iter().map(|r| r.iter().map(String::as_str).collect()));
    let rows: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();

    TemplateBuilder::new()
        .paragraph("Rozliczenie do umowy zlecenia nr ...")
        .paragraph("Zleceniobiorca: ....")
        .paragraph("w miesiącu ....")
        .table(&rows)
        .table(&[&["Łącznie", "", ""]])
        .paragraph("(czytelny podpis zleceniobiorcy)")
        .write_to(path)
        .unwrap();
}

pub fn write_list_template(path: &Path) {
    TemplateBuilder::new()
        .paragraph("Lista obecności")
        .paragraph("Data zajęć: ....    Czas trwania zajęć: ....")
        .table(&[&["Imię i nazwisko", "Podpis"], &["", ""], &["", ""], &["", ""]])
        .table(&[&["Prowadzący", "Podpis"], &["", ""]])
        .write_to(path)
        .unwrap();
}

pub fn write_signature(path: &Path) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbaImage::new(40, 20).save(path).unwrap();
    path.to_path_buf()
}
