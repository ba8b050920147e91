use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Ensure the parent directory of a *file path* exists (no-op if none).
pub fn ensure_parent_dir<P: AsRef<Path>>(file_path: P) -> io::Result<()> {
    if let Some(parent) = file_path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Output file of a monthly report: {REPORTS_DIR}/raport_{trainer_id}_{month}_{year}.docx
pub fn report_output_path(reports_dir: &Path, trainer_id: i64, month: u32, year: i32) -> PathBuf {
    reports_dir.join(format!("raport_{trainer_id}_{month}_{year}.docx"))
}

/// Attachment name of an e-mailed attendance list.
pub fn attendance_attachment_name(date_label: &str) -> String {
    format!("lista_{date_label}.docx")
}

/// Attachment name of an e-mailed monthly report.
pub fn report_attachment_name(period_label: &str) -> String {
    format!("raport_{period_label}.docx")
}
