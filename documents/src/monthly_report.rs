//! Monthly billing report filled from the report template.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};

use crate::day_marker::row_day;
use crate::docx::{wordml, CellRef, Docx};
use crate::error::{DocumentError, DocumentResult, SignatureFailure, SignatureSite};
use crate::hours::format_hours;

/// Signature width in day rows and in the total row.
pub const ROW_SIGNATURE_CM: f64 = 2.5;
/// Signature width under the report.
pub const CLOSING_SIGNATURE_CM: f64 = 3.5;

const CONTRACTOR_MARKER: &str = "zleceniobiorca:";
const CONTRACT_MARKER: &str = "zlecenia nr";
const PERIOD_PREFIX: &str = "w ";
const TOTAL_MARKER: &str = "łącznie";
const SIGNATURE_MARKER: &str = "(czytelny podpis zleceniobiorcy)";

/// A validated report month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    month: u32,
    year: i32,
}

impl ReportPeriod {
    pub fn new(month: u32, year: i32) -> DocumentResult<Self> {
        if !(1..=12).contains(&month) || year < 2000 {
            return Err(DocumentError::InvalidPeriod { month, year });
        }
        Ok(Self { month, year })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.month() == self.month && date.year() == self.year
    }

    /// `MM.YYYY`, as printed in the report header.
    pub fn label(&self) -> String {
        format!("{:02}.{}", self.month, self.year)
    }

    /// `M_YYYY`, used in e-mail subjects and attachment names.
    pub fn file_label(&self) -> String {
        format!("{}_{}", self.month, self.year)
    }
}

/// Trainer data printed on the report.
#[derive(Debug, Clone, Default)]
pub struct ReportTrainer {
    pub first_name: String,
    pub last_name: String,
    pub contract_number: String,
    /// Signature image; skipped when `None` or when the file is missing.
    pub signature: Option<PathBuf>,
}

/// One session's contribution to the report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionHours {
    pub date: NaiveDate,
    pub hours: f64,
}

/// A filled report.
#[derive(Debug)]
pub struct MonthlyReport {
    pub document: Docx,
    /// Hours of each matched day row.
    pub day_totals: BTreeMap<u32, f64>,
    /// Sum of the day totals, as written into the total row.
    pub total_hours: f64,
    pub signature_failures: Vec<SignatureFailure>,
}

/// Fills the report template for `trainer` and `period`.
///
/// `sessions` may span any range of dates; only those inside the period
/// count. A day row needs at least three cells (day, hours, signature) to be
/// written; shorter rows are left as they are but their hours still count
/// towards the total. Signature problems never abort generation; they are
/// logged and returned in [`MonthlyReport::signature_failures`].
pub fn generate_monthly_report(
    trainer: &ReportTrainer,
    sessions: &[SessionHours],
    template: &Path,
    period: ReportPeriod,
) -> DocumentResult<MonthlyReport> {
    let mut doc = Docx::open(template)?;
    debug!(month = period.month(), year = period.year(), "generating monthly report");

    rewrite_header(&mut doc, trainer, period);

    let in_period: Vec<SessionHours> = sessions
        .iter()
        .copied()
        .filter(|s| period.contains(s.date))
        .collect();
    debug!(sessions = in_period.len(), "sessions in month");

    let signature = trainer.signature.as_deref().filter(|p| p.exists());
    let mut stamper = Stamper {
        signature,
        failures: Vec::new(),
    };

    let mut day_totals = BTreeMap::new();
    let mut total_hours = 0.0;

    for table in doc.table_refs() {
        for row in doc.row_refs(table) {
            let cells = doc.cell_refs(table, row);
            let texts: Vec<Vec<String>> = cells
                .iter()
                .map(|at| doc.cell(*at).map(wordml::cell_paragraph_texts).unwrap_or_default())
                .collect();
            let Some(day) = row_day(texts) else {
                continue;
            };

            let hours: f64 = in_period
                .iter()
                .filter(|s| s.date.day() == day)
                .map(|s| s.hours)
                .sum();
            if hours <= 0.0 {
                continue;
            }
            debug!(day, hours, "day total");

            if let [_, hours_cell, signature_cell, ..] = cells[..] {
                doc.set_cell_text(hours_cell, &format_hours(hours));
                stamper.stamp_cell(&mut doc, signature_cell, SignatureSite::DayRow(day));
            } else {
                debug!(day, cells = cells.len(), "day row too short, left unchanged");
            }
            *day_totals.entry(day).or_insert(0.0) += hours;
            total_hours += hours;
        }
    }

    fill_total_row(&mut doc, total_hours, &mut stamper);

    for idx in doc.paragraph_refs() {
        let text = doc.paragraph(idx).map(wordml::paragraph_text).unwrap_or_default();
        if text.to_lowercase().contains(SIGNATURE_MARKER) {
            stamper.stamp_paragraph(&mut doc, idx);
        }
    }

    Ok(MonthlyReport {
        document: doc,
        day_totals,
        total_hours,
        signature_failures: stamper.failures,
    })
}

fn rewrite_header(doc: &mut Docx, trainer: &ReportTrainer, period: ReportPeriod) {
    for idx in doc.paragraph_refs() {
        let Some(p) = doc.paragraph_mut(idx) else {
            continue;
        };
        let lower = wordml::paragraph_text(p).to_lowercase();
        if lower.contains(CONTRACTOR_MARKER) {
            wordml::set_paragraph_text(
                p,
                &format!("Zleceniobiorca: {} {}", trainer.first_name, trainer.last_name),
            );
        } else if lower.contains(CONTRACT_MARKER) {
            wordml::set_paragraph_text(
                p,
                &format!(
                    "Rozliczenie liczby godzin wykonywania usług do umowy zlecenia nr {}",
                    trainer.contract_number
                ),
            );
        } else if lower.trim().starts_with(PERIOD_PREFIX) {
            wordml::set_paragraph_text(p, &format!("w {}", period.label()));
        }
    }
}

/// Writes the grand total next to every "łącznie" cell of the last table.
fn fill_total_row(doc: &mut Docx, total_hours: f64, stamper: &mut Stamper<'_>) {
    let Some(&table) = doc.table_refs().last() else {
        warn!("report template has no tables; total not written");
        return;
    };

    for row in doc.row_refs(table) {
        let cells = doc.cell_refs(table, row);
        for idx in 0..cells.len() {
            let text = doc.cell(cells[idx]).map(wordml::cell_text).unwrap_or_default();
            if !text.to_lowercase().contains(TOTAL_MARKER) {
                continue;
            }
            if let Some(at) = cells.get(idx + 1) {
                doc.set_cell_text(*at, &format_hours(total_hours));
            }
            if let Some(at) = cells.get(idx + 2) {
                stamper.stamp_cell(doc, *at, SignatureSite::TotalRow);
            }
        }
    }
}

/// Places the trainer signature and records failures per site.
pub(crate) struct Stamper<'a> {
    pub signature: Option<&'a Path>,
    pub failures: Vec<SignatureFailure>,
}

impl Stamper<'_> {
    pub fn stamp_cell(&mut self, doc: &mut Docx, at: CellRef, site: SignatureSite) {
        self.stamp_cell_sized(doc, at, site, ROW_SIGNATURE_CM);
    }

    pub fn stamp_cell_sized(&mut self, doc: &mut Docx, at: CellRef, site: SignatureSite, width_cm: f64) {
        let Some(path) = self.signature else {
            return;
        };
        if let Err(error) = doc.put_picture_in_cell(at, path, width_cm) {
            warn!(%site, %error, "signature not embedded");
            self.failures.push(SignatureFailure { site, error });
        }
    }

    fn stamp_paragraph(&mut self, doc: &mut Docx, idx: usize) {
        let Some(path) = self.signature else {
            return;
        };
        if let Err(error) = doc.put_picture_in_paragraph(idx, path, CLOSING_SIGNATURE_CM) {
            warn!(site = %SignatureSite::ClosingParagraph, %error, "signature not embedded");
            self.failures.push(SignatureFailure {
                site: SignatureSite::ClosingParagraph,
                error,
            });
        }
    }
}
