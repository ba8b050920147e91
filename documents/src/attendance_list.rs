//! Attendance list of a single session, filled from its template.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::docx::{wordml, Docx};
use crate::error::{DocumentResult, SignatureFailure, SignatureSite};
use crate::monthly_report::{Stamper, CLOSING_SIGNATURE_CM};

const TITLE_MARKER: &str = "Lista obecności";
const DATE_MARKER: &str = "Data zajęć:";
const DURATION_MARKER: &str = "Czas trwania zajęć:";

/// Roster font size in half-points (10 pt).
const ROSTER_FONT_HALF_POINTS: u32 = 20;

/// Everything printed on an attendance list.
///
/// `date` and `duration` are written verbatim. `present` is printed in the
/// given order.
#[derive(Debug, Clone, Default)]
pub struct AttendanceList {
    pub date: String,
    pub duration: String,
    pub present: Vec<String>,
    pub trainer_label: String,
    pub signature: Option<PathBuf>,
    pub course_name: Option<String>,
}

#[derive(Debug)]
pub struct GeneratedList {
    pub document: Docx,
    pub signature_failures: Vec<SignatureFailure>,
}

pub fn generate_attendance_list(template: &Path, list: &AttendanceList) -> DocumentResult<GeneratedList> {
    let mut doc = Docx::open(template)?;

    let course = list.course_name.as_deref().filter(|c| !c.trim().is_empty());
    for idx in doc.paragraph_refs() {
        let Some(p) = doc.paragraph_mut(idx) else {
            continue;
        };
        let text = wordml::paragraph_text(p);
        if text.contains(TITLE_MARKER) {
            if let Some(course) = course {
                wordml::set_paragraph_text(p, &format!("{TITLE_MARKER} – {course}"));
                continue;
            }
        }
        if text.contains(DATE_MARKER) && text.contains(DURATION_MARKER) {
            wordml::set_paragraph_text(
                p,
                &format!("{DATE_MARKER} {}    {DURATION_MARKER} {}", list.date, list.duration),
            );
        }
    }

    let signature = list.signature.as_deref().filter(|p| p.exists());
    let mut stamper = Stamper {
        signature,
        failures: Vec::new(),
    };

    let tables = doc.table_refs();
    if tables.len() < 2 {
        warn!(tables = tables.len(), "attendance template needs a roster and a trainer table");
    } else {
        fill_roster(&mut doc, tables[0], &list.present);
        fill_trainer(&mut doc, tables[1], list, &mut stamper);
    }

    Ok(GeneratedList {
        document: doc,
        signature_failures: stamper.failures,
    })
}

/// Names go into the first column after the header row; surplus rows are blanked.
fn fill_roster(doc: &mut Docx, table: usize, present: &[String]) {
    for (i, row) in doc.row_refs(table).into_iter().enumerate().skip(1) {
        let cells = doc.cell_refs(table, row);
        match present.get(i - 1) {
            Some(name) => {
                let Some(&first) = cells.first() else {
                    continue;
                };
                doc.set_cell_text(first, name);
                if let Some(tc) = doc.cell_mut(first) {
                    wordml::set_font_size(tc, ROSTER_FONT_HALF_POINTS);
                }
            }
            None => {
                for at in cells {
                    doc.set_cell_text(at, "");
                }
            }
        }
    }
    let capacity = doc.row_refs(table).len().saturating_sub(1);
    if present.len() > capacity {
        warn!(present = present.len(), capacity, "roster table too short; names dropped");
    }
}

fn fill_trainer(doc: &mut Docx, table: usize, list: &AttendanceList, stamper: &mut Stamper<'_>) {
    let Some(&row) = doc.row_refs(table).get(1) else {
        warn!("trainer table has no second row");
        return;
    };
    let cells = doc.cell_refs(table, row);
    if let Some(&label_cell) = cells.first() {
        doc.set_cell_text(label_cell, &list.trainer_label);
    }
    if let Some(&signature_cell) = cells.get(1) {
        stamper.stamp_cell_sized(doc, signature_cell, SignatureSite::TrainerCell, CLOSING_SIGNATURE_CM);
    }
}
