//! Word documents produced by the attendance system: per-session attendance
//! lists and monthly billing reports, both filled from existing templates.

pub mod attendance_list;
pub mod builder;
pub mod day_marker;
pub mod docx;
pub mod error;
pub mod hours;
pub mod monthly_report;

pub use attendance_list::{generate_attendance_list, AttendanceList, GeneratedList};
pub use docx::Docx;
pub use error::{DocumentError, DocumentResult, EmbedError, SignatureFailure, SignatureSite};
pub use hours::{format_decimal, format_hours, parse_hours};
pub use monthly_report::{
    generate_monthly_report, MonthlyReport, ReportPeriod, ReportTrainer, SessionHours,
};

/// MIME type of generated documents.
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
