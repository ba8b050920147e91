use std::fmt;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),
    #[error("invalid report period {month}/{year}: month must be 1-12 and year at least 2000")]
    InvalidPeriod { month: u32, year: i32 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid document package: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("malformed XML: {0}")]
    Xml(String),
    #[error("document package has no {0} part")]
    MissingPart(&'static str),
}

pub type DocumentResult<T> = Result<T, DocumentError>;

pub(crate) fn xml_error<E: fmt::Display>(err: E) -> DocumentError {
    DocumentError::Xml(err.to_string())
}

/// Why a signature could not be placed.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("cannot read image {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unsupported or corrupt image {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },
}

/// Location in a document where a signature was supposed to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureSite {
    /// Day row of the monthly report, by day of month.
    DayRow(u32),
    /// Cell following the grand total.
    TotalRow,
    /// Paragraph for the contractor's legible signature.
    ClosingParagraph,
    /// Trainer cell of the attendance list.
    TrainerCell,
}

impl fmt::Display for SignatureSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureSite::DayRow(day) => write!(f, "day row {day}"),
            SignatureSite::TotalRow => f.write_str("total row"),
            SignatureSite::ClosingParagraph => f.write_str("closing paragraph"),
            SignatureSite::TrainerCell => f.write_str("trainer cell"),
        }
    }
}

/// A signature that was skipped because embedding failed.
#[derive(Debug)]
pub struct SignatureFailure {
    pub site: SignatureSite,
    pub error: EmbedError,
}
