//! Output types: what a generation request hands back.

use crate::error::{FieldWarning, LetterError};
use crate::pipeline::fields::Placement;
use crate::request::FillRequest;
use serde::{Deserialize, Serialize};

/// What the fill engine did to one template copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillReport {
    pub template_id: String,
    /// How the client field was filled; `None` if the template has none.
    pub client: Option<Placement>,
    /// Filled date fields, in document order.
    pub dates: Vec<Placement>,
    /// Date fields the template declares.
    pub expected_dates: usize,
    /// Images moved alongside split date fields.
    pub images_carried: usize,
    pub signature_stamped: bool,
    /// Non-fatal problems; the letter was still produced.
    pub warnings: Vec<FieldWarning>,
}

impl FillReport {
    /// True if every declared field was found and filled.
    pub fn is_complete(&self) -> bool {
        self.client.is_some() && self.dates.len() >= self.expected_dates
    }
}

/// Timing and size of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub fill_duration_ms: u64,
    pub convert_duration_ms: u64,
    pub total_duration_ms: u64,
    pub output_bytes: u64,
}

/// A finished letter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Suggested file name, `<sanitised client>.pdf`.
    pub file_name: String,
    /// PDF bytes. Omitted from JSON reports.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub report: FillReport,
    pub stats: GenerationStats,
}

/// Outcome of one request in a batch, tagged with its input position.
#[derive(Debug)]
pub struct BatchItem {
    /// Position of the request in the submitted list (0-based).
    pub index: usize,
    pub request: FillRequest,
    pub result: Result<Artifact, LetterError>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
