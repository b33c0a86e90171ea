//! The per-letter request submitted by a front-end.

use crate::error::LetterError;
use serde::{Deserialize, Serialize};

/// Which template to fill, and with what.
///
/// Batch files are JSON arrays of these:
///
/// ```json
/// [{ "template_id": "UR Recruitment LTD", "client_name": "ACME Ltd", "date": "today" }]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillRequest {
    pub template_id: String,
    pub client_name: String,
    /// Any date spelling (or `today`); see [`crate::dates::canonical_date`].
    #[serde(default = "default_date")]
    pub date: String,
}

fn default_date() -> String {
    "today".to_string()
}

impl FillRequest {
    /// Build and validate a request.
    pub fn new(
        template_id: impl Into<String>,
        client_name: impl Into<String>,
        date: impl Into<String>,
    ) -> Result<Self, LetterError> {
        let request = Self {
            template_id: template_id.into(),
            client_name: client_name.into(),
            date: date.into(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Reject empty fields. Deserialised requests are not validated until
    /// they are generated.
    pub fn validate(&self) -> Result<(), LetterError> {
        if self.template_id.trim().is_empty() {
            return Err(LetterError::InvalidRequest(
                "template id must not be empty".into(),
            ));
        }
        if self.client_name.trim().is_empty() {
            return Err(LetterError::InvalidRequest(
                "client name must not be empty".into(),
            ));
        }
        if self.date.trim().is_empty() {
            return Err(LetterError::InvalidRequest("date must not be empty".into()));
        }
        Ok(())
    }

    /// Client name as written into the letter.
    pub fn client(&self) -> &str {
        self.client_name.trim()
    }
}
