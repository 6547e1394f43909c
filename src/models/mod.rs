use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tokio::io::AsyncRead;
use utoipa::ToSchema;

/// Kind of medical report. Advisory only: it drives client-side presentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReportCategory {
    BloodTest,
    XRay,
    CtScan,
    Mri,
    Ultrasound,
    Prescription,
    Other(String),
}

impl ReportCategory {
    pub const OTHER_LABEL: &'static str = "Other";

    pub fn as_str(&self) -> &str {
        match self {
            ReportCategory::BloodTest => "Blood Test (CBC)",
            ReportCategory::XRay => "X-Ray",
            ReportCategory::CtScan => "CT Scan",
            ReportCategory::Mri => "MRI",
            ReportCategory::Ultrasound => "Ultrasound",
            ReportCategory::Prescription => "Prescription",
            ReportCategory::Other(label) => label,
        }
    }

    /// Parses a category label. Unknown labels are kept verbatim as `Other`.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        match label.to_lowercase().as_str() {
            "blood test (cbc)" | "blood test" | "blood_test" | "cbc" => ReportCategory::BloodTest,
            "x-ray" | "xray" | "x_ray" => ReportCategory::XRay,
            "ct scan" | "ct" | "ct_scan" => ReportCategory::CtScan,
            "mri" => ReportCategory::Mri,
            "ultrasound" => ReportCategory::Ultrasound,
            "prescription" => ReportCategory::Prescription,
            "" => ReportCategory::Other(Self::OTHER_LABEL.to_string()),
            _ => ReportCategory::Other(label.to_string()),
        }
    }

    /// Resolves the submitted form pair: picking "Other" lets the uploader describe the type in free text.
    pub fn from_form(category: Option<&str>, other_description: Option<&str>) -> Self {
        let parsed = Self::from_label(category.unwrap_or_default());
        match (&parsed, other_description.map(str::trim)) {
            (ReportCategory::Other(label), Some(desc))
                if label.eq_ignore_ascii_case(Self::OTHER_LABEL) && !desc.is_empty() =>
            {
                ReportCategory::Other(desc.to_string())
            }
            _ => parsed,
        }
    }
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ReportCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ReportCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(ReportCategory::from_label(&label))
    }
}

/// Everything the upload coordinator needs for one report.
pub struct NewReport<'a> {
    pub owner_identity: String,
    pub display_name: String,
    pub category: ReportCategory,
    pub notes: Option<String>,
    /// Byte length when known up front (e.g. spooled uploads); `Some(0)` is rejected before any write
    pub size_hint: Option<u64>,
    pub content: Box<dyn AsyncRead + Unpin + Send + 'a>,
}

/// A stored report as handed back to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportListing {
    pub id: String,
    pub display_name: String,
    #[schema(value_type = String, example = "X-Ray")]
    pub category: ReportCategory,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Where the client can fetch the file content
    pub resolved_locator: String,
}
