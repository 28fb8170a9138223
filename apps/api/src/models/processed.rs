use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize, Serializer};

use crate::catalog::ServiceCategory;

/// A 311 request with verified categorization and an enhanced description.
///
/// `original_category` is always the category the request arrived with.
/// `confidence` is the verifier's confidence in `recommended_category`, in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRequest {
    pub original_category: ServiceCategory,
    pub recommended_category: ServiceCategory,
    pub updated_description: String,
    pub emergency: bool,
    pub image_verified: bool,
    pub confidence: f64,
    pub rationale: String,
    pub service_request_id: String,
    pub status: String,
    pub address: String,
    pub lat: f64,
    pub long: f64,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub requested_datetime: DateTime<FixedOffset>,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub updated_datetime: DateTime<FixedOffset>,
}

/// Writes a numeric offset (`+00:00`, never `Z`) so the caller's offset survives as sent.
fn serialize_rfc3339<S: Serializer>(ts: &DateTime<FixedOffset>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339())
}
