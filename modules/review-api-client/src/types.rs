use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Fields requested from the review endpoint.
pub const REVIEW_FIELDS: &str =
    "id,title,texts,ratings,travelDate,entryDate,user,travelReason,traveledWith,children";

/// One page request against the review endpoint.
#[derive(Debug, Clone)]
pub struct PageQuery {
    /// Upstream identifier of the tracked entity (used as `hotel.id:` filter).
    pub entity_id: String,
    /// Tenant-scoped partner credential, sent as the `Partner-ID` header.
    pub partner_id: String,
    pub limit: u32,
    pub offset: u32,
}

/// A page of reviews plus the total the API reports for the filter.
///
/// Items decode one by one: an item whose fields have unexpected types keeps
/// its well-typed fields and drops the rest, so a single bad record cannot
/// fail the page. `total` is `None` when the API omits it.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewPage {
    #[serde(default, deserialize_with = "lenient_items")]
    pub items: Vec<RawReview>,
    #[serde(default, deserialize_with = "lenient")]
    pub total: Option<i64>,
}

/// Author info nested inside a review.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewUser {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<Value>,
}

/// A single review as the API returns it. Every field is optional; validation
/// happens downstream before anything is persisted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReview {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    /// Keyed text blocks, e.g. `{"GENERAL": "..."}`.
    #[serde(default, deserialize_with = "lenient")]
    pub texts: Option<Value>,
    /// Nested rating blocks, e.g. `{"GENERAL": {"GENERAL": 5.0}}`.
    #[serde(default, deserialize_with = "lenient")]
    pub ratings: Option<Value>,
    #[serde(rename = "travelDate", default, deserialize_with = "lenient")]
    pub travel_date: Option<String>,
    #[serde(rename = "entryDate", default, deserialize_with = "lenient")]
    pub entry_date: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<ReviewUser>,
    #[serde(rename = "travelReason", default, deserialize_with = "lenient")]
    pub travel_reason: Option<String>,
    #[serde(rename = "traveledWith", default, deserialize_with = "lenient")]
    pub traveled_with: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub children: Option<String>,
}

/// A field of the wrong JSON type decodes as `None` instead of failing.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Non-object entries become an empty review, which validation later rejects.
fn lenient_items<'de, D>(deserializer: D) -> Result<Vec<RawReview>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap_or_default())
        .collect())
}

impl RawReview {
    /// The review id in canonical string form, the dedup key.
    pub fn canonical_id(&self) -> Option<String> {
        self.id.as_ref().and_then(canonical_string)
    }

    /// The author's id in canonical string form.
    pub fn user_id(&self) -> Option<String> {
        self.user.as_ref()?.id.as_ref().and_then(canonical_string)
    }

    pub fn entry_time(&self) -> Option<DateTime<Utc>> {
        self.entry_date.as_deref().and_then(parse_api_date)
    }

    pub fn travel_time(&self) -> Option<DateTime<Utc>> {
        self.travel_date.as_deref().and_then(parse_api_date)
    }

    pub fn general_text(&self) -> String {
        self.texts
            .as_ref()
            .and_then(|t| t.get("GENERAL"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    pub fn general_rating(&self) -> Option<f64> {
        self.ratings
            .as_ref()
            .and_then(|r| r.get("GENERAL"))
            .and_then(|g| g.get("GENERAL"))
            .and_then(Value::as_f64)
    }
}

fn canonical_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse the date formats the API is known to emit: RFC 3339, a naive
/// date-time (treated as UTC) or a bare date (midnight UTC).
pub fn parse_api_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ndt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}
