/// Request Record: one auction opportunity as handed over by the bidding protocol adapter.
///
/// The adapter fills a `RawBidRequest` field by field (every value is still text, exactly as it
/// arrived on the wire), and `BidRequest::parse` turns it into the strictly typed record the
/// feature transformer consumes. All validation of numeric fields and the timestamp happens here,
/// never at the point of use.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer};

use crate::error::RequestError;

/// Minimum number of timestamp characters needed: `YYYYMMDDHHmm`
const TIMESTAMP_MIN_LEN: usize = 12;

/// Last 15-minute bucket of the day
pub const MAX_TIME_BLOCK: u32 = 95;

/// Loosely typed request fields, populated by the external adapter
///
/// JSON field names follow the exchange log format (`bidId`, `adSlotWidth`, ...). Numbers and
/// strings are both accepted for every field; they are kept as text until `BidRequest::parse`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawBidRequest {
    #[serde(deserialize_with = "text_or_number")]
    pub bid_id: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub timestamp: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub visitor_id: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub user_agent: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub ip_address: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub region: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub city: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub ad_exchange: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub domain: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub url: Option<String>,
    #[serde(rename = "anonymousURLID", deserialize_with = "text_or_number")]
    pub anonymous_url_id: Option<String>,
    #[serde(rename = "adSlotID", deserialize_with = "text_or_number")]
    pub ad_slot_id: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub ad_slot_width: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub ad_slot_height: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub ad_slot_visibility: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub ad_slot_format: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub ad_slot_floor_price: Option<String>,
    #[serde(rename = "creativeID", deserialize_with = "text_or_number")]
    pub creative_id: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub advertiser_id: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub user_tags: Option<String>,
}

/// Accept `"80"`, `80` or `null` for a text field
fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_json::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("expected a scalar, got {}", other))),
    }
}

/// Advertiser identifier used to select the CTR/CVR models
///
/// The identifier is also appended to the feature vector for the CVR and bid-price models, so it
/// has to be numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey {
    id: String,
    numeric: i64,
}

impl ModelKey {
    pub fn parse(id: &str) -> Result<Self, RequestError> {
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RequestError::InvalidModelKey(id.to_string()));
        }
        let numeric = id
            .parse::<i64>()
            .map_err(|_| RequestError::InvalidModelKey(id.to_string()))?;
        Ok(Self { id: id.to_string(), numeric })
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// The key as the extra trailing feature
    pub fn as_feature(&self) -> f64 {
        self.numeric as f64
    }
}

impl FromStr for ModelKey {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKey::parse(s)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Validated auction timestamp (`YYYYMMDDHHmmSSmmm`, only the first 12 characters are used)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    raw: String,
    date: NaiveDate,
    hour: u32,
    minute: u32,
}

impl Timestamp {
    pub fn parse(raw: &str) -> Result<Self, RequestError> {
        let malformed = |reason: &'static str| RequestError::MalformedTimestamp {
            value: raw.to_string(),
            reason,
        };

        if raw.len() < TIMESTAMP_MIN_LEN {
            return Err(malformed("shorter than 12 characters"));
        }
        let head = raw
            .get(..TIMESTAMP_MIN_LEN)
            .ok_or_else(|| malformed("not ASCII"))?;
        if !head.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("date and time must be digits"));
        }

        // `head` is 12 ASCII digits, so every slice below is in bounds and parses
        let digits = |range: std::ops::Range<usize>| -> u32 {
            head[range].bytes().fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
        };
        let year = digits(0..4) as i32;
        let month = digits(4..6);
        let day = digits(6..8);
        let hour = digits(8..10);
        let minute = digits(10..12);

        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| malformed("invalid calendar date"))?;
        if hour > 23 {
            return Err(malformed("hour out of range"));
        }
        if minute > 59 {
            return Err(malformed("minute out of range"));
        }

        Ok(Self {
            raw: raw.to_string(),
            date,
            hour,
            minute,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// 15-minute bucket of the day, in [0, MAX_TIME_BLOCK]
    pub fn time_block(&self) -> u32 {
        self.hour * 4 + self.minute / 15
    }

    /// Day of the month, the calendar day the encoders were fitted on
    pub fn day_of_month(&self) -> u32 {
        self.date.day()
    }
}

/// Strictly typed Request Record
#[derive(Debug, Clone, PartialEq)]
pub struct BidRequest {
    pub bid_id: String,
    pub timestamp: Timestamp,
    pub visitor_id: String,
    pub user_agent: String,
    pub ip_address: String,
    pub region: String,
    pub city: String,
    pub ad_exchange: i64,
    pub domain: String,
    pub url: String,
    pub anonymous_url_id: String,
    pub ad_slot_id: String,
    pub ad_slot_width: u32,
    pub ad_slot_height: u32,
    pub ad_slot_visibility: i64,
    pub ad_slot_format: i64,
    pub ad_slot_floor_price: i64,
    pub creative_id: String,
    pub advertiser_id: ModelKey,
    pub user_tags: String,
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, RequestError> {
    value.as_deref().ok_or(RequestError::MissingField { field })
}

fn integer<T: FromStr>(field: &'static str, value: &Option<String>) -> Result<T, RequestError> {
    let text = required(field, value)?;
    text.trim().parse::<T>().map_err(|_| RequestError::InvalidInteger {
        field,
        value: text.to_string(),
    })
}

fn floor_price(value: &Option<String>) -> Result<i64, RequestError> {
    let floor: i64 = integer("adSlotFloorPrice", value)?;
    if floor < 0 {
        return Err(RequestError::NegativeFloorPrice(floor));
    }
    Ok(floor)
}

fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

impl BidRequest {
    /// Validate raw adapter fields into a typed request
    ///
    /// Fields the scoring path never reads (visitor, ip, domain, url, slot id) may be absent.
    pub fn parse(raw: &RawBidRequest) -> Result<Self, RequestError> {
        Ok(Self {
            bid_id: optional(&raw.bid_id),
            timestamp: Timestamp::parse(required("timestamp", &raw.timestamp)?)?,
            visitor_id: optional(&raw.visitor_id),
            user_agent: required("userAgent", &raw.user_agent)?.to_string(),
            ip_address: optional(&raw.ip_address),
            region: required("region", &raw.region)?.to_string(),
            city: required("city", &raw.city)?.to_string(),
            ad_exchange: integer("adExchange", &raw.ad_exchange)?,
            domain: optional(&raw.domain),
            url: optional(&raw.url),
            anonymous_url_id: optional(&raw.anonymous_url_id),
            ad_slot_id: optional(&raw.ad_slot_id),
            ad_slot_width: integer("adSlotWidth", &raw.ad_slot_width)?,
            ad_slot_height: integer("adSlotHeight", &raw.ad_slot_height)?,
            ad_slot_visibility: integer("adSlotVisibility", &raw.ad_slot_visibility)?,
            ad_slot_format: integer("adSlotFormat", &raw.ad_slot_format)?,
            ad_slot_floor_price: floor_price(&raw.ad_slot_floor_price)?,
            creative_id: required("creativeID", &raw.creative_id)?.to_string(),
            advertiser_id: ModelKey::parse(required("advertiserId", &raw.advertiser_id)?)?,
            user_tags: required("userTags", &raw.user_tags)?.to_string(),
        })
    }

    /// User tag codes, empty segments skipped
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.user_tags.split(',').map(str::trim).filter(|tag| !tag.is_empty())
    }
}
