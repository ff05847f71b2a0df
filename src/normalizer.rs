//! Resolves loosely shaped request bodies into typed booking requests.
//!
//! Every logical field declares the keys it may arrive under. The first alias
//! holding a non-empty string or number wins. Values are trimmed and embedded
//! line breaks collapse to a single space.

use crate::error::AppError;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use validator::{Validate, ValidationErrors};

pub const DEFAULT_SOURCE: &str = "website";
pub const LEAD_SOURCE: &str = "retell_call";

lazy_static! {
    static ref LINE_BREAKS: Regex = Regex::new(r"\s*[\r\n]+\s*").expect("line break pattern is valid");
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Name of the struct field this entry fills.
    pub field: &'static str,
    /// Human readable name used in error messages.
    pub label: &'static str,
    pub aliases: &'static [&'static str],
}

pub const FULL_NAME: FieldSpec = FieldSpec {
    field: "full_name",
    label: "full name",
    aliases: &["fullName", "full_name", "name"],
};
pub const EMAIL: FieldSpec = FieldSpec {
    field: "email",
    label: "email",
    aliases: &["email", "emailAddress", "email_address"],
};
pub const PHONE: FieldSpec = FieldSpec {
    field: "phone",
    label: "phone",
    aliases: &["phone", "phoneNumber", "phone_number"],
};
pub const COMPANY: FieldSpec = FieldSpec {
    field: "company",
    label: "company",
    aliases: &["company", "companyName", "company_name", "organization"],
};
pub const DATE: FieldSpec = FieldSpec {
    field: "date",
    label: "date",
    aliases: &["date", "preferredDate", "preferred_date"],
};
pub const TIME: FieldSpec = FieldSpec {
    field: "time",
    label: "time",
    aliases: &["time", "preferredTime", "preferred_time"],
};
pub const TIME_ZONE: FieldSpec = FieldSpec {
    field: "time_zone",
    label: "time zone",
    aliases: &["timeZone", "timezone", "time_zone", "tz"],
};
pub const DURATION: FieldSpec = FieldSpec {
    field: "duration_minutes",
    label: "duration",
    aliases: &["duration", "durationMinutes", "duration_minutes"],
};
pub const NOTES: FieldSpec = FieldSpec {
    field: "notes",
    label: "notes",
    aliases: &["notes", "message", "comments"],
};
pub const SOURCE: FieldSpec = FieldSpec {
    field: "source",
    label: "source",
    aliases: &["source", "utm_source"],
};

#[derive(Debug, Clone)]
pub struct BookingDefaults {
    pub time_zone: String,
    pub duration_minutes: i32,
}

impl Default for BookingDefaults {
    fn default() -> Self {
        Self {
            time_zone: "UTC".into(),
            duration_minutes: 30,
        }
    }
}

/// A normalized submission. `date` and `time` may be empty for webhook leads.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct BookingRequest {
    #[validate(length(min = 1))]
    pub full_name: String,
    #[validate(length(min = 1))]
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    #[validate(length(min = 1))]
    pub date: String,
    #[validate(length(min = 1))]
    pub time: String,
    pub time_zone: String,
    pub duration_minutes: i32,
    pub notes: Option<String>,
    pub source: String,
}

impl BookingRequest {
    /// Normalizes a booking form body. Fails before any side effect when a
    /// required field is missing.
    pub fn from_json(body: &Value, defaults: &BookingDefaults) -> Result<Self, AppError> {
        let fields = fields(body)?;
        let request = Self {
            full_name: pick(&fields, &FULL_NAME).unwrap_or_default(),
            email: pick(&fields, &EMAIL).unwrap_or_default(),
            phone: pick(&fields, &PHONE),
            company: pick(&fields, &COMPANY),
            date: pick(&fields, &DATE).unwrap_or_default(),
            time: pick(&fields, &TIME).unwrap_or_default(),
            time_zone: pick(&fields, &TIME_ZONE).unwrap_or_else(|| defaults.time_zone.clone()),
            duration_minutes: pick_duration(&fields).unwrap_or(defaults.duration_minutes),
            notes: pick(&fields, &NOTES),
            source: pick(&fields, &SOURCE).unwrap_or_else(|| DEFAULT_SOURCE.into()),
        };
        request
            .validate()
            .map_err(|errors| missing_fields(&errors, &[FULL_NAME, EMAIL, DATE, TIME]))?;
        Ok(request)
    }
}

/// Lead pushed by the call platform's `book_demo` function.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct LeadRequest {
    #[validate(length(min = 1))]
    pub full_name: String,
    #[validate(length(min = 1))]
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub time_zone: Option<String>,
    pub notes: Option<String>,
}

impl LeadRequest {
    pub fn from_json(body: &Value) -> Result<Self, AppError> {
        let fields = fields(body)?;
        let lead = Self {
            full_name: pick(&fields, &FULL_NAME).unwrap_or_default(),
            email: pick(&fields, &EMAIL).unwrap_or_default(),
            phone: pick(&fields, &PHONE),
            company: pick(&fields, &COMPANY),
            date: pick(&fields, &DATE),
            time: pick(&fields, &TIME),
            time_zone: pick(&fields, &TIME_ZONE),
            notes: pick(&fields, &NOTES),
        };
        lead.validate()
            .map_err(|errors| missing_fields(&errors, &[FULL_NAME, EMAIL]))?;
        Ok(lead)
    }

    pub fn into_booking_request(self, defaults: &BookingDefaults) -> BookingRequest {
        BookingRequest {
            full_name: self.full_name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            date: self.date.unwrap_or_default(),
            time: self.time.unwrap_or_default(),
            time_zone: self.time_zone.unwrap_or_else(|| defaults.time_zone.clone()),
            duration_minutes: defaults.duration_minutes,
            notes: self.notes,
            source: LEAD_SOURCE.into(),
        }
    }
}

pub fn clean(raw: &str) -> String {
    LINE_BREAKS.replace_all(raw.trim(), " ").into_owned()
}

pub fn pick(fields: &Map<String, Value>, spec: &FieldSpec) -> Option<String> {
    spec.aliases
        .iter()
        .find_map(|alias| fields.get(*alias).and_then(clean_value))
}

fn pick_duration(fields: &Map<String, Value>) -> Option<i32> {
    pick(fields, &DURATION)?
        .parse::<f64>()
        .ok()
        .filter(|minutes| minutes.is_finite() && *minutes >= 1.0 && *minutes <= i32::MAX as f64)
        .map(|minutes| minutes.round() as i32)
}

fn clean_value(value: &Value) -> Option<String> {
    let cleaned = match value {
        Value::String(text) => clean(text),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!cleaned.is_empty()).then_some(cleaned)
}

// Webhook payloads carry the form under `args`. Those keys win over the
// envelope, and the envelope's `name` is the called function, not a person.
fn fields(body: &Value) -> Result<Map<String, Value>, AppError> {
    let Value::Object(envelope) = body else {
        return Err(AppError::MalformedPayload);
    };
    let Some(Value::Object(args)) = envelope.get("args") else {
        return Ok(envelope.clone());
    };

    let mut merged: Map<String, Value> = envelope
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "args" | "name"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    merged.extend(args.iter().map(|(key, value)| (key.clone(), value.clone())));
    Ok(merged)
}

fn missing_fields(errors: &ValidationErrors, required: &[FieldSpec]) -> AppError {
    let invalid = errors.errors();
    AppError::MissingFields(
        required
            .iter()
            .filter(|spec| invalid.contains_key(spec.field))
            .map(|spec| spec.label.to_string())
            .collect(),
    )
}
