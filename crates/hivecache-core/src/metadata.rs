//! Profile metadata sanitizer.
//!
//! Account `json_metadata` is arbitrary user-supplied JSON. Only the
//! `profile` object is read, and every field is length-bounded and
//! URL-checked before it reaches the cache row. Nothing in here fails:
//! malformed input degrades to empty fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::normalize::trunc;

const MAX_DISPLAY_NAME: usize = 20;
const MAX_ABOUT: usize = 160;
const MAX_LOCATION: usize = 30;
const MAX_WEBSITE: usize = 100;
const MAX_IMAGE_URL: usize = 1024;

/// Sanitized display fields. Discarded or absent values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub display_name: String,
    pub about: String,
    pub location: String,
    pub website: String,
    pub profile_image: String,
    pub cover_image: String,
}

/// The `profile` object of an account's metadata, fields as optional text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawProfile {
    pub name: Option<String>,
    pub about: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub profile_image: Option<String>,
    pub cover_image: Option<String>,
}

impl RawProfile {
    /// Parse `json_metadata`, or return an empty profile on any mismatch.
    pub fn parse_or_default(json_metadata: &str) -> Self {
        let Ok(Value::Object(mut root)) = serde_json::from_str::<Value>(json_metadata) else {
            return Self::default();
        };
        match root.remove("profile") {
            Some(Value::Object(profile)) => Self::from_object(&profile),
            _ => Self::default(),
        }
    }

    fn from_object(profile: &Map<String, Value>) -> Self {
        let field = |key: &str| profile.get(key).and_then(as_text);
        Self {
            name: field("name"),
            about: field("about"),
            location: field("location"),
            website: field("website"),
            profile_image: field("profile_image"),
            cover_image: field("cover_image"),
        }
    }
}

/// Coerce a JSON value to text. `null` counts as absent; numbers, booleans,
/// arrays and objects become their compact JSON rendering.
fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Sanitize raw `json_metadata` into bounded display fields.
pub fn sanitize(json_metadata: &str) -> ProfileMetadata {
    sanitize_profile(RawProfile::parse_or_default(json_metadata))
}

/// Apply length caps and URL checks to an already-extracted profile.
pub fn sanitize_profile(raw: RawProfile) -> ProfileMetadata {
    let display_name = raw
        .name
        .map(|s| trunc(&s, MAX_DISPLAY_NAME))
        // `@name` is a mention, not a display name
        .filter(|s| !s.starts_with('@'));
    let about = raw.about.map(|s| trunc(&s, MAX_ABOUT));
    let location = raw.location.map(|s| trunc(&s, MAX_LOCATION));

    let website = raw
        .website
        .filter(|s| s.chars().count() <= MAX_WEBSITE)
        .map(|s| {
            if s.is_empty() || s.starts_with("http") {
                s
            } else {
                format!("http://{s}")
            }
        });

    ProfileMetadata {
        display_name: display_name.unwrap_or_default(),
        about: about.unwrap_or_default(),
        location: location.unwrap_or_default(),
        website: website.unwrap_or_default(),
        profile_image: image_url(raw.profile_image).unwrap_or_default(),
        cover_image: image_url(raw.cover_image).unwrap_or_default(),
    }
}

fn image_url(url: Option<String>) -> Option<String> {
    url.filter(|s| s.starts_with("http://") || s.starts_with("https://"))
        .filter(|s| s.chars().count() <= MAX_IMAGE_URL)
}
