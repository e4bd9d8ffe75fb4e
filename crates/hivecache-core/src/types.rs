//! Shared types for the account cache pipeline.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AccountsError;
use crate::metadata::ProfileMetadata;

// ─── AccountRecord ────────────────────────────────────────────────────────────

/// Raw account state as supplied by the chain adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Account name (`"alice"`).
    pub name: String,
    /// Governance proxy account, empty when unset.
    #[serde(default)]
    pub proxy: String,
    /// Number of posts and comments authored.
    #[serde(default)]
    pub post_count: i64,
    /// Raw reputation score. Some nodes return it as a decimal string.
    #[serde(deserialize_with = "int_or_string")]
    pub reputation: i64,
    /// Vesting shares held by the account.
    pub vesting_shares: AssetAmount,
    /// Lifetime bandwidth counter in bytes.
    #[serde(default, deserialize_with = "int_or_string")]
    pub lifetime_bandwidth: i64,
    /// Raw, untrusted profile JSON.
    #[serde(default)]
    pub json_metadata: String,
}

fn int_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(v) => Ok(v),
        IntOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ─── AssetAmount ─────────────────────────────────────────────────────────────

/// An asset quantity in either of the two wire formats nodes emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssetAmount {
    /// `"1234.567890 VESTS"`
    Legacy(String),
    /// `{"amount":"1234567890","precision":6,"nai":"@@000000037"}`
    Nai {
        amount: String,
        precision: u32,
        nai: String,
    },
}

impl AssetAmount {
    /// Build a legacy `"<quantity> <unit>"` amount.
    pub fn legacy(s: impl Into<String>) -> Self {
        Self::Legacy(s.into())
    }

    /// Decimal magnitude of the amount, ignoring the unit.
    pub fn value(&self) -> Result<f64, AccountsError> {
        match self {
            Self::Legacy(raw) => {
                let mut parts = raw.split_whitespace();
                let (Some(qty), Some(_unit), None) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(AccountsError::InvalidAmount {
                        raw: raw.clone(),
                        reason: "expected '<quantity> <unit>'".into(),
                    });
                };
                qty.parse::<f64>().map_err(|e| AccountsError::InvalidAmount {
                    raw: raw.clone(),
                    reason: e.to_string(),
                })
            }
            Self::Nai { amount, precision, .. } => {
                let units = amount.parse::<i64>().map_err(|e| AccountsError::InvalidAmount {
                    raw: amount.clone(),
                    reason: e.to_string(),
                })?;
                let precision = i32::try_from(*precision).map_err(|_| {
                    AccountsError::InvalidAmount {
                        raw: amount.clone(),
                        reason: format!("precision {precision} out of range"),
                    }
                })?;
                Ok(units as f64 / 10f64.powi(precision))
            }
        }
    }
}

// ─── CacheColumn ─────────────────────────────────────────────────────────────

/// Key column of the cache table.
pub const KEY_COLUMN: &str = "name";

/// Cache table name.
pub const ACCOUNTS_TABLE: &str = "hive_accounts";

/// Every column a cache refresh overwrites, in statement order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheColumn {
    Proxy,
    PostCount,
    Reputation,
    Followers,
    Following,
    ProxyWeight,
    VoteWeight,
    KbUsed,
    DisplayName,
    About,
    Location,
    Website,
    ProfileImage,
    CoverImage,
}

impl CacheColumn {
    pub const COUNT: usize = 14;

    pub const ALL: [CacheColumn; Self::COUNT] = [
        Self::Proxy,
        Self::PostCount,
        Self::Reputation,
        Self::Followers,
        Self::Following,
        Self::ProxyWeight,
        Self::VoteWeight,
        Self::KbUsed,
        Self::DisplayName,
        Self::About,
        Self::Location,
        Self::Website,
        Self::ProfileImage,
        Self::CoverImage,
    ];

    /// Column name in `hive_accounts`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::PostCount => "post_count",
            Self::Reputation => "reputation",
            Self::Followers => "followers",
            Self::Following => "following",
            Self::ProxyWeight => "proxy_weight",
            Self::VoteWeight => "vote_weight",
            Self::KbUsed => "kb_used",
            Self::DisplayName => "display_name",
            Self::About => "about",
            Self::Location => "location",
            Self::Website => "website",
            Self::ProfileImage => "profile_image",
            Self::CoverImage => "cover_image",
        }
    }
}

impl std::fmt::Display for CacheColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single bound value of a cache update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheValue<'a> {
    Text(&'a str),
    Int(i64),
    Float(f64),
}

/// Placeholder syntax of the target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `$1, $2, …` (Postgres)
    Dollar,
    /// `?, ?, …` (SQLite)
    Question,
}

impl ParamStyle {
    fn placeholder(self, index: usize) -> String {
        match self {
            Self::Dollar => format!("${index}"),
            Self::Question => "?".to_string(),
        }
    }
}

/// Render the cache update statement.
///
/// Parameters are the values of [`CacheRow::values`] in order, followed by
/// the account name for the `WHERE` clause.
pub fn update_statement(style: ParamStyle) -> String {
    let assignments = CacheColumn::ALL
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{col} = {}", style.placeholder(i + 1)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {ACCOUNTS_TABLE} SET {assignments} WHERE {KEY_COLUMN} = {}",
        style.placeholder(CacheColumn::COUNT + 1)
    )
}

// ─── CacheRow ────────────────────────────────────────────────────────────────

/// The denormalized per-account projection written on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRow {
    pub name: String,
    pub proxy: String,
    pub post_count: i64,
    pub reputation: f64,
    pub followers: i64,
    pub following: i64,
    pub proxy_weight: f64,
    pub vote_weight: f64,
    pub kb_used: f64,
    pub profile: ProfileMetadata,
}

impl CacheRow {
    /// Column/value pairs in [`CacheColumn::ALL`] order, excluding the key.
    pub fn values(&self) -> [(CacheColumn, CacheValue<'_>); CacheColumn::COUNT] {
        // No `..`: a new field must be given a column here.
        let CacheRow {
            name: _,
            proxy,
            post_count,
            reputation,
            followers,
            following,
            proxy_weight,
            vote_weight,
            kb_used,
            profile:
                ProfileMetadata {
                    display_name,
                    about,
                    location,
                    website,
                    profile_image,
                    cover_image,
                },
        } = self;

        [
            (CacheColumn::Proxy, CacheValue::Text(proxy)),
            (CacheColumn::PostCount, CacheValue::Int(*post_count)),
            (CacheColumn::Reputation, CacheValue::Float(*reputation)),
            (CacheColumn::Followers, CacheValue::Int(*followers)),
            (CacheColumn::Following, CacheValue::Int(*following)),
            (CacheColumn::ProxyWeight, CacheValue::Float(*proxy_weight)),
            (CacheColumn::VoteWeight, CacheValue::Float(*vote_weight)),
            (CacheColumn::KbUsed, CacheValue::Float(*kb_used)),
            (CacheColumn::DisplayName, CacheValue::Text(display_name)),
            (CacheColumn::About, CacheValue::Text(about)),
            (CacheColumn::Location, CacheValue::Text(location)),
            (CacheColumn::Website, CacheValue::Text(website)),
            (CacheColumn::ProfileImage, CacheValue::Text(profile_image)),
            (CacheColumn::CoverImage, CacheValue::Text(cover_image)),
        ]
    }

    /// Value for a single column.
    pub fn value(&self, column: CacheColumn) -> CacheValue<'_> {
        // `ALL` is declared in discriminant order.
        self.values()[column as usize].1
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
