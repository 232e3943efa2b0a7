use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    #[default]
    Available,
    Active,
    Sold,
}

impl DomainStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DomainStatus::Available => "available",
            DomainStatus::Active => "active",
            DomainStatus::Sold => "sold",
        }
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(DomainStatus::Available),
            "active" => Ok(DomainStatus::Active),
            "sold" => Ok(DomainStatus::Sold),
            other => Err(format!("unknown domain status `{other}`")),
        }
    }
}

/// A listing in the for-sale catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub id: String,
    pub name: String,
    pub extension: String,
    #[serde(default)]
    pub status: DomainStatus,
    pub registrar: Option<String>,
    pub registrar_icon: Option<String>,
    pub registration_time: Option<String>,
    pub expiration_time: Option<String>,
    pub purchase_url: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Create/update payload for [`Domain`]; the id is generated when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewDomain {
    pub id: Option<String>,
    pub name: String,
    pub extension: String,
    #[serde(default)]
    pub status: DomainStatus,
    pub registrar: Option<String>,
    pub registrar_icon: Option<String>,
    pub registration_time: Option<String>,
    pub expiration_time: Option<String>,
    pub purchase_url: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldDomain {
    pub id: String,
    pub name: String,
    pub extension: String,
    /// Always [`DomainStatus::Sold`].
    pub status: DomainStatus,
    pub sold_to: Option<String>,
    pub sold_date: Option<String>,
    pub sold_price: Option<f64>,
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewSoldDomain {
    pub id: Option<String>,
    pub name: String,
    pub extension: String,
    pub sold_to: Option<String>,
    pub sold_date: Option<String>,
    pub sold_price: Option<f64>,
    pub description: Option<String>,
}

/// Buyer-side facts recorded when a listing is marked sold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SaleDetails {
    pub sold_to: Option<String>,
    pub sold_date: Option<String>,
    pub sold_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendlyLink {
    pub id: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewFriendlyLink {
    pub id: Option<String>,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
}

/// Merged settings view: simple key/value pairs plus the registrar icon
/// collection, which lives in its own table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    #[serde(flatten)]
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub registrar_icons: BTreeMap<String, String>,
}

/// The singleton admin credential row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRecord {
    pub id: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub security_code: String,
    pub is_logged_in: bool,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}
