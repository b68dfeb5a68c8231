use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public part of a vault key in JSON Web Key form.
///
/// Binary members (`n`, `e`, `x`, `y`) are base64url strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonWebKey {
    #[serde(default)]
    pub kid: Option<String>,
    pub kty: String,
    #[serde(default)]
    pub key_ops: Vec<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
}

/// An asymmetric key as returned by the remote vault.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteKey {
    pub id: String,
    pub jwk: JsonWebKey,
    pub created: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub tags: BTreeMap<String, String>,
}

/// A secret as returned by the remote vault.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSecret {
    pub value: String,
    pub created: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub tags: BTreeMap<String, String>,
}
