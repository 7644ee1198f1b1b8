use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors that can occur while decoding a payload from its wire form
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Unknown payload type: {0}")]
    UnknownPayloadType(String),

    #[error("Malformed {type_tag} payload: {reason}")]
    MalformedPayload { type_tag: String, reason: String },
}

/// Binds an issuer identity to a public key (PEM)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WalletRegistration {
    #[serde(rename = "pubkey")]
    pub public_key: String,
}

/// Moves `amount` units of `item_id` to `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Transfer {
    pub to: String,
    pub item_id: String,
    pub amount: u64,
}

/// The typed content carried by a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    WalletRegistration(WalletRegistration),
    Transfer(Transfer),
}

type PayloadConstructor = fn(&str) -> Result<Payload, PayloadError>;

/// Tag to constructor table. A tag missing here is rejected by `Payload::parse`.
const PAYLOAD_TYPES: &[(&str, PayloadConstructor)] = &[
    (Payload::WALLET_REGISTRATION, parse_wallet_registration),
    (Payload::TRANSFER, parse_transfer),
];

fn parse_wallet_registration(json: &str) -> Result<Payload, PayloadError> {
    decode(Payload::WALLET_REGISTRATION, json).map(Payload::WalletRegistration)
}

fn parse_transfer(json: &str) -> Result<Payload, PayloadError> {
    decode(Payload::TRANSFER, json).map(Payload::Transfer)
}

fn decode<T: DeserializeOwned>(type_tag: &str, json: &str) -> Result<T, PayloadError> {
    serde_json::from_str(json).map_err(|e| PayloadError::MalformedPayload {
        type_tag: type_tag.to_string(),
        reason: e.to_string(),
    })
}

impl Payload {
    pub const WALLET_REGISTRATION: &'static str = "NewWalletData";
    pub const TRANSFER: &'static str = "TransactionData";

    /// Decodes a payload, dispatching purely on `type_tag`
    pub fn parse(type_tag: &str, json: &str) -> Result<Self, PayloadError> {
        let (_, construct) = PAYLOAD_TYPES
            .iter()
            .find(|(tag, _)| *tag == type_tag)
            .ok_or_else(|| PayloadError::UnknownPayloadType(type_tag.to_string()))?;

        construct(json)
    }

    /// The wire tag of this variant
    pub fn type_tag(&self) -> &'static str {
        match self {
            Payload::WalletRegistration(_) => Self::WALLET_REGISTRATION,
            Payload::Transfer(_) => Self::TRANSFER,
        }
    }

    /// Canonical JSON form. Field order follows the struct declarations, so
    /// the same logical value always yields the same bytes.
    pub fn serialize(&self) -> String {
        // Serializing plain string/integer structs cannot fail
        let encoded = match self {
            Payload::WalletRegistration(data) => serde_json::to_string(data),
            Payload::Transfer(data) => serde_json::to_string(data),
        };
        encoded.unwrap_or_default()
    }
}

impl From<WalletRegistration> for Payload {
    fn from(data: WalletRegistration) -> Self {
        Payload::WalletRegistration(data)
    }
}

impl From<Transfer> for Payload {
    fn from(data: Transfer) -> Self {
        Payload::Transfer(data)
    }
}
