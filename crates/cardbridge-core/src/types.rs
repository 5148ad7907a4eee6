use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Card token reported by the reader (`UID:<token>`).
///
/// The token is opaque: the bridge never validates its format and only
/// forwards it to the backend and to subscribers.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    /// Wrap a raw card token.
    pub fn new(id: impl Into<String>) -> Self {
        CardId(id.into())
    }

    /// Get the card token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CardId {
    fn from(s: &str) -> Self {
        CardId::new(s)
    }
}

impl From<String> for CardId {
    fn from(s: String) -> Self {
        CardId(s)
    }
}

/// Constant-time comparison, so stale-completion checks do not leak
/// how much of a card token matched.
impl PartialEq for CardId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for CardId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// PIN entered on the keypad.
///
/// # Security
///
/// `Debug` and `Display` never print the digits, so a PIN can flow through
/// `tracing` fields without ending up in logs. Only [`Pin::expose`] and
/// serialization (for the backend request body) reveal the value.
#[derive(Clone, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pin(String);

impl Pin {
    /// Wrap the digits of a completed PIN entry.
    pub fn new(pin: impl Into<String>) -> Self {
        Pin(pin.into())
    }

    /// Number of characters entered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    /// Returns `true` if nothing was entered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reveal the digits. Only the backend client should need this.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Masked form used in logs (`******`).
    #[must_use]
    pub fn masked(&self) -> String {
        "*".repeat(self.len())
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pin({})", self.masked())
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

impl PartialEq for Pin {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

/// Payment amount in the smallest currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Create a payment amount.
    ///
    /// # Errors
    /// Returns `Error::InvalidAmount` if the amount is zero.
    pub fn new(value: u64) -> Result<Self> {
        if value == 0 {
            return Err(Error::InvalidAmount(
                "Amount must be greater than zero".to_string(),
            ));
        }
        Ok(Amount(value))
    }

    /// Get the raw amount.
    #[inline]
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for Amount {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self> {
        Amount::new(value)
    }
}

/// Handle identifying one real-time subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generate a fresh random handle.
    #[must_use]
    pub fn new() -> Self {
        SubscriberId(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "sub_{}", self.0.simple())
    }
}

/// Envelope returned by the backend for verify and payment calls.
///
/// ```json
/// {"success": true, "data": {"cardId": "RF001234", "ownerName": "Budi", "balance": 10000}}
/// {"success": false, "message": "Insufficient balance"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse {
    /// Successful response carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    /// Failed response carrying a human readable `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// The `data` payload, or an empty object when absent.
    pub fn data_or_empty(&self) -> Value {
        self.data
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}
