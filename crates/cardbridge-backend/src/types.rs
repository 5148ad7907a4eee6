//! Request bodies and typed views of backend payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cardbridge_core::{Amount, ApiResponse, CardId, Pin};

/// Body of `POST {base}/rfid/verify`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest<'a> {
    pub card_id: &'a CardId,
    pub pin: &'a Pin,
}

/// Body of `POST {base}/rfid/payment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub card_id: CardId,
    pub pin: Pin,
    pub amount: Amount,
    pub description: String,
}

/// Card details returned by a successful verification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInfo {
    pub card_id: CardId,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub balance: Option<i64>,
}

/// Transaction details returned by a successful payment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    #[serde(default, alias = "id")]
    pub transaction_id: Option<Value>,
    #[serde(default)]
    pub new_balance: Option<i64>,
}

impl CardInfo {
    /// Decode the `data` of a successful verify response.
    pub fn from_response(response: &ApiResponse) -> Option<Self> {
        decode_data(response)
    }
}

impl PaymentReceipt {
    /// Decode the `data` of a successful payment response.
    pub fn from_response(response: &ApiResponse) -> Option<Self> {
        decode_data(response)
    }
}

fn decode_data<T: for<'de> Deserialize<'de>>(response: &ApiResponse) -> Option<T> {
    if !response.success {
        return None;
    }
    response
        .data
        .clone()
        .and_then(|data| serde_json::from_value(data).ok())
}
