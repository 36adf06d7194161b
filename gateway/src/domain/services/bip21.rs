//! BIP21 payment URI construction.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

/// Render satoshis as BTC with exactly eight decimal places.
pub fn format_amount_btc(sats: i64) -> String {
    format!("{}.{:08}", sats / 100_000_000, sats % 100_000_000)
}

/// Build a `bitcoin:` URI for an address and amount, with optional
/// percent-encoded label and message parameters.
pub fn build_uri(
    address: &str,
    amount_sats: i64,
    label: Option<&str>,
    message: Option<&str>,
) -> String {
    let mut uri = format!(
        "bitcoin:{}?amount={}",
        address,
        format_amount_btc(amount_sats)
    );
    if let Some(label) = label {
        uri.push_str("&label=");
        uri.push_str(&utf8_percent_encode(label, NON_ALPHANUMERIC).to_string());
    }
    if let Some(message) = message {
        uri.push_str("&message=");
        uri.push_str(&utf8_percent_encode(message, NON_ALPHANUMERIC).to_string());
    }
    uri
}
