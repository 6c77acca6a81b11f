//! Utility functions for checkout operations.
//!
//! Address and amount parsing, exact price scaling, and the ERC-20 `transfer` call
//! encoding handed to the wallet.

use crate::errors::{CheckoutError, Result};
use ethers::abi::Token;
use ethers::types::{Address, U256};
use sha3::{Digest, Keccak256};
use std::str::FromStr;
use url::Url;

/// Canonical signature of the ERC-20 transfer function.
pub const TRANSFER_SIGNATURE: &str = "transfer(address,uint256)";

/// First four bytes of `keccak256("transfer(address,uint256)")`.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Converts a string representation of a uint256 to ethers U256.
///
/// # Arguments
///
/// * `s` - String representation of the number (can be decimal or hex with 0x prefix)
///
/// # Examples
///
/// ```
/// use guarded_checkout::utils::string_to_u256;
///
/// let value = string_to_u256("1000000").unwrap();
/// assert_eq!(value, 1000000u64.into());
///
/// let hex_value = string_to_u256("0x0f4240").unwrap();
/// assert_eq!(hex_value, 1000000u64.into());
/// ```
pub fn string_to_u256(s: &str) -> Result<U256> {
    if let Ok(value) = U256::from_dec_str(s) {
        return Ok(value);
    }

    if s.starts_with("0x") || s.starts_with("0X") {
        if let Ok(value) = U256::from_str(s) {
            return Ok(value);
        }
    }

    Err(CheckoutError::InvalidAmount(format!(
        "Cannot parse '{}' as U256",
        s
    )))
}

/// Validates and parses an Ethereum address.
///
/// # Examples
///
/// ```
/// use guarded_checkout::utils::parse_address;
///
/// assert!(parse_address("0xb43c9f0f2bb65a37761e7867a6f1903799f45d65").is_ok());
/// assert!(parse_address("not-an-address").is_err());
/// ```
pub fn parse_address(addr: &str) -> Result<Address> {
    Address::from_str(addr).map_err(|e| CheckoutError::InvalidAddress(format!("{}: {}", addr, e)))
}

/// Scales a decimal price string into the token's smallest unit.
///
/// Computes `floor(price * 10^decimals)` exactly, without going through floating
/// point. Fraction digits beyond `decimals` are dropped.
///
/// # Examples
///
/// ```
/// use guarded_checkout::utils::scale_price;
///
/// assert_eq!(scale_price("10.00", 6).unwrap(), 10_000_000u64.into());
/// assert_eq!(scale_price("0.01", 6).unwrap(), 10_000u64.into());
/// assert_eq!(scale_price("1.2345678", 6).unwrap(), 1_234_567u64.into());
/// ```
pub fn scale_price(price: &str, decimals: u8) -> Result<U256> {
    let trimmed = price.trim();
    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(CheckoutError::InvalidAmount(format!(
            "Cannot parse '{}' as a decimal price",
            price
        )));
    }

    let decimals = usize::from(decimals);
    let kept = &fraction[..fraction.len().min(decimals)];

    let mut digits = String::with_capacity(whole.len() + decimals);
    digits.push_str(whole);
    digits.push_str(kept);
    digits.extend(std::iter::repeat('0').take(decimals - kept.len()));
    if digits.is_empty() {
        digits.push('0');
    }

    U256::from_dec_str(&digits)
        .map_err(|e| CheckoutError::InvalidAmount(format!("{}: {}", price, e)))
}

/// Computes the 4-byte selector of a canonical function signature.
///
/// # Examples
///
/// ```
/// use guarded_checkout::utils::{function_selector, TRANSFER_SELECTOR, TRANSFER_SIGNATURE};
///
/// assert_eq!(function_selector(TRANSFER_SIGNATURE), TRANSFER_SELECTOR);
/// ```
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

/// Builds the call data for `transfer(recipient, amount)`.
///
/// Layout: selector (4 bytes) ‖ recipient left-padded to 32 bytes ‖ amount as a
/// 32-byte big-endian word.
pub fn encode_transfer_call(recipient: Address, amount: U256) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend(ethers::abi::encode(&[
        Token::Address(recipient),
        Token::Uint(amount),
    ]));
    data
}

/// Hex form of [`encode_transfer_call`], `0x`-prefixed, as wallets expect it.
///
/// # Examples
///
/// ```
/// use guarded_checkout::utils::{encode_transfer_call_hex, parse_address};
///
/// let to = parse_address("0xb43c9f0f2bb65a37761e7867a6f1903799f45d65").unwrap();
/// let data = encode_transfer_call_hex(to, 10_000_000u64.into());
/// assert!(data.starts_with("0xa9059cbb"));
/// assert_eq!(data.len(), 2 + 8 + 64 + 64);
/// ```
pub fn encode_transfer_call_hex(recipient: Address, amount: U256) -> String {
    format!("0x{}", hex::encode(encode_transfer_call(recipient, amount)))
}

/// Formats a chain id as a JSON-RPC hex quantity.
///
/// # Examples
///
/// ```
/// use guarded_checkout::utils::chain_id_hex;
///
/// assert_eq!(chain_id_hex(11155111), "0xaa36a7");
/// ```
pub fn chain_id_hex(chain_id: u64) -> String {
    format!("{:#x}", chain_id)
}

/// Parses an API root so that relative endpoints land under its full path.
///
/// # Examples
///
/// ```
/// use guarded_checkout::utils::base_url;
///
/// let base = base_url("https://api.example/v1").unwrap();
/// assert_eq!(base.join("charges").unwrap().as_str(), "https://api.example/v1/charges");
/// ```
pub fn base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Appends `segments` to `base`, each percent-encoded as a single path segment.
pub fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| CheckoutError::ConfigError(format!("{} cannot carry a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPIENT: &str = "0xb43c9f0f2bb65a37761e7867a6f1903799f45d65";

    #[test]
    fn test_string_to_u256() {
        assert_eq!(string_to_u256("1000000").unwrap(), U256::from(1000000u64));
        assert_eq!(string_to_u256("0").unwrap(), U256::zero());
        assert_eq!(string_to_u256("0x0f4240").unwrap(), U256::from(1000000u64));
        assert!(string_to_u256("ten").is_err());
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address(RECIPIENT).unwrap();
        let bare = parse_address(RECIPIENT.trim_start_matches("0x")).unwrap();
        assert_eq!(addr, bare);
        assert!(parse_address("invalid").is_err());
    }

    #[test]
    fn test_scale_price_floors() {
        assert_eq!(scale_price("10.00", 6).unwrap(), U256::from(10_000_000u64));
        assert_eq!(scale_price("10", 6).unwrap(), U256::from(10_000_000u64));
        assert_eq!(scale_price("0.0000019", 6).unwrap(), U256::from(1u64));
        assert_eq!(scale_price(".5", 2).unwrap(), U256::from(50u64));
        assert_eq!(scale_price("0.01", 18).unwrap(), U256::from(10_000_000_000_000_000u64));
        assert_eq!(scale_price("7.99", 0).unwrap(), U256::from(7u64));
    }

    #[test]
    fn test_scale_price_rejects_garbage() {
        for bad in ["", ".", "-1", "1.2.3", "1e6", "ten", "1,00"] {
            assert!(scale_price(bad, 6).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_transfer_selector_matches_keccak() {
        assert_eq!(function_selector(TRANSFER_SIGNATURE), TRANSFER_SELECTOR);
        assert_eq!(hex::encode(TRANSFER_SELECTOR), "a9059cbb");
    }

    #[test]
    fn test_transfer_call_layout() {
        let to = parse_address(RECIPIENT).unwrap();
        let data = encode_transfer_call_hex(to, U256::from(10_000_000u64));
        let body = data.trim_start_matches("0x");

        assert_eq!(&body[..8], "a9059cbb");
        let recipient_word = &body[8..72];
        let amount_word = &body[72..];
        assert_eq!(recipient_word.len(), 64);
        assert_eq!(amount_word.len(), 64);
        assert_eq!(
            recipient_word,
            format!("{:0>64}", RECIPIENT.trim_start_matches("0x"))
        );
        assert_eq!(amount_word, format!("{:0>64}", "989680"));
    }

    #[test]
    fn test_chain_id_hex() {
        assert_eq!(chain_id_hex(1), "0x1");
        assert_eq!(chain_id_hex(11_155_111), "0xaa36a7");
    }

    #[test]
    fn test_base_url_keeps_path() {
        let base = base_url("https://api.example/v1").unwrap();
        assert_eq!(base.path(), "/v1/");
        assert_eq!(base_url("https://api.example/v1/").unwrap(), base);
        assert!(base_url("not a url").is_err());
    }

    #[test]
    fn test_endpoint_url_escapes_ids() {
        let base = base_url("https://api.example/v1").unwrap();
        let url = endpoint_url(&base, &["charges", "ABC123"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example/v1/charges/ABC123");

        let url = endpoint_url(&base, &["charges", "../admin?x#y"]).unwrap();
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(&segments[..2], &["v1", "charges"]);
        assert!(segments[2].contains("%2F"));
    }
}
