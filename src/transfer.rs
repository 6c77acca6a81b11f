//! Direct stablecoin transfers.
//!
//! [`TransferTerms`] is the merchant side: which token, which chain, who gets paid.
//! [`TransferDetails`] is what a checkout receives and, after checking it against the
//! product price, turns into a wallet transaction.

use crate::errors::{CheckoutError, Result};
use crate::types::{TransactionRequest, TransferDetailsWire};
use crate::utils::{encode_transfer_call_hex, parse_address, scale_price, string_to_u256};
use ethers::types::{Address, U256};
use ethers::utils::to_checksum;

/// PYUSD on Ethereum Sepolia.
pub const PYUSD_SEPOLIA: &str = "0xCaC524BcA292aaade2DF8A05cC58F0a65B1B3bB9";

/// Sepolia chain id.
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Validated call parameters for one token transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDetails {
    /// Token contract
    pub contract_address: Address,
    /// Payee
    pub recipient_address: Address,
    /// Amount in the token's smallest unit
    pub amount: U256,
    /// Token decimals
    pub decimals: u8,
    /// Token symbol
    pub symbol: String,
    /// Chain the token lives on
    pub chain_id: u64,
}

impl TryFrom<TransferDetailsWire> for TransferDetails {
    type Error = CheckoutError;

    fn try_from(wire: TransferDetailsWire) -> Result<Self> {
        Ok(Self {
            contract_address: parse_address(&wire.contract_address)?,
            recipient_address: parse_address(&wire.recipient_address)?,
            amount: string_to_u256(&wire.amount)?,
            decimals: wire.decimals,
            symbol: wire.symbol,
            chain_id: wire.chain_id,
        })
    }
}

impl TransferDetails {
    /// Checks `amount == floor(price * 10^decimals)`.
    pub fn verify_price(&self, price: &str) -> Result<()> {
        let expected = scale_price(price, self.decimals)?;
        if expected != self.amount {
            return Err(CheckoutError::TransferPreparationError(format!(
                "amount {} does not match price {} at {} decimals (expected {})",
                self.amount, price, self.decimals, expected
            )));
        }
        Ok(())
    }

    /// Hex call data for `transfer(recipient, amount)`.
    pub fn call_data(&self) -> String {
        encode_transfer_call_hex(self.recipient_address, self.amount)
    }

    /// Transaction the wallet should sign: a call to the token contract from `from`.
    pub fn transaction(&self, from: Address) -> TransactionRequest {
        TransactionRequest {
            from: to_checksum(&from, None),
            to: to_checksum(&self.contract_address, None),
            data: self.call_data(),
        }
    }

    /// Wire form, with checksummed addresses and a decimal amount.
    pub fn to_wire(&self) -> TransferDetailsWire {
        TransferDetailsWire {
            contract_address: to_checksum(&self.contract_address, None),
            recipient_address: to_checksum(&self.recipient_address, None),
            amount: self.amount.to_string(),
            decimals: self.decimals,
            symbol: self.symbol.clone(),
            chain_id: self.chain_id,
        }
    }
}

/// What a merchant accepts for direct transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTerms {
    /// Token contract
    pub token: Address,
    /// Token decimals
    pub decimals: u8,
    /// Token symbol
    pub symbol: String,
    /// Chain the token lives on
    pub chain_id: u64,
    /// Merchant wallet used when the request names no recipient
    pub default_recipient: Option<Address>,
}

impl TransferTerms {
    /// PYUSD (6 decimals) on Sepolia.
    ///
    /// # Examples
    ///
    /// ```
    /// use guarded_checkout::transfer::TransferTerms;
    ///
    /// let terms = TransferTerms::pyusd_sepolia(None).unwrap();
    /// assert_eq!(terms.decimals, 6);
    /// assert_eq!(terms.symbol, "PYUSD");
    /// ```
    pub fn pyusd_sepolia(recipient: Option<&str>) -> Result<Self> {
        Ok(Self {
            token: parse_address(PYUSD_SEPOLIA)?,
            decimals: 6,
            symbol: "PYUSD".to_string(),
            chain_id: SEPOLIA_CHAIN_ID,
            default_recipient: recipient.map(parse_address).transpose()?,
        })
    }

    /// Computes the transfer for `price`.
    ///
    /// The request's recipient wins over the configured one; having neither is a
    /// configuration error.
    ///
    /// # Examples
    ///
    /// ```
    /// use guarded_checkout::transfer::TransferTerms;
    ///
    /// let terms = TransferTerms::pyusd_sepolia(Some("0xb43c9f0f2bb65a37761e7867a6f1903799f45d65")).unwrap();
    /// let details = terms.prepare("10.00", None).unwrap();
    /// assert_eq!(details.amount, 10_000_000u64.into());
    /// ```
    pub fn prepare(&self, price: &str, recipient: Option<&str>) -> Result<TransferDetails> {
        let recipient_address = match recipient.filter(|r| !r.trim().is_empty()) {
            Some(recipient) => parse_address(recipient)?,
            None => self.default_recipient.ok_or_else(|| {
                CheckoutError::ConfigError("Merchant wallet address not configured".to_string())
            })?,
        };

        Ok(TransferDetails {
            contract_address: self.token,
            recipient_address,
            amount: scale_price(price, self.decimals)?,
            decimals: self.decimals,
            symbol: self.symbol.clone(),
            chain_id: self.chain_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MERCHANT: &str = "0xb43c9f0f2bb65a37761e7867a6f1903799f45d65";
    const SHOPPER: &str = "0x742d35cc6634c0532925a3b844bc9e7595f0beb0";

    fn terms() -> TransferTerms {
        TransferTerms::pyusd_sepolia(Some(MERCHANT)).unwrap()
    }

    #[test]
    fn test_prepare_scales_price() {
        let details = terms().prepare("10.00", None).unwrap();
        assert_eq!(details.amount, U256::from(10_000_000u64));
        assert_eq!(details.recipient_address, parse_address(MERCHANT).unwrap());
        assert_eq!(details.chain_id, SEPOLIA_CHAIN_ID);
    }

    #[test]
    fn test_request_recipient_overrides_default() {
        let details = terms().prepare("0.01", Some(SHOPPER)).unwrap();
        assert_eq!(details.recipient_address, parse_address(SHOPPER).unwrap());
        assert_eq!(details.amount, U256::from(10_000u64));
    }

    #[test]
    fn test_missing_recipient_is_config_error() {
        let terms = TransferTerms::pyusd_sepolia(None).unwrap();
        let err = terms.prepare("1", None).unwrap_err();
        assert!(matches!(err, CheckoutError::ConfigError(_)));
    }

    #[test]
    fn test_verify_price() {
        let details = terms().prepare("10.00", None).unwrap();
        assert!(details.verify_price("10").is_ok());
        assert!(details.verify_price("10.000001").is_err());
    }

    #[test]
    fn test_wire_round_trip_keeps_amount_exact() {
        let details = terms().prepare("1234.567891", None).unwrap();
        let wire = details.to_wire();
        assert_eq!(wire.amount, "1234567891");
        assert_eq!(TransferDetails::try_from(wire).unwrap(), details);
    }

    #[test]
    fn test_transaction_targets_token() {
        let details = terms().prepare("10.00", None).unwrap();
        let tx = details.transaction(parse_address(SHOPPER).unwrap());
        assert_eq!(tx.to.to_lowercase(), PYUSD_SEPOLIA.to_lowercase());
        assert!(tx.data.starts_with("0xa9059cbb"));
        assert_eq!(tx.data.len(), 138);
    }
}
