//! Conversions between winston (the network's indivisible base unit) and its
//! display unit, plus wallet address derivation from a raw owner modulus.
//!
//! Grounded on `winston_to_ar`/`ar_to_winston`/`owner_to_address` in
//! `arweave/utils.py`; done here with string/integer arithmetic rather than
//! the original's float formatting, since a float round-trip through 10^12
//! can lose precision an amount of currency shouldn't.

use crate::codec::b64_encode;
use crate::error::{Error, Result};
use openssl::sha;

const WINSTON_DECIMALS: usize = 12;

/// Converts a winston decimal string to its AR display-unit decimal string,
/// by placing a decimal point 12 digits from the right and zero-padding on
/// the left if the input is shorter than that.
pub fn winston_to_ar(winston: &str) -> Result<String> {
    if winston.is_empty() || !winston.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidAmountString(winston.to_string()));
    }
    if winston.len() > WINSTON_DECIMALS {
        let split = winston.len() - WINSTON_DECIMALS;
        Ok(format!("{}.{}", &winston[..split], &winston[split..]))
    } else {
        let padding = WINSTON_DECIMALS - winston.len();
        Ok(format!("0.{}{}", "0".repeat(padding), winston))
    }
}

/// Converts an AR display-unit decimal string to its winston integer string
/// (`ar * 10^12`).
pub fn ar_to_winston(ar: &str) -> Result<String> {
    let (int_part, frac_part) = match ar.split_once('.') {
        Some((i, f)) => (i, f),
        None => (ar, ""),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidAmountString(ar.to_string()));
    }
    if frac_part.len() > WINSTON_DECIMALS || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidAmountString(ar.to_string()));
    }
    let padded_frac = format!("{frac_part:0<width$}", width = WINSTON_DECIMALS);
    let winston = format!("{int_part}{padded_frac}");
    let trimmed = winston.trim_start_matches('0');
    Ok(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
}

/// `address = b64url(sha256(raw_owner_modulus))`.
pub fn owner_to_address(raw_owner: &[u8]) -> String {
    b64_encode(&sha::sha256(raw_owner))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winston_to_ar_typical() {
        assert_eq!(winston_to_ar("1000000000000").unwrap(), "1.000000000000");
    }

    #[test]
    fn test_winston_to_ar_pads_short_values() {
        assert_eq!(winston_to_ar("5").unwrap(), "0.000000000005");
    }

    #[test]
    fn test_ar_to_winston_roundtrip() {
        let winston = ar_to_winston("1.5").unwrap();
        assert_eq!(winston, "1500000000000");
        assert_eq!(winston_to_ar(&winston).unwrap(), "1.500000000000");
    }

    #[test]
    fn test_ar_to_winston_integer_only() {
        assert_eq!(ar_to_winston("2").unwrap(), "2000000000000");
    }

    #[test]
    fn test_owner_to_address_matches_sha256() {
        let owner = b"some-modulus-bytes";
        let addr = owner_to_address(owner);
        assert_eq!(addr, b64_encode(&sha::sha256(owner)));
    }

    #[test]
    fn test_non_numeric_amounts_rejected() {
        assert!(matches!(winston_to_ar("12a"), Err(Error::InvalidAmountString(_))));
        assert!(matches!(ar_to_winston("1.2.3"), Err(Error::InvalidAmountString(_))));
        assert!(matches!(ar_to_winston(""), Err(Error::InvalidAmountString(_))));
    }
}
