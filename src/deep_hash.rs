//! Canonical tagged SHA-384 hash over an arbitrarily nested list of byte
//! strings — the only pre-image the transaction signature covers.
//!
//! A literal port of `arweave-js`'s `deepHash`, the same source
//! `race-storage::crypto::deep_hash` was ported from; kept as its own module
//! here since it is independently testable and does not need the RSA signer
//! in scope to exercise.

use openssl::sha;

/// Recursive value fed into [`deep_hash`]: either a raw byte string or an
/// ordered list of such values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepHashItem {
    Blob(Vec<u8>),
    List(Vec<DeepHashItem>),
}

impl DeepHashItem {
    pub fn blob(item: impl Into<Vec<u8>>) -> DeepHashItem {
        Self::Blob(item.into())
    }

    pub fn list(items: Vec<DeepHashItem>) -> DeepHashItem {
        Self::List(items)
    }
}

fn sha384_all(parts: &[&[u8]]) -> [u8; 48] {
    let mut hasher = sha::Sha384::new();
    for p in parts {
        hasher.update(p);
    }
    hasher.finish()
}

/// `deep_hash(b) = sha384( sha384("blob" ‖ decimal(len(b))) ‖ sha384(b) )`
/// `deep_hash(l) = fold(sha384("list" ‖ decimal(len(l))), |acc, e| sha384(acc ‖ deep_hash(e)))`
pub fn deep_hash(item: &DeepHashItem) -> [u8; 48] {
    match item {
        DeepHashItem::Blob(blob) => {
            let tag = format!("blob{}", blob.len());
            sha384_all(&[&sha::sha384(tag.as_bytes()), &sha::sha384(blob)])
        }
        DeepHashItem::List(list) => {
            let tag = format!("list{}", list.len());
            let mut acc = sha::sha384(tag.as_bytes());
            for child in list {
                let child_hash = deep_hash(child);
                acc = sha384_all(&[&acc, &child_hash]);
            }
            acc
        }
    }
}
