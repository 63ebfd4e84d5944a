//! Assembles format-2 transaction fields, drives the chunker/Merkle/deep-hash/
//! signer pipeline, and serializes the frozen result to wire JSON.
//!
//! Grounded on `race-storage::transaction::Transaction`, generalized from a
//! data-only transaction onto the full options table (inline data, a
//! streamed file source, token transfer, reward override, and a
//! populate-from-network fetch mode).

use crate::chunker::{self, Chunk, PayloadSource};
use crate::codec::{b64_decode, b64_encode};
use crate::deep_hash::{deep_hash, DeepHashItem};
use crate::error::{Error, Result};
use crate::merkle::{self, Node};
use crate::network::NetworkAdapter;
use crate::signer::Wallet;
use crate::units::ar_to_winston;
use openssl::sha;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::debug;

/// A `{name, value}` pair carried on a transaction. Both fields are
/// base64url-encoded on the wire; the signer consumes the raw bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tag {
    #[serde(with = "crate::codec::base64_serde")]
    pub name: Vec<u8>,
    #[serde(with = "crate::codec::base64_serde")]
    pub value: Vec<u8>,
}

impl Tag {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Tag {
        Tag { name: name.into(), value: value.into() }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "name: {}, value: {}", b64_encode(&self.name), b64_encode(&self.value))
    }
}

/// The payload a transaction is constructed over: either data already
/// resident in memory, or a seekable stream of known size the uploader will
/// read chunks from on demand.
pub enum Payload {
    Data(Vec<u8>),
    File { source: PayloadSource, size: u64 },
}

/// The config object transaction construction accepts. Unknown combinations
/// (e.g. `quantity > 0` with no `target`) are rejected rather than silently
/// ignored.
pub struct ConstructionOptions {
    pub payload: Payload,
    /// Recipient address (URL-safe base64), or `None` for a data-only
    /// transaction.
    pub target: Option<String>,
    /// Decimal AR string; `None` means "0".
    pub quantity: Option<String>,
    /// Winston string overriding the fetched price, if set.
    pub reward: Option<String>,
}

/// A format-2 transaction under construction, or frozen after [`Transaction::sign`].
pub struct Transaction {
    pub format: u8,
    pub id: Vec<u8>,
    pub last_tx: Vec<u8>,
    pub owner: Vec<u8>,
    pub tags: Vec<Tag>,
    pub target: Vec<u8>,
    pub quantity: String,
    pub data_root: Vec<u8>,
    pub data_size: u64,
    pub reward: String,
    pub signature: Vec<u8>,

    payload: Option<PayloadSource>,
    pub(crate) chunks: Vec<Chunk>,
    root: Option<Node>,
    pub(crate) proofs: Vec<merkle::Proof>,
    signed: bool,
}

impl Transaction {
    /// Builds a transaction from a wallet and the options table: chunks and
    /// merklizes the payload immediately so `data_root` is available before
    /// signing.
    pub fn new(wallet: &Wallet, options: ConstructionOptions) -> Result<Self> {
        let (mut source, data_size): (PayloadSource, u64) = match options.payload {
            Payload::Data(bytes) => {
                let size = bytes.len() as u64;
                (Box::new(Cursor::new(bytes)), size)
            }
            Payload::File { source, size } => (source, size),
        };

        let chunks = chunker::chunk_stream(source.as_mut(), data_size)?;
        let leaves = merkle::build_leaves(&chunks);
        let (root, data_root) = if leaves.is_empty() {
            (None, Vec::new())
        } else {
            let root = merkle::generate_root(leaves)?;
            let data_root = root.id().to_vec();
            (Some(root), data_root)
        };

        let target = match options.target {
            Some(addr) => b64_decode(&addr)?,
            None => Vec::new(),
        };
        let quantity = match options.quantity {
            Some(ar) => ar_to_winston(&ar)?,
            None => "0".to_string(),
        };
        if quantity != "0" && target.is_empty() {
            return Err(Error::InvalidTarget);
        }

        Ok(Transaction {
            format: 2,
            id: Vec::new(),
            last_tx: Vec::new(),
            owner: wallet.modulus().to_vec(),
            tags: Vec::new(),
            target,
            quantity,
            data_root,
            data_size,
            reward: options.reward.unwrap_or_default(),
            signature: Vec::new(),
            payload: Some(source),
            chunks,
            root,
            proofs: Vec::new(),
            signed: false,
        })
    }

    /// Fetches a previously-submitted transaction's wire JSON directly,
    /// skipping construction and signing entirely. The returned transaction
    /// has no payload source attached — it exists to inspect already-signed
    /// fields, not to be re-uploaded.
    pub async fn fetch(adapter: &dyn NetworkAdapter, id: &str) -> Result<Transaction> {
        let wire: WireTransaction = serde_json::from_value(adapter.get_tx(id).await?)?;
        Ok(Transaction {
            format: wire.format,
            id: wire.id,
            last_tx: wire.last_tx,
            owner: wire.owner,
            tags: wire.tags,
            target: wire.target,
            quantity: wire.quantity,
            data_root: wire.data_root,
            data_size: wire.data_size.parse().unwrap_or(0),
            reward: wire.reward,
            signature: wire.signature,
            payload: None,
            chunks: Vec::new(),
            root: None,
            proofs: Vec::new(),
            signed: true,
        })
    }

    /// The chunk count the upload engine must transmit.
    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn proofs(&self) -> &[merkle::Proof] {
        &self.proofs
    }

    pub fn payload_mut(&mut self) -> Option<&mut PayloadSource> {
        self.payload.as_mut()
    }

    /// Hands ownership of the payload source to the caller — the upload
    /// engine takes it so it alone seeks and reads the stream.
    pub fn take_payload(&mut self) -> Option<PayloadSource> {
        self.payload.take()
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn data_root(&self) -> &[u8] {
        &self.data_root
    }

    /// Reconstructs a signed transaction from its saved wire JSON plus a
    /// freshly-opened payload source, re-deriving chunks and proofs from the
    /// stream rather than persisting them — the upload engine's resume path.
    pub fn from_resumed(wire: Value, mut payload: PayloadSource) -> Result<Transaction> {
        let w: WireTransaction = serde_json::from_value(wire)?;
        let data_size: u64 = w.data_size.parse().map_err(Error::InvalidWinstonAmount)?;
        let chunks = chunker::chunk_stream(payload.as_mut(), data_size)?;
        let leaves = merkle::build_leaves(&chunks);
        let (root, proofs) = if leaves.is_empty() {
            (None, Vec::new())
        } else {
            let root = merkle::generate_root(leaves)?;
            let proofs = merkle::resolve_proofs(&root, &[]);
            (Some(root), proofs)
        };
        Ok(Transaction {
            format: w.format,
            id: w.id,
            last_tx: w.last_tx,
            owner: w.owner,
            tags: w.tags,
            target: w.target,
            quantity: w.quantity,
            data_root: w.data_root,
            data_size,
            reward: w.reward,
            signature: w.signature,
            payload: Some(payload),
            chunks,
            root,
            proofs,
            signed: true,
        })
    }

    /// Appends a tag. Fails once the transaction has been signed.
    pub fn add_tag(&mut self, name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<()> {
        if self.signed {
            return Err(Error::Sealed);
        }
        self.tags.push(Tag::new(name.into(), value.into()));
        Ok(())
    }

    fn deephash_item(&self) -> DeepHashItem {
        let tag_list = self
            .tags
            .iter()
            .map(|t| DeepHashItem::list(vec![DeepHashItem::blob(t.name.clone()), DeepHashItem::blob(t.value.clone())]))
            .collect();

        DeepHashItem::list(vec![
            DeepHashItem::blob(b"2".to_vec()),
            DeepHashItem::blob(self.owner.clone()),
            DeepHashItem::blob(self.target.clone()),
            DeepHashItem::blob(self.quantity.as_bytes().to_vec()),
            DeepHashItem::blob(self.reward.as_bytes().to_vec()),
            DeepHashItem::blob(self.last_tx.clone()),
            DeepHashItem::list(tag_list),
            DeepHashItem::blob(self.data_size.to_string().into_bytes()),
            DeepHashItem::blob(self.data_root.clone()),
        ])
    }

    /// Fetches anchor/price as needed, computes the deep-hash pre-image,
    /// signs it, and derives `id`. Idempotent once signed: a second call is
    /// a no-op so callers don't need to track whether they've already
    /// signed.
    pub async fn sign(&mut self, wallet: &Wallet, adapter: &dyn NetworkAdapter) -> Result<()> {
        if self.signed {
            return Ok(());
        }

        let anchor = adapter.get_anchor().await?;
        self.last_tx = b64_decode(&anchor)?;

        if self.reward.is_empty() {
            let target = if self.target.is_empty() { None } else { Some(b64_encode(&self.target)) };
            self.reward = adapter.get_price(self.data_size, target.as_deref()).await?;
        }

        let pre_image = deep_hash(&self.deephash_item());
        let raw_signature = wallet.sign(&pre_image)?;
        self.id = sha::sha256(&raw_signature).to_vec();
        self.signature = raw_signature;

        if let Some(root) = &self.root {
            self.proofs = merkle::resolve_proofs(root, &[]);
        }

        self.signed = true;
        debug!(id = %b64_encode(&self.id), total_chunks = self.chunks.len(), "transaction signed");
        Ok(())
    }

    /// Serializes the frozen transaction to wire JSON. When the payload fits
    /// in a single chunk, `data` carries the full bytes inline; otherwise it
    /// is empty and the body travels through the upload engine instead.
    pub fn to_wire(&mut self) -> Result<Value> {
        if !self.signed {
            return Err(Error::UnsignedTransaction);
        }

        let data = if self.chunks.len() <= 1 {
            match &mut self.payload {
                Some(source) => {
                    let mut buf = vec![0u8; self.data_size as usize];
                    source.seek(SeekFrom::Start(0))?;
                    source.read_exact(&mut buf)?;
                    buf
                }
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        let wire = WireTransaction {
            format: self.format,
            id: self.id.clone(),
            last_tx: self.last_tx.clone(),
            owner: self.owner.clone(),
            tags: self.tags.clone(),
            target: self.target.clone(),
            quantity: self.quantity.clone(),
            data_root: self.data_root.clone(),
            data_size: self.data_size.to_string(),
            data,
            reward: self.reward.clone(),
            signature: self.signature.clone(),
            data_tree: Vec::new(),
        };
        Ok(serde_json::to_value(wire)?)
    }
}

/// The exact wire shape of a format-2 transaction (see §6 of the network's
/// HTTP API docs).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireTransaction {
    format: u8,
    #[serde(with = "crate::codec::base64_serde")]
    id: Vec<u8>,
    #[serde(with = "crate::codec::base64_serde")]
    last_tx: Vec<u8>,
    #[serde(with = "crate::codec::base64_serde")]
    owner: Vec<u8>,
    tags: Vec<Tag>,
    #[serde(with = "crate::codec::base64_serde")]
    target: Vec<u8>,
    quantity: String,
    #[serde(with = "crate::codec::base64_serde")]
    data_root: Vec<u8>,
    data_size: String,
    #[serde(with = "crate::codec::base64_serde")]
    data: Vec<u8>,
    reward: String,
    #[serde(with = "crate::codec::base64_serde")]
    signature: Vec<u8>,
    data_tree: Vec<String>,
}
