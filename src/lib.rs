pub mod chunker;
pub mod codec;
pub mod deep_hash;
pub mod error;
pub mod merkle;
pub mod network;
pub mod signer;
pub mod transaction;
pub mod units;
pub mod uploader;

pub use error::{Error, Result};
pub use network::{ClientConfig, NetworkAdapter, ReqwestAdapter};
pub use signer::Wallet;
pub use transaction::{ConstructionOptions, Payload, Tag, Transaction};
pub use uploader::{StepOutcome, UploadEngine, UploadState};
