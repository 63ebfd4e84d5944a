use base64::DecodeError;
use reqwest::Error as HttpError;
use std::io::Error as IoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("base64 decode: {0}")]
    Base64Decode(#[from] DecodeError),

    #[error("failed to get Base64 type from utf8: {0}")]
    FromUtf8(#[from] std::string::FromUtf8Error),

    #[error("hashing failed")]
    InvalidHash,

    #[error("invalid proof")]
    InvalidProof,

    #[error("invalid winston amount: {0}")]
    InvalidWinstonAmount(#[from] std::num::ParseIntError),

    #[error("invalid amount string: {0}")]
    InvalidAmountString(String),

    #[error("io error: {0}")]
    IOError(#[from] IoError),

    #[error("no root node found")]
    NoRootNodeFound,

    #[error("openssl error: {0}")]
    OpenSSLError(#[from] openssl::error::ErrorStack),

    #[error("reqwest: {0}")]
    Reqwest(#[from] HttpError),

    #[error("serde json: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("transaction is not signed")]
    UnsignedTransaction,

    // --- upload-engine error kinds ---
    #[error("transport failure talking to the network: {0}")]
    Transport(String),

    #[error("server rejected the request: status {status}, body {body}")]
    ServerRejected { status: u16, body: String },

    #[error("header POST rejected: status {status}, body {body}")]
    HeaderRejected { status: u16, body: String },

    #[error("fatal chunk upload error: {code}")]
    FatalChunkError { code: String },

    #[error("100 consecutive non-fatal failures uploading chunk {chunk_index}")]
    TooManyErrors { chunk_index: u32 },

    #[error("quantity > 0 requires a non-empty target")]
    InvalidTarget,

    #[error("transaction has already been signed")]
    Sealed,

    #[error("upload is already complete")]
    AlreadyComplete,

    #[error("transaction has no attached payload source")]
    NoPayloadSource,
}

pub type Result<T> = std::result::Result<T, Error>;
