//! Resumable chunk-by-chunk upload state machine.
//!
//! No teacher module does this — `race-storage` only ever POSTs a whole
//! transaction body in one call. Grounded directly on
//! `arweave.transaction_uploader.TransactionUploader`/`SerializedUploader`:
//! the same field set (`chunk_index`, `tx_posted`, `last_request_time_end`,
//! `last_response_status`, `last_response_error`, `total_errors`), the same
//! `MAX_CHUNKS_IN_BODY = 1` inlining rule, and the same fixed-floor,
//! downward-jittered backoff.

use crate::chunker::{self, PayloadSource};
use crate::error::{Error, Result};
use crate::merkle;
use crate::network::NetworkAdapter;
use crate::transaction::Transaction;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const ERROR_DELAY_MS: i64 = 1000 * 40;
const MAX_CHUNKS_IN_BODY: usize = 1;

const FATAL_CHUNK_ERRORS: &[&str] = &[
    "invalid_json",
    "chunk_too_big",
    "data_path_too_big",
    "offset_too_big",
    "data_size_too_big",
    "chunk_proof_ratio_not_attractive",
    "invalid_proof",
];

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

fn to_hash_array(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes.try_into().map_err(|_| Error::InvalidHash)
}

/// Whether a single [`UploadEngine::upload_chunk`] call advanced the state
/// machine or was aborted early by a cancellation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced,
    Cancelled,
}

/// The engine's state, serializable so an interrupted upload can resume in a
/// later process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadState {
    pub chunk_index: u32,
    pub tx_posted: bool,
    pub last_req_end_ms: i64,
    pub last_resp_status: i32,
    pub last_resp_error: String,
    pub total_errors: u32,
    pub transaction: Value,
}

/// Drives a signed transaction's header and chunks to the network, one step
/// at a time, honoring fatal-error classification, backoff, and resumability.
pub struct UploadEngine {
    transaction: Transaction,
    payload: PayloadSource,
    chunk_index: u32,
    tx_posted: bool,
    last_req_end_ms: i64,
    last_resp_status: i32,
    last_resp_error: String,
    total_errors: u32,
    cancelled: Arc<AtomicBool>,
}

impl UploadEngine {
    /// Takes ownership of a signed transaction's payload source, ready to
    /// drive `upload_chunk()` from the beginning.
    pub fn new(mut transaction: Transaction) -> Result<Self> {
        if !transaction.is_signed() {
            return Err(Error::UnsignedTransaction);
        }
        let payload = transaction.take_payload().ok_or(Error::NoPayloadSource)?;
        Ok(Self {
            transaction,
            payload,
            chunk_index: 0,
            tx_posted: false,
            last_req_end_ms: 0,
            last_resp_status: 0,
            last_resp_error: String::new(),
            total_errors: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Reconstructs an engine from previously-saved state and a re-opened
    /// payload source, continuing from wherever it left off.
    pub fn resume(state: UploadState, payload: PayloadSource) -> Result<Self> {
        let transaction = Transaction::from_resumed(state.transaction, payload)?;
        let mut engine = Self::new(transaction)?;
        engine.chunk_index = state.chunk_index;
        engine.tx_posted = state.tx_posted;
        engine.last_req_end_ms = state.last_req_end_ms;
        engine.last_resp_status = state.last_resp_status;
        engine.last_resp_error = state.last_resp_error;
        engine.total_errors = state.total_errors;
        Ok(engine)
    }

    /// A handle the caller can flip to request cancellation before the next
    /// `upload_chunk()` step.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn save_state(&mut self) -> Result<UploadState> {
        Ok(UploadState {
            chunk_index: self.chunk_index,
            tx_posted: self.tx_posted,
            last_req_end_ms: self.last_req_end_ms,
            last_resp_status: self.last_resp_status,
            last_resp_error: self.last_resp_error.clone(),
            total_errors: self.total_errors,
            transaction: self.transaction.to_wire()?,
        })
    }

    pub fn total_chunks(&self) -> usize {
        self.transaction.total_chunks()
    }

    pub fn uploaded_chunks(&self) -> u32 {
        self.chunk_index
    }

    pub fn pct_complete(&self) -> u32 {
        let total = self.total_chunks();
        if total == 0 {
            return 100;
        }
        (100 * self.chunk_index as u64 / total as u64) as u32
    }

    pub fn is_complete(&self) -> bool {
        self.tx_posted && self.chunk_index as usize == self.total_chunks()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Advances the upload by one step: posts the header if needed, then
    /// uploads the current chunk. Returns [`StepOutcome::Cancelled`] without
    /// mutating any state if a cancellation was observed before work began.
    pub async fn upload_chunk(&mut self, adapter: &dyn NetworkAdapter) -> Result<StepOutcome> {
        if self.is_cancelled() {
            return Ok(StepOutcome::Cancelled);
        }
        if self.is_complete() {
            return Err(Error::AlreadyComplete);
        }

        if !self.last_resp_error.is_empty() {
            self.total_errors += 1;
        } else {
            self.total_errors = 0;
        }
        if self.total_errors == 100 {
            return Err(Error::TooManyErrors { chunk_index: self.chunk_index });
        }

        if !self.last_resp_error.is_empty() {
            let floor = ERROR_DELAY_MS;
            let delay = std::cmp::max((self.last_req_end_ms + floor) - now_ms(), floor);
            let jitter: f64 = rand::thread_rng().gen_range(0.0..0.3);
            let delay = (delay as f64 * (1.0 - jitter)) as u64;
            warn!(chunk_index = self.chunk_index, delay_ms = delay, error = %self.last_resp_error, "backing off before retry");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.is_cancelled() {
            return Ok(StepOutcome::Cancelled);
        }

        self.last_resp_error.clear();

        if !self.tx_posted {
            self.post_header(adapter).await?;
        }
        if self.is_complete() {
            return Ok(StepOutcome::Advanced);
        }

        let idx = self.chunk_index as usize;
        let chunk = self.transaction.chunks()[idx];
        let proof = self.transaction.proofs()[idx].clone();
        let bytes = chunker::read_chunk_bytes(&mut self.payload, &chunk)?;

        let root_id = to_hash_array(self.transaction.data_root())?;
        let validated =
            merkle::validate_path(root_id, proof.offset as i64, 0, self.transaction.data_size as i64, &proof.proof);
        if validated.is_none() {
            return Err(Error::InvalidProof);
        }

        let body = json!({
            "data_root": crate::codec::b64_encode(self.transaction.data_root()),
            "data_size": self.transaction.data_size.to_string(),
            "data_path": crate::codec::b64_encode(&proof.proof),
            "offset": proof.offset.to_string(),
            "chunk": crate::codec::b64_encode(&bytes),
        });

        match adapter.post_chunk(&body).await {
            Ok(resp) => {
                self.last_req_end_ms = now_ms();
                self.last_resp_status = resp.status as i32;
                if resp.is_success() {
                    self.chunk_index += 1;
                    debug!(chunk_index = self.chunk_index, total = self.total_chunks(), "chunk uploaded");
                    Ok(StepOutcome::Advanced)
                } else {
                    let code = resp.error_code();
                    self.last_resp_error = code.clone().unwrap_or_else(|| resp.body_str());
                    if let Some(code) = code.filter(|c| FATAL_CHUNK_ERRORS.contains(&c.as_str())) {
                        warn!(chunk_index = self.chunk_index, %code, "fatal chunk upload error");
                        Err(Error::FatalChunkError { code })
                    } else {
                        Err(Error::ServerRejected { status: resp.status, body: resp.body_str() })
                    }
                }
            }
            Err(e) => {
                self.last_req_end_ms = now_ms();
                self.last_resp_error = e.to_string();
                Err(e)
            }
        }
    }

    /// POSTs the transaction header. When the whole payload fits in a
    /// single chunk it is inlined and `chunk_index` jumps straight to
    /// `total_chunks` — no separate `/chunk` call follows.
    async fn post_header(&mut self, adapter: &dyn NetworkAdapter) -> Result<()> {
        let inline = self.total_chunks() <= MAX_CHUNKS_IN_BODY;
        let mut wire = self.transaction.to_wire()?;
        if inline {
            if let Some(chunk) = self.transaction.chunks().first() {
                let bytes = chunker::read_chunk_bytes(&mut self.payload, chunk)?;
                wire["data"] = json!(crate::codec::b64_encode(&bytes));
            }
        }

        match adapter.post_tx(&wire).await {
            Ok(resp) => {
                self.last_req_end_ms = now_ms();
                self.last_resp_status = resp.status as i32;
                if resp.is_success() {
                    self.tx_posted = true;
                    if inline {
                        self.chunk_index = self.total_chunks() as u32;
                    }
                    Ok(())
                } else {
                    self.last_resp_error = resp.error_code().unwrap_or_else(|| resp.body_str());
                    Err(Error::HeaderRejected { status: resp.status, body: resp.body_str() })
                }
            }
            Err(e) => {
                self.last_req_end_ms = now_ms();
                self.last_resp_error = e.to_string();
                Err(e)
            }
        }
    }

    /// Drives `upload_chunk()` to completion, retrying `Transport`,
    /// `ServerRejected`, and `HeaderRejected` failures and propagating
    /// everything else.
    pub async fn run(&mut self, adapter: &dyn NetworkAdapter) -> Result<()> {
        while !self.is_complete() {
            match self.upload_chunk(adapter).await {
                Ok(StepOutcome::Advanced) => {}
                Ok(StepOutcome::Cancelled) => {
                    info!(chunk_index = self.chunk_index, "upload cancelled");
                    return Ok(());
                }
                Err(Error::Transport(_))
                | Err(Error::ServerRejected { .. })
                | Err(Error::HeaderRejected { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        info!(total = self.total_chunks(), "upload complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::HttpResponse;
    use crate::signer::Wallet;
    use crate::transaction::{ConstructionOptions, Payload};
    use async_trait::async_trait;
    use openssl::rsa::Rsa;
    use std::sync::Mutex;

    fn test_wallet() -> anyhow::Result<Wallet> {
        let rsa = Rsa::generate(2048)?;
        let b64 = crate::codec::b64_encode;
        let jwk_json = format!(
            r#"{{"kty":"RSA","ext":true,"n":"{}","e":"{}","d":"{}","p":"{}","q":"{}","dp":"{}","dq":"{}","qi":"{}"}}"#,
            b64(&rsa.n().to_vec()),
            b64(&rsa.e().to_vec()),
            b64(&rsa.d().to_vec()),
            b64(&rsa.p().unwrap().to_vec()),
            b64(&rsa.q().unwrap().to_vec()),
            b64(&rsa.dmp1().unwrap().to_vec()),
            b64(&rsa.dmq1().unwrap().to_vec()),
            b64(&rsa.iqmp().unwrap().to_vec()),
        );
        Ok(Wallet::from_jwk_json(&jwk_json)?)
    }

    struct ScriptedAdapter {
        tx_responses: Mutex<Vec<HttpResponse>>,
        chunk_responses: Mutex<Vec<HttpResponse>>,
        posted_tx: Mutex<Vec<Value>>,
        tx_calls: Mutex<u32>,
        chunk_calls: Mutex<u32>,
    }

    impl ScriptedAdapter {
        fn new() -> Self {
            ScriptedAdapter {
                tx_responses: Mutex::new(vec![]),
                chunk_responses: Mutex::new(vec![]),
                posted_tx: Mutex::new(vec![]),
                tx_calls: Mutex::new(0),
                chunk_calls: Mutex::new(0),
            }
        }

        fn with_chunk_responses(responses: Vec<HttpResponse>) -> Self {
            ScriptedAdapter { chunk_responses: Mutex::new(responses), ..Self::new() }
        }

        fn with_tx_responses(responses: Vec<HttpResponse>) -> Self {
            ScriptedAdapter { tx_responses: Mutex::new(responses), ..Self::new() }
        }
    }

    #[async_trait]
    impl NetworkAdapter for ScriptedAdapter {
        async fn get_anchor(&self) -> Result<String> {
            Ok(crate::codec::b64_encode(b"anchor"))
        }
        async fn get_price(&self, _bytes: u64, _target: Option<&str>) -> Result<String> {
            Ok("100".to_string())
        }
        async fn post_tx(&self, body: &Value) -> Result<HttpResponse> {
            *self.tx_calls.lock().unwrap() += 1;
            self.posted_tx.lock().unwrap().push(body.clone());
            let mut responses = self.tx_responses.lock().unwrap();
            if responses.is_empty() {
                Ok(HttpResponse { status: 200, body: vec![] })
            } else {
                Ok(responses.remove(0))
            }
        }
        async fn post_chunk(&self, _body: &Value) -> Result<HttpResponse> {
            *self.chunk_calls.lock().unwrap() += 1;
            let mut responses = self.chunk_responses.lock().unwrap();
            if responses.is_empty() {
                Ok(HttpResponse { status: 200, body: vec![] })
            } else {
                Ok(responses.remove(0))
            }
        }
        async fn get_tx(&self, _id: &str) -> Result<Value> {
            unimplemented!()
        }
        async fn get_tx_status(&self, _id: &str) -> Result<HttpResponse> {
            unimplemented!()
        }
        async fn get_tx_offset(&self, _id: &str) -> Result<HttpResponse> {
            unimplemented!()
        }
        async fn get_chunk(&self, _offset: u64) -> Result<HttpResponse> {
            unimplemented!()
        }
    }

    async fn signed_tx(data: Vec<u8>, adapter: &dyn NetworkAdapter) -> anyhow::Result<Transaction> {
        let wallet = test_wallet()?;
        let mut tx = Transaction::new(
            &wallet,
            ConstructionOptions { payload: Payload::Data(data), target: None, quantity: None, reward: None },
        )?;
        tx.sign(&wallet, adapter).await?;
        Ok(tx)
    }

    #[tokio::test]
    async fn test_tiny_transaction_skips_chunk_calls() -> anyhow::Result<()> {
        let adapter = ScriptedAdapter::new();
        let tx = signed_tx(b"test".to_vec(), &adapter).await?;
        let mut engine = UploadEngine::new(tx)?;
        engine.run(&adapter).await?;
        assert!(engine.is_complete());
        assert_eq!(*adapter.chunk_calls.lock().unwrap(), 0);
        assert_eq!(*adapter.tx_calls.lock().unwrap(), 1);
        let posted = adapter.posted_tx.lock().unwrap();
        assert_eq!(posted[0]["data"], crate::codec::b64_encode(b"test"));
        Ok(())
    }

    #[tokio::test]
    async fn test_two_chunk_upload_advances_in_order() -> anyhow::Result<()> {
        let adapter = ScriptedAdapter::new();
        let tx = signed_tx(vec![7u8; 300_000], &adapter).await?;
        let mut engine = UploadEngine::new(tx)?;
        assert_eq!(engine.total_chunks(), 2);
        engine.run(&adapter).await?;
        assert!(engine.is_complete());
        assert_eq!(*adapter.chunk_calls.lock().unwrap(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_fatal_chunk_error_aborts_without_retry() -> anyhow::Result<()> {
        let fatal = HttpResponse { status: 400, body: br#"{"error":"invalid_proof"}"#.to_vec() };
        let adapter = ScriptedAdapter::with_chunk_responses(vec![fatal]);
        let tx = signed_tx(vec![3u8; 300_000], &adapter).await?;
        let mut engine = UploadEngine::new(tx)?;
        let result = engine.run(&adapter).await;
        assert!(matches!(result, Err(Error::FatalChunkError { .. })));
        assert_eq!(engine.uploaded_chunks(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_header_rejection_is_retried_not_aborted() -> anyhow::Result<()> {
        let transient = HttpResponse { status: 503, body: b"service unavailable".to_vec() };
        let adapter = ScriptedAdapter::with_tx_responses(vec![transient]);
        let tx = signed_tx(b"test".to_vec(), &adapter).await?;
        let mut engine = UploadEngine::new(tx)?;
        engine.run(&adapter).await?;
        assert!(engine.is_complete());
        assert_eq!(*adapter.tx_calls.lock().unwrap(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_already_complete_rejects_further_steps() -> anyhow::Result<()> {
        let adapter = ScriptedAdapter::new();
        let tx = signed_tx(b"test".to_vec(), &adapter).await?;
        let mut engine = UploadEngine::new(tx)?;
        engine.run(&adapter).await?;
        let result = engine.upload_chunk(&adapter).await;
        assert!(matches!(result, Err(Error::AlreadyComplete)));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellation_leaves_state_unchanged() -> anyhow::Result<()> {
        let adapter = ScriptedAdapter::new();
        let tx = signed_tx(vec![9u8; 300_000], &adapter).await?;
        let mut engine = UploadEngine::new(tx)?;
        let cancel = engine.cancel_handle();
        cancel.store(true, Ordering::Relaxed);
        let outcome = engine.upload_chunk(&adapter).await?;
        assert_eq!(outcome, StepOutcome::Cancelled);
        assert_eq!(engine.uploaded_chunks(), 0);
        assert!(!engine.is_complete());
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_continues_from_saved_state() -> anyhow::Result<()> {
        let adapter = ScriptedAdapter::new();
        let tx = signed_tx(vec![1u8; 700_000], &adapter).await?;
        let mut engine = UploadEngine::new(tx)?;
        engine.upload_chunk(&adapter).await?;
        assert_eq!(engine.uploaded_chunks(), 1);

        let state = engine.save_state()?;
        let payload: PayloadSource = Box::new(std::io::Cursor::new(vec![1u8; 700_000]));
        let mut resumed = UploadEngine::resume(state, payload)?;
        assert_eq!(resumed.uploaded_chunks(), 1);
        resumed.run(&adapter).await?;
        assert!(resumed.is_complete());
        Ok(())
    }
}
