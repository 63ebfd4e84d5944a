//! Builds the binary Merkle tree over a payload's chunks, emits `data_root`
//! and per-chunk inclusion proofs, and validates a proof against a root.
//!
//! Grounded on `race-storage::merkle`, which models a leaf/branch node as a
//! single struct with `Option` fields. This tightens that into a tagged
//! `enum` instead — the capability set (`id`, `max_byte_range`) lives on
//! every variant, and only the variant-specific data (`data_hash` vs.
//! `left`/`right` children) differs. Proof-frame parsing follows
//! `race-storage::merkle`'s `LeafProof`/`BranchProof` pattern of deriving
//! `BorshDeserialize` on a fixed-layout struct rather than hand-indexing
//! byte ranges.

use crate::chunker::Chunk;
use crate::codec::note32;
use crate::error::{Error, Result};
use borsh::BorshDeserialize;
use openssl::sha;

const HASH_SIZE: usize = 32;
const NOTE_SIZE: usize = 32;

/// Byte layout of a leaf proof frame: `data_hash ‖ note32(max_byte_range)`.
/// Borsh deserializes the fixed-size fields directly off the wire slice
/// rather than hand-indexing sub-ranges.
#[derive(BorshDeserialize)]
struct LeafFrame {
    data_hash: [u8; HASH_SIZE],
    notepad: [u8; NOTE_SIZE - 8],
    offset: [u8; 8],
}

/// Byte layout of a branch proof frame: `left_id ‖ right_id ‖ note32(byte_range)`.
#[derive(BorshDeserialize)]
struct BranchFrame {
    left_id: [u8; HASH_SIZE],
    right_id: [u8; HASH_SIZE],
    notepad: [u8; NOTE_SIZE - 8],
    offset: [u8; 8],
}

fn sha256(data: &[u8]) -> [u8; 32] {
    sha::sha256(data)
}

fn sha256_all(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = sha::Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hasher.finish()
}

/// Leaf node (one payload chunk) or branch node (hash of two child nodes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf {
        id: [u8; HASH_SIZE],
        data_hash: [u8; HASH_SIZE],
        max_byte_range: u64,
    },
    Branch {
        id: [u8; HASH_SIZE],
        byte_range: u64,
        max_byte_range: u64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub fn id(&self) -> [u8; HASH_SIZE] {
        match self {
            Node::Leaf { id, .. } => *id,
            Node::Branch { id, .. } => *id,
        }
    }

    pub fn max_byte_range(&self) -> u64 {
        match self {
            Node::Leaf { max_byte_range, .. } => *max_byte_range,
            Node::Branch { max_byte_range, .. } => *max_byte_range,
        }
    }
}

/// A chunk's inclusion witness: the concatenation, top-down, of every
/// branch ancestor's frame, terminated by the leaf's own frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub offset: u64,
    pub proof: Vec<u8>,
}

/// `leaf.id = sha256( sha256(data_hash) ‖ sha256(note32(max_byte_range)) )`
pub fn build_leaves(chunks: &[Chunk]) -> Vec<Node> {
    chunks
        .iter()
        .map(|chunk| {
            let note = note32(chunk.max_byte_range);
            let id = sha256_all(&[&sha256(&chunk.data_hash), &sha256(&note)]);
            Node::Leaf {
                id,
                data_hash: chunk.data_hash,
                max_byte_range: chunk.max_byte_range,
            }
        })
        .collect()
}

fn hash_branch(left: Node, right: Node) -> Node {
    let left_max = left.max_byte_range();
    let note = note32(left_max);
    let id = sha256_all(&[&sha256(&left.id()), &sha256(&right.id()), &sha256(&note)]);
    Node::Branch {
        id,
        byte_range: left_max,
        max_byte_range: right.max_byte_range(),
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Pairs a layer of nodes left-to-right into branches. An odd node out is
/// promoted unchanged to the next layer — no duplication, no self-hash.
fn build_layer(nodes: Vec<Node>) -> Vec<Node> {
    let mut layer = Vec::with_capacity((nodes.len() + 1) / 2);
    let mut iter = nodes.into_iter();
    while let Some(left) = iter.next() {
        match iter.next() {
            Some(right) => layer.push(hash_branch(left, right)),
            None => layer.push(left),
        }
    }
    layer
}

/// Reduces leaves to a single root. A single leaf's root *is* that leaf.
pub fn generate_root(mut nodes: Vec<Node>) -> Result<Node> {
    while nodes.len() > 1 {
        nodes = build_layer(nodes);
    }
    nodes.pop().ok_or(Error::NoRootNodeFound)
}

/// Depth-first traversal of the tree, emitting one [`Proof`] per leaf in
/// byte-range order. Both children of a branch inherit the same
/// accumulated prefix; the frame appended before each descent is what
/// differentiates the two children's proofs.
pub fn resolve_proofs(node: &Node, prefix: &[u8]) -> Vec<Proof> {
    match node {
        Node::Leaf { data_hash, max_byte_range, .. } => {
            let mut proof = prefix.to_vec();
            proof.extend_from_slice(data_hash);
            proof.extend_from_slice(&note32(*max_byte_range));
            vec![Proof { offset: max_byte_range - 1, proof }]
        }
        Node::Branch { byte_range, left, right, .. } => {
            let mut partial = prefix.to_vec();
            partial.extend_from_slice(&left.id());
            partial.extend_from_slice(&right.id());
            partial.extend_from_slice(&note32(*byte_range));

            let mut proofs = resolve_proofs(left, &partial);
            proofs.extend(resolve_proofs(right, &partial));
            proofs
        }
    }
}

/// Result of a successful [`validate_path`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedPathResult {
    pub offset: i64,
    pub left_bound: i64,
    pub right_bound: i64,
    pub chunk_size: i64,
}

/// Checks that `path` witnesses inclusion of the chunk at `dest` under
/// `root_id`, within `[left_bound, right_bound)`. Returns `None` on any
/// hash mismatch — the caller treats rejection as a fatal chunk error.
pub fn validate_path(
    root_id: [u8; HASH_SIZE],
    dest: i64,
    left_bound: i64,
    right_bound: i64,
    path: &[u8],
) -> Option<ValidatedPathResult> {
    if right_bound < 0 {
        return None;
    }
    if dest > right_bound {
        return validate_path(root_id, 0, right_bound - 1, right_bound, path);
    }
    if dest < 0 {
        return validate_path(root_id, 0, 0, right_bound, path);
    }

    if path.len() == HASH_SIZE + NOTE_SIZE {
        let frame = LeafFrame::try_from_slice(&path[..HASH_SIZE + NOTE_SIZE]).ok()?;
        let note = [frame.notepad.as_slice(), frame.offset.as_slice()].concat();
        let h = sha256_all(&[&sha256(&frame.data_hash), &sha256(&note)]);

        if h != root_id {
            return None;
        }
        return Some(ValidatedPathResult {
            offset: right_bound - 1,
            left_bound,
            right_bound,
            chunk_size: right_bound - left_bound,
        });
    }

    if path.len() < 2 * HASH_SIZE + NOTE_SIZE {
        return None;
    }

    let frame = BranchFrame::try_from_slice(&path[..2 * HASH_SIZE + NOTE_SIZE]).ok()?;
    let remainder = &path[2 * HASH_SIZE + NOTE_SIZE..];
    let note = [frame.notepad.as_slice(), frame.offset.as_slice()].concat();

    let h = sha256_all(&[&sha256(&frame.left_id), &sha256(&frame.right_id), &sha256(&note)]);
    if h != root_id {
        return None;
    }

    let offset = u64::from_be_bytes(frame.offset) as i64;

    if dest < offset {
        validate_path(frame.left_id, dest, left_bound, right_bound.min(offset), remainder)
    } else {
        validate_path(frame.right_id, dest, left_bound.max(offset), right_bound, remainder)
    }
}
