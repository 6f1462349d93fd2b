//! The append-only chain and its commit gate.
//!
//! `Chain` is a single-writer, many-reader structure: one
//! `std::sync::RwLock` serializes `append`, and every reader takes a read
//! lock and returns owned data, so concurrent queries always see a
//! consistent snapshot up to the tail they observed. There is no
//! asynchronous suspension anywhere in the commit gate or the readers.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::cell::{Cell, CellBody, CellType, NULL_HASH};
use crate::error::DgCode;
use crate::signer::{self, SignatureError};

/// A commit-gate precondition failed. The chain is left unchanged
/// The chain is left unchanged when this is returned.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("cell_id does not match the hash of the cell's contents")]
    CellIdMismatch,
    #[error("genesis must be the first and only cell of its kind on the chain")]
    GenesisMustBeFirst,
    #[error("prev_cell_hash does not match the current chain tail")]
    InvalidPrevHash,
    #[error("only the genesis cell may carry the null-hash predecessor")]
    NonGenesisNullHash,
    #[error("timestamp is earlier than the chain tail's timestamp")]
    TimestampNotMonotonic,
    #[error("decision references a rule cell that does not exist or whose hash does not match")]
    UnresolvedLogicAnchor,
    #[error("confidence 1.0 requires source_quality = verified")]
    ConfidenceCeilingViolation,
    #[error("bridge endpoint {0:?} refers to an undeclared namespace")]
    BridgeEndpointUndeclared(String),
    #[error("bridge_rule requires signatures from both namespace owners")]
    BridgeMissingDualSignature,
    #[error("bridge_rule signature verification failed: {0}")]
    BridgeSignatureInvalid(#[source] SignatureError),
    #[error("namespace_def's parent namespace {0:?} is not declared")]
    NamespaceDefParentMissing(String),
    #[error("namespace_def must be signed by the parent namespace's owner")]
    NamespaceDefWrongSigner,
    #[error("cell requires a signature but none was supplied")]
    MissingRequiredSignature,
    #[error("signature verification failed: {0}")]
    SignatureInvalid(#[source] SignatureError),
}

impl ChainError {
    pub fn code(&self) -> DgCode {
        use ChainError::*;
        match self {
            CellIdMismatch | GenesisMustBeFirst | InvalidPrevHash
            | NonGenesisNullHash | TimestampNotMonotonic | UnresolvedLogicAnchor
            | ConfidenceCeilingViolation => DgCode::IntegrityFail,
            BridgeEndpointUndeclared(_) | BridgeMissingDualSignature | NamespaceDefParentMissing(_)
            | NamespaceDefWrongSigner => DgCode::Unauthorized,
            BridgeSignatureInvalid(_) | MissingRequiredSignature | SignatureInvalid(_) => {
                DgCode::SignatureInvalid
            }
        }
    }
}

#[derive(Default)]
struct ChainState {
    cells: Vec<Cell>,
    by_id: HashMap<String, usize>,
    /// Declared namespace -> recorded owner signer id.
    namespace_owners: HashMap<String, String>,
    bridges: Vec<crate::namespace::Bridge>,
}

/// The append-only, hash-chained sequence of cells.
pub struct Chain {
    state: RwLock<ChainState>,
    system_admins: HashSet<String>,
}

impl Chain {
    /// Create an empty chain. `system_admins` is the set of signer ids
    /// allowed to sign a top-level (dot-free) `namespace_def`.
    pub fn new(system_admins: HashSet<String>) -> Self {
        Chain { state: RwLock::new(ChainState::default()), system_admins }
    }

    /// The genesis cell, if appended.
    pub fn head(&self) -> Option<Cell> {
        self.state.read().unwrap().cells.first().cloned()
    }

    /// The most recently appended cell.
    pub fn tail(&self) -> Option<Cell> {
        self.state.read().unwrap().cells.last().cloned()
    }

    /// Number of cells currently on the chain.
    pub fn len(&self) -> usize {
        self.state.read().unwrap().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<Cell> {
        let state = self.state.read().unwrap();
        state.by_id.get(id).map(|&i| state.cells[i].clone())
    }

    /// A consistent snapshot of every cell in chain order.
    pub fn iter_in_order(&self) -> Vec<Cell> {
        self.state.read().unwrap().cells.clone()
    }

    /// All cells of chain-position prefix `[0, as_of)`. Used by Scholar to
    /// implement `as_of_system_time` once the caller has
    /// resolved a timestamp to a cell count via [`Chain::position_as_of`].
    pub fn prefix(&self, as_of: usize) -> Vec<Cell> {
        let state = self.state.read().unwrap();
        let n = as_of.min(state.cells.len());
        state.cells[..n].to_vec()
    }

    /// Number of cells with `timestamp <= as_of` (chain order is timestamp
    /// order), or `None` if `as_of` is before genesis.
    pub fn position_as_of(&self, as_of: chrono::DateTime<chrono::Utc>) -> Option<usize> {
        let state = self.state.read().unwrap();
        let genesis_ts = state.cells.first()?.header.timestamp;
        if as_of < genesis_ts {
            return None;
        }
        Some(state.cells.iter().take_while(|c| c.header.timestamp <= as_of).count())
    }

    pub fn find_by_type(&self, kind: CellType) -> Vec<Cell> {
        self.state
            .read()
            .unwrap()
            .cells
            .iter()
            .filter(|c| c.header.cell_type == kind)
            .cloned()
            .collect()
    }

    /// The currently active (non-revoked) bridges, newest revocation wins.
    pub fn active_bridges(&self) -> Vec<crate::namespace::Bridge> {
        self.state.read().unwrap().bridges.clone()
    }

    /// SHA-256 of the newline-delimited canonical-JSON serialization of
    /// every cell in chain order.
    /// Persistence itself is out of scope; this is the digest contract a
    /// persistence layer would reproduce.
    pub fn replay_digest(&self) -> String {
        let cells = self.state.read().unwrap().cells.clone();
        let mut buf = Vec::new();
        for cell in &cells {
            let value = serde_json::to_value(cell).expect("Cell always serializes");
            buf.extend_from_slice(&crate::canonical::to_canonical_bytes(&value));
            buf.push(b'\n');
        }
        crate::canonical::sha256_hex(&buf)
    }

    /// The single mutator. Validates `cell` against every commit-gate
    /// precondition in order (first failure wins) and appends
    /// it only if all pass.
    pub fn append(&self, cell: Cell, verify_signatures: bool) -> Result<(), ChainError> {
        let cell_type = cell.header.cell_type.as_str();
        match self.try_append(cell, verify_signatures) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(code = e.code().as_str(), cell_type, "append rejected");
                Err(e)
            }
        }
    }

    fn try_append(&self, cell: Cell, verify_signatures: bool) -> Result<(), ChainError> {
        let mut state = self.state.write().unwrap();

        // 1. cell_id integrity.
        if cell.recompute_id() != cell.cell_id {
            return Err(ChainError::CellIdMismatch);
        }

        let is_genesis = matches!(cell.body, CellBody::Genesis(_));

        // 2. genesis uniqueness / chain-of-custody.
        if is_genesis {
            if !state.cells.is_empty() {
                return Err(ChainError::GenesisMustBeFirst);
            }
            if cell.header.prev_cell_hash != NULL_HASH {
                return Err(ChainError::InvalidPrevHash);
            }
        } else {
            if state.cells.is_empty() {
                return Err(ChainError::GenesisMustBeFirst);
            }
            if cell.header.prev_cell_hash == NULL_HASH {
                return Err(ChainError::NonGenesisNullHash);
            }
            let tail = state.cells.last().unwrap();
            if cell.header.prev_cell_hash != tail.cell_id {
                return Err(ChainError::InvalidPrevHash);
            }
            // 3. temporal monotonicity.
            if cell.header.timestamp < tail.header.timestamp {
                return Err(ChainError::TimestampNotMonotonic);
            }
        }

        // 4. logic anchoring.
        if let CellBody::Decision(d) = &cell.body {
            let anchored = state.cells.iter().any(|c| match &c.body {
                CellBody::Rule(r) => r.rule_id == d.rule_id && r.rule_logic_hash == d.rule_logic_hash,
                _ => false,
            });
            if !anchored {
                return Err(ChainError::UnresolvedLogicAnchor);
            }
        }

        // confidence ceiling: 1.0 only under a verified source.
        if let CellBody::Fact(f) = &cell.body {
            if f.confidence == 100 && !matches!(f.source_quality, crate::cell::SourceQuality::Verified) {
                return Err(ChainError::ConfidenceCeilingViolation);
            }
        }

        // 5. bridge dual-approval.
        if let CellBody::BridgeRule(b) = &cell.body {
            let source_owner = owner_of(&state, &b.source_namespace)
                .ok_or_else(|| ChainError::BridgeEndpointUndeclared(b.source_namespace.clone()))?
                .to_string();
            let target_owner = owner_of(&state, &b.target_namespace)
                .ok_or_else(|| ChainError::BridgeEndpointUndeclared(b.target_namespace.clone()))?
                .to_string();

            let sigs = cell.proof.signatures.as_ref().ok_or(ChainError::BridgeMissingDualSignature)?;
            let seal = cell.seal_bytes();
            let mut seen_source = false;
            let mut seen_target = false;
            for entry in sigs {
                let ok = signer::verify(&entry.signer_id, &seal, &entry.signature)
                    .map_err(ChainError::BridgeSignatureInvalid)?;
                if !ok {
                    return Err(ChainError::BridgeSignatureInvalid(SignatureError::SignatureFormat));
                }
                if entry.signer_id == source_owner {
                    seen_source = true;
                }
                if entry.signer_id == target_owner {
                    seen_target = true;
                }
            }
            if !(seen_source && seen_target) {
                return Err(ChainError::BridgeMissingDualSignature);
            }
        }

        // 6. namespace_def ownership chain.
        if let CellBody::NamespaceDef(nd) = &cell.body {
            let signer_id = cell
                .proof
                .signer_id
                .clone()
                .ok_or(ChainError::NamespaceDefWrongSigner)?;
            match nd.namespace.rsplit_once('.') {
                None => {
                    if !self.system_admins.contains(&signer_id) {
                        return Err(ChainError::NamespaceDefWrongSigner);
                    }
                }
                Some((parent, _)) => {
                    let parent_owner = state
                        .namespace_owners
                        .get(parent)
                        .cloned()
                        .ok_or_else(|| ChainError::NamespaceDefParentMissing(parent.to_string()))?;
                    if signer_id != parent_owner {
                        return Err(ChainError::NamespaceDefWrongSigner);
                    }
                }
            }
        }

        // 7. optional signature verification.
        if verify_signatures && cell.proof.requires_signature() {
            let sig = cell.proof.signature.as_ref().ok_or(ChainError::MissingRequiredSignature)?;
            let signer_id = cell.proof.signer_id.as_ref().ok_or(ChainError::MissingRequiredSignature)?;
            let ok = signer::verify(signer_id, &cell.seal_bytes(), sig).map_err(ChainError::SignatureInvalid)?;
            if !ok {
                return Err(ChainError::SignatureInvalid(SignatureError::SignatureFormat));
            }
        }

        // All preconditions passed: commit.
        let idx = state.cells.len();
        match &cell.body {
            CellBody::Genesis(g) => {
                if let Some(owner) = g.witnesses.first() {
                    state.namespace_owners.insert(g.namespace.clone(), owner.clone());
                }
            }
            CellBody::NamespaceDef(nd) => {
                state.namespace_owners.insert(nd.namespace.clone(), nd.owner_signer_id.clone());
            }
            CellBody::BridgeRule(b) => {
                state.bridges.push(crate::namespace::Bridge {
                    source: b.source_namespace.clone(),
                    target: b.target_namespace.clone(),
                    revoked: b.revoked,
                });
            }
            _ => {}
        }
        tracing::debug!(cell_type = cell.header.cell_type.as_str(), namespace = cell.body.namespace(), position = idx, "cell appended");
        state.by_id.insert(cell.cell_id.clone(), idx);
        state.cells.push(cell);
        Ok(())
    }
}

/// The owner recorded for the longest declared namespace prefix of `ns`
/// Bridge endpoints need only refer to a *declared* subtree, not an exact
/// namespace match.
fn owner_of<'a>(state: &'a ChainState, ns: &str) -> Option<&'a str> {
    state
        .namespace_owners
        .iter()
        .filter(|(declared, _)| crate::namespace::is_prefix(declared, ns))
        .max_by_key(|(declared, _)| declared.len())
        .map(|(_, owner)| owner.as_str())
}
