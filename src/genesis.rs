//! Bootstrap: construct and append the unique genesis cell.

use chrono::{DateTime, Utc};

use crate::cell::{Cell, CellBody, CellType, GenesisBody, Proof, NULL_HASH};
use crate::chain::{Chain, ChainError};
use crate::validate::ValidationError;

/// Everything needed to bootstrap a graph: the root namespace and its
/// initial witness set.
pub struct GenesisSpec {
    pub namespace: String,
    pub witnesses: Vec<String>,
    pub threshold: u32,
    pub timestamp: DateTime<Utc>,
}

/// Construction of the genesis cell failed validation.
#[derive(Debug, thiserror::Error)]
pub enum GenesisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Build the genesis cell from `spec`. Because it has no predecessor, its
/// commit is guarded only by the genesis-uniqueness and null-hash checks
/// (no namespace-ownership or signature checks run for genesis).
pub fn build(spec: GenesisSpec) -> Result<Cell, ValidationError> {
    let body = CellBody::Genesis(GenesisBody {
        namespace: spec.namespace,
        witnesses: spec.witnesses,
        threshold: spec.threshold,
    });
    Cell::new(CellType::Genesis, spec.timestamp, NULL_HASH.to_string(), body, Proof::default())
}

/// Build and append the genesis cell to a freshly constructed, empty chain.
pub fn bootstrap(chain: &Chain, spec: GenesisSpec) -> Result<Cell, GenesisError> {
    let cell = build(spec)?;
    chain.append(cell.clone(), false)?;
    Ok(cell)
}
