//! Crate root: public surface for the DecisionGraph ledger.
//!
//! DecisionGraph is an append-only, hash-chained ledger of typed assertions
//! ("cells") organized under hierarchical namespaces, with cryptographic
//! cross-namespace bridges, signed proof packets, and a validated
//! request-for-authorization (RFA) pipeline.
//!
//! Control flow of a request: a caller submits an RFA to the [`Engine`];
//! the engine canonicalizes and validates it, invokes [`scholar::query_facts`]
//! against the [`Chain`] (filtered through namespace isolation and bridges),
//! wraps the resulting [`scholar::ProofBundle`] into a [`ProofPacket`], and
//! optionally signs it. A third party later checks it with
//! [`engine::verify_proof_packet`].
//!
//! The chain itself is never process-global: every component takes an
//! explicit handle, and multiple independent chains may coexist side by
//! side with no cross-references between them.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

/// Deterministic serialization: the basis of every hash and signature.
pub mod canonical;
/// Syntactic gatekeepers for subject/predicate/object/namespace/threshold.
pub mod validate;
/// Ed25519 sign/verify primitives and keypair generation.
pub mod signer;
/// The immutable, content-addressed cell record.
pub mod cell;
/// The append-only chain and its commit gate.
pub mod chain;
/// Bootstrap of the unique genesis cell.
pub mod genesis;
/// Hierarchical namespace isolation and cryptographic bridges.
pub mod namespace;
/// Stateless witness-set registry.
pub mod witness;
/// The query engine: resolves fact queries into a proof bundle.
pub mod scholar;
/// The RFA pipeline: the crate's single validated external entry point.
pub mod engine;
/// The root error taxonomy and stable `DG_*` error codes.
pub mod error;

pub use cell::{Cell, CellBody, CellType, Header, Proof, SourceQuality};
pub use chain::{Chain, ChainError};
pub use engine::{Engine, EngineConfig, EngineError, ProofPacket, verify_proof_packet};
pub use error::{DgCode, DgError, ErrorEnvelope};
pub use genesis::{bootstrap, GenesisError, GenesisSpec};
pub use namespace::{is_prefix, visible, Bridge};
pub use scholar::{query_facts, ProofBundle, QueryParams, QueryResult, ScholarError};
pub use signer::{Keypair, SignatureError};
pub use witness::{policy_head_history, WitnessRegistry, WitnessSet};
