//! The immutable, content-addressed record appended to a [`crate::chain::Chain`].
//!
//! A `Cell` is a value object: two cells with the same `cell_id` are the
//! same cell. Construction always validates every field and
//! computes `cell_id`; there is no way to build a `Cell` whose `cell_id`
//! doesn't match its contents, which is what makes [`Cell::recompute_id`]
//! useful as an integrity check rather than a tautology — the chain's
//! commit gate recomputes it independently from the wire bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::validate::{self, ValidationError};

/// Sentinel `prev_cell_hash` carried only by the genesis cell.
pub const NULL_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// The closed set of cell kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    Genesis,
    Fact,
    Rule,
    Decision,
    Evidence,
    Override,
    AccessRule,
    BridgeRule,
    NamespaceDef,
    PolicyHead,
}

impl CellType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Genesis => "genesis",
            CellType::Fact => "fact",
            CellType::Rule => "rule",
            CellType::Decision => "decision",
            CellType::Evidence => "evidence",
            CellType::Override => "override",
            CellType::AccessRule => "access_rule",
            CellType::BridgeRule => "bridge_rule",
            CellType::NamespaceDef => "namespace_def",
            CellType::PolicyHead => "policy_head",
        }
    }
}

/// `source_quality` of a fact. Confidence may only reach 1.0
/// (stored as `100` hundredths) when this is `Verified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceQuality {
    Verified,
    SelfReported,
    Inferred,
}

/// `{version, cell_type, timestamp, prev_cell_hash}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u16,
    pub cell_type: CellType,
    pub timestamp: DateTime<Utc>,
    pub prev_cell_hash: String,
}

/// Shape shared by `fact`, `evidence`, `override`, and `access_rule` cells:
/// a namespaced subject/predicate/object assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactBody {
    pub namespace: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Confidence as hundredths (0..=100); see `validate::validate_confidence`.
    pub confidence: u8,
    pub source_quality: SourceQuality,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

/// Shape shared by `evidence`, `override`, and `access_rule` cells, which
/// carry the same subject/predicate/object/namespace quadruple as a fact
/// but no confidence/source_quality/validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionBody {
    pub namespace: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub note: Option<String>,
}

/// `rule` cell body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleBody {
    pub namespace: String,
    pub rule_id: String,
    pub rule_logic_hash: String,
    pub description: String,
}

/// `decision` cell body. `{rule_id, rule_logic_hash}` is the `logic_anchor`
/// and must match an existing `rule` cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionBody {
    pub namespace: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub rule_id: String,
    pub rule_logic_hash: String,
}

/// `genesis` cell body: the root namespace declaration plus initial
/// witness set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisBody {
    pub namespace: String,
    pub witnesses: Vec<String>,
    pub threshold: u32,
}

/// `policy_head` cell body: a witness-set update for `namespace`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyHeadBody {
    pub namespace: String,
    pub witnesses: Vec<String>,
    pub threshold: u32,
}

/// `bridge_rule` cell body. Requires dual signatures from both namespace
/// owners; `revoked` marks whether a later cell has revoked an earlier grant
/// for the same `(source, target)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeBody {
    pub source_namespace: String,
    pub target_namespace: String,
    pub revoked: bool,
}

/// `namespace_def` cell body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceDefBody {
    pub namespace: String,
    pub owner_signer_id: String,
}

/// The closed discriminated union of cell contents: a tagged variant per
/// cell type rather than a dynamic field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cell_type", rename_all = "snake_case")]
pub enum CellBody {
    Genesis(GenesisBody),
    Fact(FactBody),
    Rule(RuleBody),
    Decision(DecisionBody),
    Evidence(AssertionBody),
    Override(AssertionBody),
    AccessRule(AssertionBody),
    BridgeRule(BridgeBody),
    NamespaceDef(NamespaceDefBody),
    PolicyHead(PolicyHeadBody),
}

impl CellBody {
    pub fn cell_type(&self) -> CellType {
        match self {
            CellBody::Genesis(_) => CellType::Genesis,
            CellBody::Fact(_) => CellType::Fact,
            CellBody::Rule(_) => CellType::Rule,
            CellBody::Decision(_) => CellType::Decision,
            CellBody::Evidence(_) => CellType::Evidence,
            CellBody::Override(_) => CellType::Override,
            CellBody::AccessRule(_) => CellType::AccessRule,
            CellBody::BridgeRule(_) => CellType::BridgeRule,
            CellBody::NamespaceDef(_) => CellType::NamespaceDef,
            CellBody::PolicyHead(_) => CellType::PolicyHead,
        }
    }

    /// The namespace this cell is rooted in, used by the commit gate and by
    /// namespace visibility.
    pub fn namespace(&self) -> &str {
        match self {
            CellBody::Genesis(b) => &b.namespace,
            CellBody::Fact(b) => &b.namespace,
            CellBody::Rule(b) => &b.namespace,
            CellBody::Decision(b) => &b.namespace,
            CellBody::Evidence(b) => &b.namespace,
            CellBody::Override(b) => &b.namespace,
            CellBody::AccessRule(b) => &b.namespace,
            CellBody::BridgeRule(b) => &b.source_namespace,
            CellBody::NamespaceDef(b) => &b.namespace,
            CellBody::PolicyHead(b) => &b.namespace,
        }
    }

    /// The `(namespace, subject, predicate, object, rule_id, rule_logic_hash)`
    /// tuple fed into the cell seal. Fields that don't
    /// apply to this variant are empty strings, which the length-prefixed
    /// framing encodes unambiguously as zero-length items.
    fn seal_fields(&self) -> (String, String, String, String, String, String) {
        match self {
            CellBody::Genesis(b) => {
                (b.namespace.clone(), String::new(), String::new(), canonical_json(b), String::new(), String::new())
            }
            CellBody::Fact(b) => (
                b.namespace.clone(),
                b.subject.clone(),
                b.predicate.clone(),
                b.object.clone(),
                String::new(),
                String::new(),
            ),
            CellBody::Rule(b) => (
                b.namespace.clone(),
                String::new(),
                String::new(),
                String::new(),
                b.rule_id.clone(),
                b.rule_logic_hash.clone(),
            ),
            CellBody::Decision(b) => (
                b.namespace.clone(),
                b.subject.clone(),
                b.predicate.clone(),
                b.object.clone(),
                b.rule_id.clone(),
                b.rule_logic_hash.clone(),
            ),
            CellBody::Evidence(b) | CellBody::Override(b) | CellBody::AccessRule(b) => (
                b.namespace.clone(),
                b.subject.clone(),
                b.predicate.clone(),
                b.object.clone(),
                String::new(),
                String::new(),
            ),
            CellBody::BridgeRule(b) => (
                b.source_namespace.clone(),
                String::new(),
                String::new(),
                b.target_namespace.clone(),
                String::new(),
                String::new(),
            ),
            CellBody::NamespaceDef(b) => (
                b.namespace.clone(),
                b.owner_signer_id.clone(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ),
            CellBody::PolicyHead(b) => {
                (b.namespace.clone(), String::new(), String::new(), canonical_json(b), String::new(), String::new())
            }
        }
    }
}

fn canonical_json<T: Serialize>(v: &T) -> String {
    let value = serde_json::to_value(v).expect("cell body always serializes to JSON");
    String::from_utf8(canonical::to_canonical_bytes(&value)).expect("canonical JSON is UTF-8")
}

/// A single signature over a cell's seal bytes, carrying its signer
/// identity (used for bridge/policy-head multi-signature).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub signer_id: String,
    /// Base64url-encoded Ed25519 signature.
    pub signature: String,
}

/// `{signature?, signer_id?, signatures[]?, merkle_root, signature_required?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Proof {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<SignatureEntry>>,
    pub merkle_root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_required: Option<bool>,
}

impl Proof {
    /// An advisory flag the commit gate consults when `verify_signatures`
    /// is requested. Defaults to `false`.
    pub fn requires_signature(&self) -> bool {
        self.signature_required.unwrap_or(false)
    }
}

/// The atomic, immutable unit of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub header: Header,
    pub body: CellBody,
    pub proof: Proof,
    pub cell_id: String,
}

impl Cell {
    /// Build a new cell, validating every queryable field and computing
    /// `cell_id` from the canonical seal bytes. `version` is fixed at `1`
    /// for cells constructed by this crate; the field exists on the wire
    /// for forward compatibility; schema evolution beyond this field is out of
    /// scope.
    pub fn new(
        cell_type_hint: CellType,
        timestamp: DateTime<Utc>,
        prev_cell_hash: String,
        body: CellBody,
        proof: Proof,
    ) -> Result<Self, ValidationError> {
        debug_assert_eq!(cell_type_hint, body.cell_type());
        validate_body(&body)?;

        let header = Header { version: 1, cell_type: body.cell_type(), timestamp, prev_cell_hash };
        let cell_id = compute_cell_id(&header, &body);
        Ok(Cell { header, body, proof, cell_id })
    }

    /// Recompute `cell_id` from `header`/`body` and compare against the
    /// stored value. This is the check the commit gate uses to reject a
    /// tampered or hand-built cell.
    pub fn recompute_id(&self) -> String {
        compute_cell_id(&self.header, &self.body)
    }

    /// The exact bytes that get hashed into `cell_id`, and that get signed
    /// when `proof.signature_required` is set.
    pub fn seal_bytes(&self) -> Vec<u8> {
        seal_bytes(&self.header, &self.body)
    }
}

fn compute_cell_id(header: &Header, body: &CellBody) -> String {
    canonical::sha256_hex(&seal_bytes(header, body))
}

/// `version | cell_type | timestamp | prev_cell_hash | namespace | subject
/// | predicate | object | rule_id | rule_logic_hash`, each field
/// length-prefixed.
fn seal_bytes(header: &Header, body: &CellBody) -> Vec<u8> {
    let (namespace, subject, predicate, object, rule_id, rule_logic_hash) = body.seal_fields();
    let mut out = Vec::with_capacity(256);
    canonical::append_length_prefixed(&mut out, header.version.to_string().as_bytes());
    canonical::append_length_prefixed(&mut out, header.cell_type.as_str().as_bytes());
    canonical::append_length_prefixed(&mut out, canonical::format_timestamp(header.timestamp).as_bytes());
    canonical::append_length_prefixed(&mut out, header.prev_cell_hash.as_bytes());
    canonical::append_length_prefixed(&mut out, namespace.as_bytes());
    canonical::append_length_prefixed(&mut out, subject.as_bytes());
    canonical::append_length_prefixed(&mut out, predicate.as_bytes());
    canonical::append_length_prefixed(&mut out, object.as_bytes());
    canonical::append_length_prefixed(&mut out, rule_id.as_bytes());
    canonical::append_length_prefixed(&mut out, rule_logic_hash.as_bytes());
    out
}

fn validate_body(body: &CellBody) -> Result<(), ValidationError> {
    match body {
        CellBody::Genesis(b) => {
            validate::validate_namespace(&b.namespace)?;
            validate::validate_threshold(b.threshold, b.witnesses.len())?;
        }
        CellBody::Fact(b) => {
            validate::validate_namespace(&b.namespace)?;
            validate::validate_subject(&b.subject)?;
            validate::validate_predicate(&b.predicate)?;
            validate::validate_object(&b.object)?;
            validate::validate_confidence_hundredths(b.confidence)?;
        }
        CellBody::Rule(b) => {
            validate::validate_namespace(&b.namespace)?;
            validate::reject_control_characters("rule_id", &b.rule_id)?;
            validate::reject_control_characters("rule_logic_hash", &b.rule_logic_hash)?;
        }
        CellBody::Decision(b) => {
            validate::validate_namespace(&b.namespace)?;
            validate::validate_subject(&b.subject)?;
            validate::validate_predicate(&b.predicate)?;
            validate::validate_object(&b.object)?;
            validate::reject_control_characters("rule_id", &b.rule_id)?;
            validate::reject_control_characters("rule_logic_hash", &b.rule_logic_hash)?;
        }
        CellBody::Evidence(b) | CellBody::Override(b) | CellBody::AccessRule(b) => {
            validate::validate_namespace(&b.namespace)?;
            validate::validate_subject(&b.subject)?;
            validate::validate_predicate(&b.predicate)?;
            validate::validate_object(&b.object)?;
        }
        CellBody::BridgeRule(b) => {
            validate::validate_namespace(&b.source_namespace)?;
            validate::validate_namespace(&b.target_namespace)?;
        }
        CellBody::NamespaceDef(b) => {
            validate::validate_namespace(&b.namespace)?;
            validate::reject_control_characters("owner_signer_id", &b.owner_signer_id)?;
        }
        CellBody::PolicyHead(b) => {
            validate::validate_namespace(&b.namespace)?;
            validate::validate_threshold(b.threshold, b.witnesses.len())?;
        }
    }
    Ok(())
}
