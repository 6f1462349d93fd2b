//! The single validated entry point: canonicalize -> schema-check ->
//! field-validate -> query -> wrap -> optionally sign.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;
use crate::chain::Chain;
use crate::error::{DgCode, DgError, ErrorEnvelope};
use crate::scholar::{self, ProofBundle, QueryParams, ScholarError};
use crate::signer::{self, Keypair, SignatureError};
use crate::validate::{self, ValidationError};

pub const PACKET_VERSION: &str = "1.4";

const REQUIRED_FIELDS: [&str; 3] = ["namespace", "requester_namespace", "requester_id"];
const KNOWN_FIELDS: [&str; 7] = [
    "namespace",
    "requester_namespace",
    "requester_id",
    "subject",
    "predicate",
    "object",
    "as_of_system_time",
];

/// An RFA could not be turned into a `ProofPacket`. No packet is ever
/// partially emitted when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("rfa schema invalid: {0}")]
    Schema(String),
    #[error(transparent)]
    Field(#[from] ValidationError),
    #[error(transparent)]
    Query(#[from] ScholarError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

impl EngineError {
    pub fn code(&self) -> DgCode {
        match self {
            EngineError::Schema(_) => DgCode::SchemaInvalid,
            EngineError::Field(_) => DgCode::InputInvalid,
            EngineError::Query(e) => e.code(),
            EngineError::Signature(_) => DgCode::SignatureInvalid,
        }
    }
}

/// `{algorithm: "Ed25519", public_key, signature, signed_at}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketSignature {
    pub algorithm: String,
    pub public_key: String,
    pub signature: String,
    pub signed_at: String,
}

/// `{packet_version, packet_id, generated_at, graph_id, proof_bundle, signature}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofPacket {
    pub packet_version: String,
    pub packet_id: String,
    pub generated_at: String,
    pub graph_id: String,
    pub proof_bundle: ProofBundle,
    pub signature: Option<PacketSignature>,
}

/// Injectable wall-clock dependency, so `process_rfa` can be made
/// reproducible in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Injectable `packet_id` derivation.
pub trait PacketIdSource: Send + Sync {
    fn packet_id(&self, proof_bundle: &ProofBundle, graph_id: &str, query_context: &Value) -> String;
}

/// `hex(sha256(canonical(proof_bundle) || graph_id || query_context))`.
pub struct DefaultPacketIdSource;

impl PacketIdSource for DefaultPacketIdSource {
    fn packet_id(&self, proof_bundle: &ProofBundle, graph_id: &str, query_context: &Value) -> String {
        let bundle_value = serde_json::to_value(proof_bundle).expect("ProofBundle always serializes");
        let mut bytes = canonical::to_canonical_bytes(&bundle_value);
        bytes.extend_from_slice(graph_id.as_bytes());
        bytes.extend_from_slice(&canonical::to_canonical_bytes(query_context));
        canonical::sha256_hex(&bytes)
    }
}

/// Programmatic construction, not a config-file format.
pub struct EngineConfig {
    pub graph_id: String,
    pub signing_key: Option<Keypair>,
    pub strict_schema: bool,
}

impl EngineConfig {
    pub fn new(graph_id: impl Into<String>) -> Self {
        EngineConfig { graph_id: graph_id.into(), signing_key: None, strict_schema: true }
    }

    pub fn with_signing_key(mut self, keypair: Keypair) -> Self {
        self.signing_key = Some(keypair);
        self
    }
}

/// The RFA pipeline. Holds no per-request mutable state beyond its
/// immutable signing key handle.
pub struct Engine {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    packet_id_source: Box<dyn PacketIdSource>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine { config, clock: Box::new(SystemClock), packet_id_source: Box::new(DefaultPacketIdSource) }
    }

    /// Construct with injected clock/id-source, for deterministic tests
    /// across repeated calls.
    pub fn with_sources(config: EngineConfig, clock: Box<dyn Clock>, packet_id_source: Box<dyn PacketIdSource>) -> Self {
        Engine { config, clock, packet_id_source }
    }

    /// The sole external entry point: seven deterministic steps. Each step
    /// surfaces the narrowest applicable error; on any
    /// error, no packet is returned.
    pub fn process_rfa(&self, chain: &Chain, rfa: Value) -> Result<ProofPacket, EngineError> {
        let _span = tracing::info_span!("process_rfa", graph_id = %self.config.graph_id, packet_id = tracing::field::Empty).entered();
        let result = self.process_rfa_inner(chain, rfa);
        if let Err(e) = &result {
            tracing::warn!(code = e.code().as_str(), "rfa rejected");
        }
        result
    }

    /// Same as [`Engine::process_rfa`], but for callers sitting at the
    /// external boundary (an HTTP handler, an RPC dispatcher): maps the
    /// narrow [`EngineError`] onto the stable `DG_*` envelope a remote
    /// caller can serialize and return as-is.
    pub fn process_rfa_envelope(&self, chain: &Chain, rfa: Value) -> Result<ProofPacket, ErrorEnvelope> {
        self.process_rfa(chain, rfa).map_err(|e| ErrorEnvelope::from(&DgError::from(e)))
    }

    fn process_rfa_inner(&self, chain: &Chain, rfa: Value) -> Result<ProofPacket, EngineError> {
        // 1. Canonicalize.
        let canon = canonical::canonicalize(&rfa);
        let obj = canon
            .as_object()
            .ok_or_else(|| EngineError::Schema("rfa must be a JSON object".to_string()))?;

        // 2. Schema-validate.
        if self.config.strict_schema {
            for key in obj.keys() {
                if !KNOWN_FIELDS.contains(&key.as_str()) {
                    return Err(EngineError::Schema(format!("unknown field {key:?}")));
                }
            }
        }

        let mut required: HashMap<&str, String> = HashMap::new();
        for field in REQUIRED_FIELDS {
            let v = obj
                .get(field)
                .ok_or_else(|| EngineError::Schema(format!("missing required field {field:?}")))?;
            let s = v
                .as_str()
                .ok_or_else(|| EngineError::Schema(format!("field {field:?} must be a string")))?;
            required.insert(field, s.trim().to_string());
        }

        let mut optional: HashMap<&str, String> = HashMap::new();
        for field in ["subject", "predicate", "object"] {
            if let Some(v) = obj.get(field) {
                let s = v
                    .as_str()
                    .ok_or_else(|| EngineError::Schema(format!("field {field:?} must be a string")))?;
                optional.insert(field, s.trim().to_string());
            }
        }

        let as_of_system_time = match obj.get("as_of_system_time") {
            Some(v) => {
                let s = v
                    .as_str()
                    .ok_or_else(|| EngineError::Schema("as_of_system_time must be a string".to_string()))?;
                let parsed = canonical::parse_timestamp(s.trim()).ok_or_else(|| {
                    EngineError::Schema("as_of_system_time is not a strict ISO-8601 Z timestamp".to_string())
                })?;
                Some(parsed)
            }
            None => None,
        };

        // 3. Field-validate.
        validate::validate_namespace(&required["namespace"])?;
        validate::validate_namespace(&required["requester_namespace"])?;
        validate::reject_control_characters("requester_id", &required["requester_id"])?;
        if let Some(s) = optional.get("subject") {
            validate::validate_subject(s)?;
        }
        if let Some(p) = optional.get("predicate") {
            validate::validate_predicate(p)?;
        }
        if let Some(o) = optional.get("object") {
            validate::validate_object(o)?;
        }

        // 4. Query.
        let params = QueryParams {
            namespace: required["namespace"].clone(),
            requester_namespace: required["requester_namespace"].clone(),
            requester_id: required["requester_id"].clone(),
            subject: optional.get("subject").cloned(),
            predicate: optional.get("predicate").cloned(),
            object: optional.get("object").cloned(),
            as_of_system_time,
        };
        let result = scholar::query_facts(chain, params)?;

        // 5. Bundle.
        let proof_bundle = result.to_proof_bundle();

        // 6. Wrap.
        let packet_id = self.packet_id_source.packet_id(&proof_bundle, &self.config.graph_id, &proof_bundle.context);
        tracing::Span::current().record("packet_id", tracing::field::display(&packet_id));
        let mut packet = ProofPacket {
            packet_version: PACKET_VERSION.to_string(),
            packet_id,
            generated_at: canonical::format_timestamp(self.clock.now()),
            graph_id: self.config.graph_id.clone(),
            proof_bundle,
            signature: None,
        };

        // 7. Sign (optional).
        if let Some(keypair) = &self.config.signing_key {
            let bundle_value = serde_json::to_value(&packet.proof_bundle)
                .expect("ProofBundle always serializes");
            let bytes = canonical::to_canonical_bytes(&bundle_value);
            packet.signature = Some(PacketSignature {
                algorithm: "Ed25519".to_string(),
                public_key: keypair.public_key_b64(),
                signature: keypair.sign(&bytes),
                signed_at: canonical::format_timestamp(self.clock.now()),
            });
        }

        Ok(packet)
    }
}

/// Verify a packet without access to private state. Never raises: a
/// missing, undecodable, or cryptographically invalid signature returns
/// `false`.
pub fn verify_proof_packet(packet: &ProofPacket, engine_public_key: &str) -> bool {
    let Some(sig) = &packet.signature else {
        return false;
    };
    if sig.public_key != engine_public_key {
        return false;
    }
    let bundle_value = match serde_json::to_value(&packet.proof_bundle) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let bytes = canonical::to_canonical_bytes(&bundle_value);
    signer::verify(engine_public_key, &bytes, &sig.signature).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, CellBody, CellType, FactBody, Proof, SourceQuality};
    use crate::genesis::{bootstrap, GenesisSpec};
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::HashSet;

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct FixedPacketId(&'static str);
    impl PacketIdSource for FixedPacketId {
        fn packet_id(&self, _bundle: &ProofBundle, _graph_id: &str, _ctx: &Value) -> String {
            self.0.to_string()
        }
    }

    fn chain_with_fact() -> Chain {
        let chain = Chain::new(HashSet::new());
        bootstrap(
            &chain,
            GenesisSpec {
                namespace: "corp".into(),
                witnesses: vec!["alice".into(), "bob".into()],
                threshold: 2,
                timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            },
        )
        .unwrap();
        let prev = chain.tail().unwrap().cell_id;
        let body = CellBody::Fact(FactBody {
            namespace: "corp".into(),
            subject: "user:alice_123".into(),
            predicate: "can_access".into(),
            object: "doc:7".into(),
            confidence: 100,
            source_quality: SourceQuality::Verified,
            valid_from: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
            valid_to: None,
        });
        let cell = Cell::new(CellType::Fact, Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(), prev, body, Proof::default()).unwrap();
        chain.append(cell, false).unwrap();
        chain
    }

    fn test_engine(graph_id: &str) -> Engine {
        Engine::with_sources(
            EngineConfig::new(graph_id),
            Box::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap())),
            Box::new(FixedPacketId("fixed-packet-id")),
        )
    }

    #[test]
    fn s1_happy_rfa_produces_packet_with_fact_and_genesis() {
        let chain = chain_with_fact();
        let engine = test_engine("g1");
        let rfa = json!({
            "namespace": "corp",
            "requester_namespace": "corp",
            "requester_id": "u:q",
            "subject": "user:alice_123",
            "predicate": "can_access",
        });
        let packet = engine.process_rfa(&chain, rfa).unwrap();
        assert_eq!(packet.packet_version, "1.4");
        assert!(packet.proof_bundle.cells.iter().any(|c| c.header.cell_type == CellType::Genesis));
        assert!(packet.proof_bundle.cells.iter().any(|c| c.header.cell_type == CellType::Fact));
        assert!(packet.signature.is_none());
    }

    #[test]
    fn s2_predicate_injection_rejected() {
        let chain = chain_with_fact();
        let engine = test_engine("g1");
        let rfa = json!({
            "namespace": "corp",
            "requester_namespace": "corp",
            "requester_id": "u:q",
            "predicate": "can;drop table",
        });
        let err = engine.process_rfa(&chain, rfa).unwrap_err();
        assert_eq!(err.code(), DgCode::InputInvalid);
    }

    #[test]
    fn s3_namespace_traversal_rejected() {
        let chain = chain_with_fact();
        let engine = test_engine("g1");
        let rfa = json!({
            "namespace": "corp..hr",
            "requester_namespace": "corp",
            "requester_id": "u:q",
        });
        let err = engine.process_rfa(&chain, rfa).unwrap_err();
        assert_eq!(err.code(), DgCode::InputInvalid);
    }

    #[test]
    fn s6_time_travel_before_genesis_is_unauthorized() {
        let chain = chain_with_fact();
        let engine = test_engine("g1");
        let rfa = json!({
            "namespace": "corp",
            "requester_namespace": "corp",
            "requester_id": "u:q",
            "as_of_system_time": "2020-01-01T00:00:00Z",
        });
        let err = engine.process_rfa(&chain, rfa).unwrap_err();
        assert_eq!(err.code(), DgCode::Unauthorized);
    }

    #[test]
    fn missing_required_field_is_schema_invalid() {
        let chain = chain_with_fact();
        let engine = test_engine("g1");
        let rfa = json!({ "namespace": "corp" });
        let err = engine.process_rfa(&chain, rfa).unwrap_err();
        assert_eq!(err.code(), DgCode::SchemaInvalid);
    }

    #[test]
    fn unknown_field_rejected_in_strict_mode() {
        let chain = chain_with_fact();
        let engine = test_engine("g1");
        let rfa = json!({
            "namespace": "corp",
            "requester_namespace": "corp",
            "requester_id": "u:q",
            "totally_unexpected": "x",
        });
        let err = engine.process_rfa(&chain, rfa).unwrap_err();
        assert_eq!(err.code(), DgCode::SchemaInvalid);
    }

    #[test]
    fn p3_repeated_process_rfa_is_byte_identical_given_injected_sources() {
        let chain = chain_with_fact();
        let rfa = || {
            json!({
                "namespace": "corp",
                "requester_namespace": "corp",
                "requester_id": "u:q",
            })
        };
        let a = test_engine("g1").process_rfa(&chain, rfa()).unwrap();
        let b = test_engine("g1").process_rfa(&chain, rfa()).unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn s5_signed_packet_verifies_then_tamper_fails() {
        let chain = chain_with_fact();
        let keypair = Keypair::generate();
        let public_key = keypair.public_key_b64();
        let engine = Engine::with_sources(
            EngineConfig::new("g1").with_signing_key(keypair),
            Box::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap())),
            Box::new(FixedPacketId("fixed-packet-id")),
        );
        let rfa = json!({
            "namespace": "corp",
            "requester_namespace": "corp",
            "requester_id": "u:q",
        });
        let mut packet = engine.process_rfa(&chain, rfa).unwrap();
        assert!(verify_proof_packet(&packet, &public_key));

        let sig = packet.signature.as_mut().unwrap();
        let mut chars: Vec<char> = sig.signature.chars().collect();
        let i = chars.len() / 2;
        chars[i] = if chars[i] == 'A' { 'B' } else { 'A' };
        sig.signature = chars.into_iter().collect();
        assert!(!verify_proof_packet(&packet, &public_key));
    }

    #[test]
    fn process_rfa_envelope_reports_schema_error_with_stable_code() {
        let chain = chain_with_fact();
        let engine = test_engine("g1");
        let rfa = json!({"namespace": "corp"}); // missing requester_namespace/requester_id
        let err = engine.process_rfa_envelope(&chain, rfa).unwrap_err();
        assert_eq!(err.code, "DG_SCHEMA_INVALID");
        assert!(!err.message.is_empty());

        let rendered = serde_json::to_value(&err).unwrap();
        let obj = rendered.as_object().unwrap();
        assert_eq!(obj["code"], "DG_SCHEMA_INVALID");
        assert!(obj.contains_key("message"));
        assert!(!obj.contains_key("details"));
        assert!(!obj.contains_key("request_id"));
    }
}
