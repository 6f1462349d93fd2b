//! Property-style invariant checks, exercised with
//! explicit adversarial fixtures rather than a property-testing crate
//! (bit-flips, boundary namespaces, clock skew, shuffled key order).

use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use decisiongraph::cell::{
    BridgeBody, Cell, CellBody, CellType, FactBody, NamespaceDefBody, Proof, SignatureEntry,
    SourceQuality,
};
use decisiongraph::{bootstrap, canonical, Chain, ChainError, Engine, EngineConfig, GenesisSpec, Keypair};
use serde_json::json;

fn ts(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn corp_chain() -> Chain {
    let chain = Chain::new(HashSet::new());
    bootstrap(
        &chain,
        GenesisSpec {
            namespace: "corp".into(),
            witnesses: vec!["alice".into(), "bob".into()],
            threshold: 2,
            timestamp: ts(2026, 1, 1),
        },
    )
    .unwrap();
    chain
}

#[test]
fn p1_cell_id_is_hash_of_seal_bytes_for_every_cell_type() {
    let chain = corp_chain();
    let genesis = chain.head().unwrap();
    assert_eq!(genesis.cell_id, genesis.recompute_id());

    let prev = genesis.cell_id.clone();
    let body = CellBody::Fact(FactBody {
        namespace: "corp".into(),
        subject: "user:alice_123".into(),
        predicate: "can_access".into(),
        object: "doc:7".into(),
        confidence: 80,
        source_quality: SourceQuality::Inferred,
        valid_from: ts(2026, 1, 2),
        valid_to: None,
    });
    let fact = Cell::new(CellType::Fact, ts(2026, 1, 2), prev, body, Proof::default()).unwrap();
    assert_eq!(fact.cell_id, fact.recompute_id());
    assert_eq!(canonical::sha256_hex(&fact.seal_bytes()), fact.cell_id);
}

#[test]
fn p2_chain_invariants_hold_across_an_interleaving_of_valid_appends() {
    let chain = corp_chain();
    let mut prev = chain.head().unwrap().cell_id;
    for i in 0..5 {
        let body = CellBody::Fact(FactBody {
            namespace: "corp".into(),
            subject: format!("user:u{i}"),
            predicate: "can_access".into(),
            object: format!("doc:{i}"),
            confidence: 100,
            source_quality: SourceQuality::Verified,
            valid_from: ts(2026, 1, 2),
            valid_to: None,
        });
        let cell = Cell::new(CellType::Fact, ts(2026, 1, 2), prev.clone(), body, Proof::default()).unwrap();
        prev = cell.cell_id.clone();
        chain.append(cell, false).unwrap();
    }

    let cells = chain.iter_in_order();
    assert_eq!(cells[0].header.cell_type, CellType::Genesis);
    for w in cells.windows(2) {
        assert_eq!(w[1].header.prev_cell_hash, w[0].cell_id);
        assert!(w[1].header.timestamp >= w[0].header.timestamp);
    }
}

#[test]
fn p3_repeated_rfa_over_same_snapshot_is_byte_identical() {
    struct FixedClock(chrono::DateTime<Utc>);
    impl decisiongraph::engine::Clock for FixedClock {
        fn now(&self) -> chrono::DateTime<Utc> {
            self.0
        }
    }
    struct FixedId;
    impl decisiongraph::engine::PacketIdSource for FixedId {
        fn packet_id(&self, _b: &decisiongraph::ProofBundle, _g: &str, _c: &serde_json::Value) -> String {
            "deterministic".to_string()
        }
    }

    let chain = corp_chain();
    let rfa = || json!({"namespace": "corp", "requester_namespace": "corp", "requester_id": "u:q"});

    let e1 = Engine::with_sources(
        EngineConfig::new("g1"),
        Box::new(FixedClock(ts(2026, 1, 5))),
        Box::new(FixedId),
    );
    let e2 = Engine::with_sources(
        EngineConfig::new("g1"),
        Box::new(FixedClock(ts(2026, 1, 5))),
        Box::new(FixedId),
    );

    let a = e1.process_rfa(&chain, rfa()).unwrap();
    let b = e2.process_rfa(&chain, rfa()).unwrap();
    assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
}

#[test]
fn p4_flipping_any_byte_of_proof_bundle_invalidates_signature() {
    let chain = corp_chain();
    let keypair = Keypair::generate();
    let public_key = keypair.public_key_b64();
    let engine = Engine::new(EngineConfig::new("g1").with_signing_key(keypair));
    let rfa = json!({"namespace": "corp", "requester_namespace": "corp", "requester_id": "u:q"});
    let mut packet = engine.process_rfa(&chain, rfa).unwrap();
    assert!(decisiongraph::verify_proof_packet(&packet, &public_key));

    packet.proof_bundle.context["requester_id"] = json!("u:tampered");
    assert!(!decisiongraph::verify_proof_packet(&packet, &public_key));
}

#[test]
fn p5_no_bridge_and_no_mutual_prefix_yields_no_cells_from_target() {
    let chain = corp_chain();
    let prev = chain.tail().unwrap().cell_id;
    let body = CellBody::Fact(FactBody {
        namespace: "corp.finance".into(),
        subject: "user:x".into(),
        predicate: "can_view".into(),
        object: "ledger:1".into(),
        confidence: 100,
        source_quality: SourceQuality::Verified,
        valid_from: ts(2026, 1, 2),
        valid_to: None,
    });
    let cell = Cell::new(CellType::Fact, ts(2026, 1, 2), prev, body, Proof::default()).unwrap();
    chain.append(cell, false).unwrap();

    for origin in ["corp.hr", "corp.eng", "corp.hr.payroll"] {
        let result = decisiongraph::query_facts(
            &chain,
            decisiongraph::QueryParams {
                namespace: "corp.finance".into(),
                requester_namespace: origin.into(),
                requester_id: "u:q".into(),
                subject: None,
                predicate: None,
                object: None,
                as_of_system_time: None,
            },
        )
        .unwrap();
        assert!(result.matches.is_empty(), "origin {origin} should not see corp.finance without a bridge");
    }
}

#[test]
fn p6_bridge_requires_both_owner_signatures() {
    let chain = corp_chain();
    let hr_owner = Keypair::generate();
    let finance_owner = Keypair::generate();

    for (ns, owner) in [("corp.hr", &hr_owner), ("corp.finance", &finance_owner)] {
        let prev = chain.tail().unwrap().cell_id;
        let def = CellBody::NamespaceDef(NamespaceDefBody { namespace: ns.into(), owner_signer_id: owner.public_key_b64() });
        let cell = Cell::new(
            CellType::NamespaceDef,
            ts(2026, 1, 2),
            prev,
            def,
            Proof { signer_id: Some("alice".into()), merkle_root: String::new(), ..Default::default() },
        )
        .unwrap();
        chain.append(cell, false).unwrap();
    }

    let bridge_body = CellBody::BridgeRule(BridgeBody { source_namespace: "corp.hr".into(), target_namespace: "corp.finance".into(), revoked: false });
    let prev = chain.tail().unwrap().cell_id;
    let unsigned = Cell::new(CellType::BridgeRule, ts(2026, 1, 3), prev.clone(), bridge_body.clone(), Proof::default()).unwrap();
    let seal = unsigned.seal_bytes();

    // Only one of the two required signatures present.
    let half_signed = Cell::new(
        CellType::BridgeRule,
        ts(2026, 1, 3),
        prev.clone(),
        bridge_body.clone(),
        Proof {
            signatures: Some(vec![SignatureEntry { signer_id: hr_owner.public_key_b64(), signature: hr_owner.sign(&seal) }]),
            merkle_root: String::new(),
            ..Default::default()
        },
    )
    .unwrap();
    let err = chain.append(half_signed, true).unwrap_err();
    assert!(matches!(err, ChainError::BridgeMissingDualSignature));

    let fully_signed = Cell::new(
        CellType::BridgeRule,
        ts(2026, 1, 3),
        prev,
        bridge_body,
        Proof {
            signatures: Some(vec![
                SignatureEntry { signer_id: hr_owner.public_key_b64(), signature: hr_owner.sign(&seal) },
                SignatureEntry { signer_id: finance_owner.public_key_b64(), signature: finance_owner.sign(&seal) },
            ]),
            merkle_root: String::new(),
            ..Default::default()
        },
    )
    .unwrap();
    chain.append(fully_signed, true).unwrap();
    assert_eq!(chain.len(), 4);
}

#[test]
fn p7_witness_set_equals_latest_policy_head_by_chain_position() {
    let chain = corp_chain();
    let registry = decisiongraph::WitnessRegistry::new(&chain);
    assert_eq!(registry.get_witness_set("corp").unwrap().witnesses, vec!["alice", "bob"]);

    for (witnesses, t) in [
        (vec!["alice", "bob", "carol"], 2),
        (vec!["alice", "carol"], 3),
        (vec!["carol"], 4),
    ] {
        let prev = chain.tail().unwrap().cell_id;
        let body = CellBody::PolicyHead(decisiongraph::cell::PolicyHeadBody {
            namespace: "corp".into(),
            witnesses: witnesses.iter().map(|s| s.to_string()).collect(),
            threshold: 1,
        });
        let cell = Cell::new(CellType::PolicyHead, ts(2026, 1, t), prev, body, Proof::default()).unwrap();
        chain.append(cell, false).unwrap();
        let registry = decisiongraph::WitnessRegistry::new(&chain);
        let current = registry.get_witness_set("corp").unwrap();
        assert_eq!(current.witnesses, witnesses);
    }
}

#[test]
fn p8_canonicalizer_idempotent_and_key_order_independent() {
    let a = json!({"z": 1, "a": {"y": null, "x": "value"}});
    let b = json!({"a": {"x": "value", "y": null}, "z": 1});

    let canon_a = canonical::to_canonical_bytes(&a);
    let canon_b = canonical::to_canonical_bytes(&b);
    assert_eq!(canon_a, canon_b);

    let a_value = serde_json::from_slice::<serde_json::Value>(&canon_a).unwrap();
    let reapplied = canonical::to_canonical_bytes(&a_value);
    assert_eq!(canon_a, reapplied);
}
