//! The query engine: resolves fact queries against a [`Chain`], honoring
//! namespace visibility, and produces a [`ProofBundle`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::cell::{Cell, CellBody};
use crate::chain::Chain;
use crate::error::DgCode;
use crate::namespace::{self, Bridge};

/// A query could not be answered.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScholarError {
    #[error("as_of_system_time is before the chain's genesis timestamp")]
    TimeTravel,
}

impl ScholarError {
    pub fn code(&self) -> DgCode {
        DgCode::Unauthorized
    }
}

/// Validated parameters for `query_facts` (mirrors the RFA shape minus the
/// fields the engine has already schema/field-validated).
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub namespace: String,
    pub requester_namespace: String,
    pub requester_id: String,
    pub subject: Option<String>,
    pub predicate: Option<String>,
    pub object: Option<String>,
    pub as_of_system_time: Option<DateTime<Utc>>,
}

/// A dependency edge in a [`ProofBundle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from_cell_id: String,
    pub to_cell_id: String,
    pub relation: &'static str,
}

/// The minimal evidence set Scholar surfaces for a query.
#[derive(Debug, Clone, Serialize)]
pub struct ProofBundle {
    pub cells: Vec<Cell>,
    pub edges: Vec<Edge>,
    pub context: serde_json::Value,
}

impl ProofBundle {
    /// Deterministic human-readable audit report: same bundle -> identical
    /// text: identical bundle in, identical report out.
    pub fn to_audit_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("DecisionGraph proof bundle — {} cell(s), {} edge(s)\n", self.cells.len(), self.edges.len()));
        out.push_str(&format!("context: {}\n", self.context));
        out.push_str("--- cells (chain order) ---\n");
        for c in &self.cells {
            out.push_str(&format!(
                "[{}] {} ns={} id={}\n",
                crate::canonical::format_timestamp(c.header.timestamp),
                c.header.cell_type.as_str(),
                c.body.namespace(),
                c.cell_id,
            ));
        }
        out.push_str("--- edges ---\n");
        for e in &self.edges {
            out.push_str(&format!("{} --{}--> {}\n", e.from_cell_id, e.relation, e.to_cell_id));
        }
        out
    }

    /// Valid Graphviz DOT: one node per cell, one edge per dependency.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph decisiongraph {\n");
        for c in &self.cells {
            let label = format!("{}\\n{}", c.header.cell_type.as_str(), &c.cell_id[..12.min(c.cell_id.len())]);
            out.push_str(&format!("  \"{}\" [label=\"{}\"];\n", c.cell_id, label));
        }
        for e in &self.edges {
            out.push_str(&format!("  \"{}\" -> \"{}\" [label=\"{}\"];\n", e.from_cell_id, e.to_cell_id, e.relation));
        }
        out.push_str("}\n");
        out
    }
}

/// The result of `query_facts`, before being materialized into a
/// [`ProofBundle`].
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub matches: Vec<Cell>,
    pub supporting_rules: Vec<Cell>,
    pub namespace_defs: Vec<Cell>,
    pub bridges_consulted: Vec<Cell>,
    pub params: QueryParams,
}

impl QueryResult {
    pub fn to_proof_bundle(&self) -> ProofBundle {
        let mut cells: Vec<Cell> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut push = |cells: &mut Vec<Cell>, c: &Cell| {
            if seen.insert(c.cell_id.clone()) {
                cells.push(c.clone());
            }
        };
        for c in &self.matches {
            push(&mut cells, c);
        }
        for c in &self.supporting_rules {
            push(&mut cells, c);
        }
        for c in &self.namespace_defs {
            push(&mut cells, c);
        }
        for c in &self.bridges_consulted {
            push(&mut cells, c);
        }
        cells.sort_by(|a, b| (a.header.timestamp, &a.cell_id).cmp(&(b.header.timestamp, &b.cell_id)));

        let mut edges = Vec::new();
        for m in &self.matches {
            if let CellBody::Decision(d) = &m.body {
                for r in &self.supporting_rules {
                    if let CellBody::Rule(rb) = &r.body {
                        if rb.rule_id == d.rule_id && rb.rule_logic_hash == d.rule_logic_hash {
                            edges.push(Edge { from_cell_id: m.cell_id.clone(), to_cell_id: r.cell_id.clone(), relation: "anchors" });
                        }
                    }
                }
            }
            for nd in &self.namespace_defs {
                edges.push(Edge { from_cell_id: m.cell_id.clone(), to_cell_id: nd.cell_id.clone(), relation: "visible_via_namespace" });
            }
            for br in &self.bridges_consulted {
                edges.push(Edge { from_cell_id: m.cell_id.clone(), to_cell_id: br.cell_id.clone(), relation: "visible_via_bridge" });
            }
        }
        edges.sort_by(|a, b| (&a.from_cell_id, &a.to_cell_id, a.relation).cmp(&(&b.from_cell_id, &b.to_cell_id, b.relation)));

        let context = json!({
            "namespace": self.params.namespace,
            "requester_namespace": self.params.requester_namespace,
            "requester_id": self.params.requester_id,
            "subject": self.params.subject,
            "predicate": self.params.predicate,
            "object": self.params.object,
            "as_of_system_time": self.params.as_of_system_time.map(crate::canonical::format_timestamp),
        });

        ProofBundle { cells, edges, context }
    }
}

/// Build the bridge set active within `cells` (a chain prefix): the
/// latest-by-position `bridge_rule` per `(source, target)` pair wins.
fn bridges_in(cells: &[Cell]) -> Vec<Bridge> {
    let mut by_pair: std::collections::HashMap<(String, String), Bridge> = std::collections::HashMap::new();
    for c in cells {
        if let CellBody::BridgeRule(b) = &c.body {
            by_pair.insert(
                (b.source_namespace.clone(), b.target_namespace.clone()),
                Bridge { source: b.source_namespace.clone(), target: b.target_namespace.clone(), revoked: b.revoked },
            );
        }
    }
    by_pair.into_values().collect()
}

/// Resolve `params` against `chain`, honoring namespace visibility.
pub fn query_facts(chain: &Chain, params: QueryParams) -> Result<QueryResult, ScholarError> {
    let cells = match params.as_of_system_time {
        Some(t) => {
            let pos = chain.position_as_of(t).ok_or(ScholarError::TimeTravel)?;
            chain.prefix(pos)
        }
        None => chain.iter_in_order(),
    };

    let bridges = bridges_in(&cells);

    let mut matches = Vec::new();
    let mut bridges_consulted_pairs: std::collections::HashSet<(String, String)> = std::collections::HashSet::new();

    for c in &cells {
        let cell_ns = c.body.namespace();
        if !namespace::is_prefix(&params.namespace, cell_ns) && !namespace::is_prefix(cell_ns, &params.namespace) {
            continue;
        }
        if !namespace::visible(&params.requester_namespace, cell_ns, &bridges) {
            continue;
        }

        let (subject, predicate, object) = match &c.body {
            CellBody::Fact(f) => (Some(&f.subject), Some(&f.predicate), Some(&f.object)),
            CellBody::Decision(d) => (Some(&d.subject), Some(&d.predicate), Some(&d.object)),
            _ => continue,
        };

        if let Some(s) = &params.subject {
            if subject != Some(s) {
                continue;
            }
        }
        if let Some(p) = &params.predicate {
            if predicate != Some(p) {
                continue;
            }
        }
        if let Some(o) = &params.object {
            if object != Some(o) {
                continue;
            }
        }

        if !namespace::is_prefix(&params.requester_namespace, cell_ns) && !namespace::is_prefix(cell_ns, &params.requester_namespace) {
            // Visibility was only satisfied via a bridge; remember which one.
            for b in &bridges {
                if !b.revoked
                    && (namespace::is_prefix(&params.requester_namespace, &b.source) || params.requester_namespace == b.source)
                    && namespace::is_prefix(&b.target, cell_ns)
                {
                    bridges_consulted_pairs.insert((b.source.clone(), b.target.clone()));
                }
            }
        }

        matches.push(c.clone());
    }

    let supporting_rules: Vec<Cell> = matches
        .iter()
        .filter_map(|m| match &m.body {
            CellBody::Decision(d) => cells.iter().find(|c| match &c.body {
                CellBody::Rule(r) => r.rule_id == d.rule_id && r.rule_logic_hash == d.rule_logic_hash,
                _ => false,
            }),
            _ => None,
        })
        .cloned()
        .collect();

    let namespace_defs: Vec<Cell> = cells
        .iter()
        .filter(|c| matches!(&c.body, CellBody::NamespaceDef(nd) if namespace::is_prefix(&nd.namespace, &params.namespace) || namespace::is_prefix(&nd.namespace, &params.requester_namespace)))
        .cloned()
        .collect();

    let bridges_consulted: Vec<Cell> = cells
        .iter()
        .filter(|c| matches!(&c.body, CellBody::BridgeRule(b) if bridges_consulted_pairs.contains(&(b.source_namespace.clone(), b.target_namespace.clone()))))
        .cloned()
        .collect();

    Ok(QueryResult { matches, supporting_rules, namespace_defs, bridges_consulted, params })
}
