//! Stateless witness-set registry.
//!
//! A `WitnessSet` is an immutable value; "updating" one means appending a
//! new `policy_head` cell. The registry never stores a mutable witness set
//! of its own — it only holds a reference to the chain and re-derives the
//! current set on every call rather than caching a mutable copy.
//! The one-entry memo is keyed on `(chain tip id, namespace)` so it can
//! never observe a stale answer after a concurrent append.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::cell::{CellBody, CellType};
use crate::chain::Chain;

/// `{namespace, witnesses, threshold}` — immutable policy for a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessSet {
    pub namespace: String,
    pub witnesses: Vec<String>,
    pub threshold: u32,
}

/// Read-through view over a [`Chain`] that computes the current witness
/// set per namespace. Holds no state of its own beyond an optional memo.
pub struct WitnessRegistry<'a> {
    chain: &'a Chain,
    memo: Mutex<Option<((String, String), WitnessSet)>>,
}

impl<'a> WitnessRegistry<'a> {
    pub fn new(chain: &'a Chain) -> Self {
        WitnessRegistry { chain, memo: Mutex::new(None) }
    }

    /// The latest-by-chain-position witness set for `namespace`: either the
    /// genesis default or the most recent `policy_head` update naming it.
    pub fn get_witness_set(&self, namespace: &str) -> Option<WitnessSet> {
        let tip = self.chain.tail().map(|c| c.cell_id).unwrap_or_default();
        let key = (tip.clone(), namespace.to_string());

        if let Some((cached_key, ws)) = &*self.memo.lock().unwrap() {
            if *cached_key == key {
                return Some(ws.clone());
            }
        }

        let computed = self.compute(namespace);
        if let Some(ws) = &computed {
            *self.memo.lock().unwrap() = Some((key, ws.clone()));
        }
        computed
    }

    fn compute(&self, namespace: &str) -> Option<WitnessSet> {
        let mut latest: Option<WitnessSet> = None;
        for cell in self.chain.iter_in_order() {
            match &cell.body {
                CellBody::Genesis(g) if g.namespace == namespace => {
                    latest = Some(WitnessSet {
                        namespace: g.namespace.clone(),
                        witnesses: g.witnesses.clone(),
                        threshold: g.threshold,
                    });
                }
                CellBody::PolicyHead(p) if p.namespace == namespace => {
                    latest = Some(WitnessSet {
                        namespace: p.namespace.clone(),
                        witnesses: p.witnesses.clone(),
                        threshold: p.threshold,
                    });
                }
                _ => {}
            }
        }
        latest
    }

    /// Every namespace with a recorded witness set, mapped to its current
    /// value.
    pub fn get_all_witness_sets(&self) -> HashMap<String, WitnessSet> {
        let mut out: HashMap<String, WitnessSet> = HashMap::new();
        for cell in self.chain.iter_in_order() {
            match &cell.body {
                CellBody::Genesis(g) => {
                    out.insert(
                        g.namespace.clone(),
                        WitnessSet { namespace: g.namespace.clone(), witnesses: g.witnesses.clone(), threshold: g.threshold },
                    );
                }
                CellBody::PolicyHead(p) => {
                    out.insert(
                        p.namespace.clone(),
                        WitnessSet { namespace: p.namespace.clone(), witnesses: p.witnesses.clone(), threshold: p.threshold },
                    );
                }
                _ => {}
            }
        }
        out
    }
}

/// `cell_type == PolicyHead` filter, exposed for callers that only want
/// the raw update log rather than the resolved current value.
pub fn policy_head_history(chain: &Chain, namespace: &str) -> Vec<WitnessSet> {
    chain
        .find_by_type(CellType::PolicyHead)
        .into_iter()
        .filter_map(|c| match c.body {
            CellBody::PolicyHead(p) if p.namespace == namespace => {
                Some(WitnessSet { namespace: p.namespace, witnesses: p.witnesses, threshold: p.threshold })
            }
            _ => None,
        })
        .collect()
}
