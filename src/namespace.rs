//! Hierarchical namespace isolation and cryptographic bridges.

/// Failures in namespace/bridge reasoning that are not simple syntax errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NamespaceError {
    #[error("namespace {0:?} is not declared")]
    Undeclared(String),
    #[error("bridge endpoint {0:?} refers to an undeclared namespace")]
    OrphanBridge(String),
    #[error("bridge_rule requires signatures from both namespace owners")]
    MissingDualSignature,
}

impl NamespaceError {
    pub fn code(&self) -> crate::error::DgCode {
        crate::error::DgCode::Unauthorized
    }
}

/// `true` iff `a == b` or `b` begins with `a.`.
pub fn is_prefix(a: &str, b: &str) -> bool {
    a == b || b.strip_prefix(a).is_some_and(|rest| rest.starts_with('.'))
}

/// A bridge endpoint pair, active unless revoked by a later `bridge_rule`
/// A bridge cell with `revoked = true` shadows every earlier grant for the
/// same pair without deleting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bridge {
    pub source: String,
    pub target: String,
    pub revoked: bool,
}

/// `true` iff an origin namespace `o` may see a target namespace `t`,
/// directly (mutual prefix) or via an active bridge.
pub fn visible(o: &str, t: &str, bridges: &[Bridge]) -> bool {
    if is_prefix(o, t) || is_prefix(t, o) {
        return true;
    }
    bridges.iter().any(|b| {
        !b.revoked && (is_prefix(o, &b.source) || o == b.source) && is_prefix(&b.target, t)
    })
}
