use crate::store::StoreError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed intent. Always reported before any state is touched.
    #[error("{0}")]
    Validation(String),

    /// An allocator could not satisfy a request. The pool is unchanged.
    #[error(transparent)]
    Allocation(#[from] netmaster_resources::Error),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("network {network} has {endpoints} active endpoints")]
    NetworkHasActiveEndpoints { network: String, endpoints: u32 },

    #[error("endpoint group {group} has {endpoints} active endpoints")]
    GroupHasActiveEndpoints { group: String, endpoints: u32 },

    #[error("tenant {tenant} has {networks} networks")]
    TenantHasNetworks { tenant: String, networks: usize },

    #[error("endpoint group {group} not found")]
    GroupNotFound { group: String },

    #[error("policy attachment {0} already exists")]
    AttachmentExists(String),

    #[error("policy attachment {0} not found")]
    AttachmentNotFound(String),

    #[error("rule {rule} already exists on {epg_policy}")]
    RuleExists { rule: String, epg_policy: String },

    #[error("rule {rule} not found on {epg_policy}")]
    RuleNotFound { rule: String, epg_policy: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("rule engine: {0:#}")]
    RuleEngine(anyhow::Error),

    /// A policy attachment failed part-way. Directional rules installed for
    /// earlier rules of the policy are left in place.
    #[error("failed to attach {epg_policy}: {source}")]
    AttachFailed {
        epg_policy: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{} operations failed: {}", .0.len(), join(.0))]
    Aggregate(Vec<Error>),
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// === impl Error ===

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Collapses a list of failures into a single result.
    pub fn aggregate(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregate(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmaster_resources::TagKind;

    #[test]
    fn allocation_errors_surface_verbatim() {
        let err = Error::from(netmaster_resources::Error::TagUnavailable {
            kind: TagKind::Vxlan,
            tag: 2001,
        });
        assert_eq!(
            err.to_string(),
            "requested vxlan not available - vxlan:2001"
        );
    }

    #[test]
    fn aggregate() {
        assert!(Error::aggregate(vec![]).is_ok());
        assert!(matches!(
            Error::aggregate(vec![Error::invalid("a")]),
            Err(Error::Validation(_))
        ));
        let err = Error::aggregate(vec![Error::invalid("a"), Error::invalid("b")]).unwrap_err();
        assert_eq!(err.to_string(), "2 operations failed: a; b");
    }
}
