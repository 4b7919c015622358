//! Visibility Intents
//!
//! The four mutually exclusive target states for a volume's host visibility.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Desired host visibility for a volume
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityIntent {
    /// Every host in the volume's nPod, under one shared LUN id
    AllPodHosts,
    /// Exactly one named host
    SpecificHost(String),
    /// Exactly the host that owns the volume
    OwnerOnly,
    /// No host at all
    NoAccess,
}

impl VisibilityIntent {
    /// Build an intent from a declarative state name
    ///
    /// Accepts `present`, `all`, `host`, `local` and `absent`. `host`
    /// requires the UUID of the target host.
    pub fn from_state(state: &str, host_uuid: Option<&str>) -> Result<Self> {
        match state {
            "present" | "all" => Ok(VisibilityIntent::AllPodHosts),
            "host" => host_uuid
                .filter(|h| !h.is_empty())
                .map(|h| VisibilityIntent::SpecificHost(h.to_string()))
                .ok_or_else(|| {
                    Error::Configuration("state is host but host_uuid is missing".into())
                }),
            "local" => Ok(VisibilityIntent::OwnerOnly),
            "absent" => Ok(VisibilityIntent::NoAccess),
            other => Err(Error::Configuration(format!(
                "unknown volume access state '{}', expected one of: present, all, host, local, absent",
                other
            ))),
        }
    }
}

impl std::fmt::Display for VisibilityIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisibilityIntent::AllPodHosts => write!(f, "all"),
            VisibilityIntent::SpecificHost(host) => write!(f, "host({})", host),
            VisibilityIntent::OwnerOnly => write!(f, "local"),
            VisibilityIntent::NoAccess => write!(f, "absent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_state_names() {
        assert_eq!(
            VisibilityIntent::from_state("present", None).unwrap(),
            VisibilityIntent::AllPodHosts
        );
        assert_eq!(
            VisibilityIntent::from_state("all", None).unwrap(),
            VisibilityIntent::AllPodHosts
        );
        assert_eq!(
            VisibilityIntent::from_state("local", Some("ignored")).unwrap(),
            VisibilityIntent::OwnerOnly
        );
        assert_eq!(
            VisibilityIntent::from_state("absent", None).unwrap(),
            VisibilityIntent::NoAccess
        );
        assert_eq!(
            VisibilityIntent::from_state("host", Some("host-2")).unwrap(),
            VisibilityIntent::SpecificHost("host-2".into())
        );
    }

    #[test]
    fn test_host_state_requires_host() {
        assert_matches!(
            VisibilityIntent::from_state("host", None),
            Err(Error::Configuration(_))
        );
        assert_matches!(
            VisibilityIntent::from_state("host", Some("")),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_unknown_state() {
        assert_matches!(
            VisibilityIntent::from_state("exported", None),
            Err(Error::Configuration(msg)) if msg.contains("exported")
        );
    }
}
