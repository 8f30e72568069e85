//! Field indexes
//!
//! Derived lookup keys for the objects the reconcilers and watch mappers
//! select on. Every accessor returns `None` when the object has no value for
//! the field, so an empty reference never matches anything.

use crds::labels::NETWORK_NAME_LABEL;
use crds::{Deployment, DeploymentCluster, Link, NetworkCluster, NetworkLink, NetworkService};
use kube::ResourceExt;

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

fn label<'a, K: ResourceExt>(obj: &'a K, key: &str) -> Option<&'a str> {
    obj.labels().get(key).map(String::as_str).and_then(non_empty)
}

/// Indexed fields; kinds override the ones they carry
pub trait IndexFields {
    fn network_name(&self) -> Option<&str> {
        None
    }

    fn deployment_uid(&self) -> Option<&str> {
        None
    }

    fn cluster_namespace(&self) -> Option<&str> {
        None
    }

    fn cluster_name(&self) -> Option<&str> {
        None
    }

    fn source_name(&self) -> Option<&str> {
        None
    }

    fn target_name(&self) -> Option<&str> {
        None
    }
}

impl IndexFields for Deployment {
    fn network_name(&self) -> Option<&str> {
        non_empty(&self.spec.network_ref.name)
    }

    fn deployment_uid(&self) -> Option<&str> {
        self.metadata.uid.as_deref().and_then(non_empty)
    }
}

impl IndexFields for DeploymentCluster {
    /// Propagated by the Deployment reconciler
    fn network_name(&self) -> Option<&str> {
        label(self, NETWORK_NAME_LABEL)
    }

    fn deployment_uid(&self) -> Option<&str> {
        non_empty(&self.spec.deployment_id)
    }

    fn cluster_namespace(&self) -> Option<&str> {
        non_empty(&self.spec.namespace)
    }

    fn cluster_name(&self) -> Option<&str> {
        non_empty(&self.spec.cluster_id)
    }
}

impl IndexFields for NetworkCluster {
    fn network_name(&self) -> Option<&str> {
        non_empty(&self.spec.network_ref.name)
    }

    fn cluster_namespace(&self) -> Option<&str> {
        self.spec.cluster_ref.namespace.as_deref().and_then(non_empty)
    }

    fn cluster_name(&self) -> Option<&str> {
        non_empty(&self.spec.cluster_ref.name)
    }
}

impl IndexFields for NetworkLink {
    fn network_name(&self) -> Option<&str> {
        non_empty(&self.spec.network_ref.name)
    }

    fn source_name(&self) -> Option<&str> {
        non_empty(&self.spec.source_cluster_ref.name)
    }

    fn target_name(&self) -> Option<&str> {
        non_empty(&self.spec.target_cluster_ref.name)
    }
}

impl IndexFields for NetworkService {
    fn network_name(&self) -> Option<&str> {
        non_empty(&self.spec.network_ref.name)
    }

    fn cluster_namespace(&self) -> Option<&str> {
        self.spec.cluster_ref.namespace.as_deref().and_then(non_empty)
    }

    fn cluster_name(&self) -> Option<&str> {
        non_empty(&self.spec.cluster_ref.name)
    }
}

impl IndexFields for Link {
    fn source_name(&self) -> Option<&str> {
        non_empty(&self.spec.source_cluster_ref.name)
    }

    fn target_name(&self) -> Option<&str> {
        non_empty(&self.spec.target_cluster_ref.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{DeploymentClusterSpec, DeploymentSpec, LinkSpec, NetworkClusterSpec, ObjectReference};
    use std::collections::BTreeMap;

    #[test]
    fn test_deployment_fields() {
        let mut deployment = Deployment::new(
            "d1",
            DeploymentSpec {
                network_ref: ObjectReference::named("n1"),
            },
        );
        assert_eq!(deployment.network_name(), Some("n1"));
        assert_eq!(deployment.deployment_uid(), None);

        deployment.metadata.uid = Some("u1".to_string());
        deployment.spec.network_ref.name.clear();
        assert_eq!(deployment.deployment_uid(), Some("u1"));
        assert_eq!(deployment.network_name(), None);
    }

    #[test]
    fn test_deployment_cluster_fields() {
        let mut dc = DeploymentCluster::new(
            "dc1",
            DeploymentClusterSpec {
                deployment_id: "u1".to_string(),
                cluster_id: "c1".to_string(),
                namespace: "proj".to_string(),
            },
        );
        assert_eq!(dc.network_name(), None);

        dc.metadata.labels = Some(BTreeMap::from([(NETWORK_NAME_LABEL.to_string(), String::new())]));
        assert_eq!(dc.network_name(), None);

        dc.metadata.labels = Some(BTreeMap::from([(NETWORK_NAME_LABEL.to_string(), "n1".to_string())]));
        assert_eq!(dc.network_name(), Some("n1"));
        assert_eq!(dc.deployment_uid(), Some("u1"));
        assert_eq!(dc.cluster_namespace(), Some("proj"));
        assert_eq!(dc.cluster_name(), Some("c1"));
    }

    #[test]
    fn test_network_cluster_fields() {
        let nc = NetworkCluster::new(
            "n1-c1",
            NetworkClusterSpec {
                network_ref: ObjectReference::named("n1"),
                cluster_ref: ObjectReference::namespaced("proj", "c1"),
            },
        );
        assert_eq!(nc.network_name(), Some("n1"));
        assert_eq!(nc.cluster_namespace(), Some("proj"));
        assert_eq!(nc.cluster_name(), Some("c1"));
        assert_eq!(nc.source_name(), None);
    }

    #[test]
    fn test_link_fields() {
        let link = Link::new(
            "c2-x",
            LinkSpec {
                source_cluster_ref: ObjectReference::named("c1"),
                target_cluster_ref: ObjectReference::named("c2"),
            },
        );
        assert_eq!(link.source_name(), Some("c1"));
        assert_eq!(link.target_name(), Some("c2"));
        assert_eq!(link.network_name(), None);
    }
}
