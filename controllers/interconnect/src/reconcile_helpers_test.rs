//! Unit tests for reconcile_helpers module

#[cfg(test)]
mod tests {
    use crate::reconcile_helpers::*;
    use crate::store::StoreError;
    use crds::labels::{EXPOSE_PORT_ANNOTATION, EXPOSE_PORTS_ANNOTATION, NETWORK_NAME_LABEL};
    use crds::{Network, NetworkCluster, NetworkClusterSpec, NetworkSpec, ObjectReference};
    use std::collections::BTreeMap;

    fn network(name: &str, uid: &str) -> Network {
        let mut network = Network::new(name, NetworkSpec::default());
        network.metadata.uid = Some(uid.to_string());
        network
    }

    fn network_cluster() -> NetworkCluster {
        NetworkCluster::new(
            "n1-c1",
            NetworkClusterSpec {
                network_ref: ObjectReference::named("n1"),
                cluster_ref: ObjectReference::namespaced("proj", "c1"),
            },
        )
    }

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_finalizer_add_is_idempotent() {
        let mut nc = network_cluster();

        assert!(add_finalizer(&mut nc, "a/finalizer"));
        assert!(!add_finalizer(&mut nc, "a/finalizer"));
        assert!(has_finalizer(&nc, "a/finalizer"));
        assert_eq!(nc.metadata.finalizers.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_finalizer_remove_only_named() {
        let mut nc = network_cluster();
        add_finalizer(&mut nc, "a/finalizer");
        add_finalizer(&mut nc, "b/finalizer");

        assert!(remove_finalizer(&mut nc, "a/finalizer"));
        assert!(!remove_finalizer(&mut nc, "a/finalizer"));
        assert!(has_finalizer(&nc, "b/finalizer"));
    }

    #[test]
    fn test_remove_finalizer_without_any() {
        let mut nc = network_cluster();
        assert!(!remove_finalizer(&mut nc, "a/finalizer"));
    }

    #[test]
    fn test_owner_refs_are_a_multiset_of_owners() {
        let mut nc = network_cluster();
        let n1 = network("n1", "u1");
        let n2 = network("n2", "u2");

        assert!(add_owner_ref(&mut nc, &n1));
        assert!(!add_owner_ref(&mut nc, &n1));
        assert!(add_owner_ref(&mut nc, &n2));
        assert_eq!(owner_count(&nc), 2);
        assert!(has_owner_ref(&nc, &n1));

        assert!(remove_owner_ref(&mut nc, &n1));
        assert!(!has_owner_ref(&nc, &n1));
        assert!(has_owner_ref(&nc, &n2));
        assert_eq!(owner_count(&nc), 1);
        assert_eq!(owner_names::<_, Network>(&nc).collect::<Vec<_>>(), vec!["n2"]);
    }

    #[test]
    fn test_owner_ref_needs_uid() {
        let mut nc = network_cluster();
        let unsaved = Network::new("n1", NetworkSpec::default());

        assert!(!add_owner_ref(&mut nc, &unsaved));
        assert_eq!(owner_count(&nc), 0);
    }

    #[test]
    fn test_owner_names_filters_by_kind() {
        let mut target = network("n9", "u9");
        let owner = network_cluster_with_uid();
        add_owner_ref(&mut target, &owner);

        assert_eq!(owner_names::<_, NetworkCluster>(&target).count(), 1);
        assert_eq!(owner_names::<_, Network>(&target).count(), 0);
    }

    fn network_cluster_with_uid() -> NetworkCluster {
        let mut nc = network_cluster();
        nc.metadata.uid = Some("nc-uid".to_string());
        nc
    }

    #[test]
    fn test_update_labels_reports_changes_only() {
        let mut nc = network_cluster();

        assert!(update_labels(&mut nc, &[(NETWORK_NAME_LABEL, "n1")]));
        assert!(!update_labels(&mut nc, &[(NETWORK_NAME_LABEL, "n1")]));
        assert!(update_labels(&mut nc, &[(NETWORK_NAME_LABEL, "n2")]));
        assert_eq!(label(&nc, NETWORK_NAME_LABEL), "n2");
        assert_eq!(label(&nc, "missing"), "");
    }

    #[test]
    fn test_parse_expose_ports_combines_annotations() {
        let ports = parse_expose_ports(&annotations(&[
            (EXPOSE_PORTS_ANNOTATION, "80,443"),
            (EXPOSE_PORT_ANNOTATION, "8080"),
        ]))
        .unwrap();
        assert_eq!(ports, vec![80, 443, 8080]);
    }

    #[test]
    fn test_parse_expose_ports_skips_empty_entries() {
        let ports = parse_expose_ports(&annotations(&[(EXPOSE_PORTS_ANNOTATION, "80,,443,")])).unwrap();
        assert_eq!(ports, vec![80, 443]);
        assert!(parse_expose_ports(&BTreeMap::new()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_expose_ports_rejects_out_of_range() {
        assert!(parse_expose_ports(&annotations(&[(EXPOSE_PORT_ANNOTATION, "70000")])).is_err());
        assert!(parse_expose_ports(&annotations(&[(EXPOSE_PORTS_ANNOTATION, "http")])).is_err());
    }

    #[test]
    fn test_ignore_not_found() {
        let missing: Result<(), StoreError> = Err(StoreError::NotFound("x".to_string()));
        assert!(ignore_not_found(missing).unwrap().is_none());

        let conflict: Result<(), StoreError> = Err(StoreError::Conflict("x".to_string()));
        assert!(ignore_not_found(conflict).is_err());
    }
}
