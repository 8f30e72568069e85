//! Unit tests for NetworkCluster reconciler

#[cfg(test)]
mod tests {
    use crate::config::DEPENDENCY_WAIT;
    use crate::reconcile_helpers::{owner_count, owner_names};
    use crate::store::{ObjectKey, ObjectStore};
    use crate::test_utils::*;
    use crds::labels::{CLUSTER_NAME_LABEL, CLUSTER_NAMESPACE_LABEL, INTERCONNECT_PROJECT_ID_LABEL};
    use crds::{finalizers, Cluster, NetworkCluster, ObjectReference};
    use kube::ResourceExt;
    use kube_runtime::controller::Action;

    fn cluster(ctx: &TestContext, name: &str) -> Option<Cluster> {
        ctx.memory.clusters.snapshot(&ObjectKey::cluster(name))
    }

    fn nc(ctx: &TestContext, name: &str) -> Option<NetworkCluster> {
        ctx.memory.network_clusters.snapshot(&ObjectKey::cluster(name))
    }

    async fn reconcile(ctx: &TestContext, name: &str) -> Result<Action, crate::error::ControllerError> {
        let current = nc(ctx, name).expect("network cluster exists");
        ctx.reconciler.reconcile_network_cluster(&current).await
    }

    async fn bound(ctx: &TestContext, network: &str, member: &str) {
        ctx.memory
            .network_clusters
            .insert(create_test_network_cluster(network, member));
        let name = format!("{}-{}", network, member);
        reconcile(ctx, &name).await.unwrap();
        reconcile(ctx, &name).await.unwrap();
    }

    #[tokio::test]
    async fn test_creates_cluster() {
        let ctx = TestContext::new();
        bound(&ctx, "n1", "c1").await;

        assert!(nc(&ctx, "n1-c1")
            .unwrap()
            .finalizers()
            .contains(&finalizers::NETWORK_CLUSTER.to_string()));
        let c1 = cluster(&ctx, "c1").expect("cluster created");
        assert_eq!(c1.spec.cluster_ref, ObjectReference::namespaced(PROJECT_NAMESPACE, "c1"));
        assert_eq!(owner_names::<_, NetworkCluster>(&c1).collect::<Vec<_>>(), vec!["n1-c1"]);
        let labels = c1.labels();
        assert_eq!(labels.get(CLUSTER_NAMESPACE_LABEL).map(String::as_str), Some(PROJECT_NAMESPACE));
        assert_eq!(labels.get(CLUSTER_NAME_LABEL).map(String::as_str), Some("c1"));
        assert_eq!(labels.get(INTERCONNECT_PROJECT_ID_LABEL).map(String::as_str), Some(PROJECT));
    }

    #[tokio::test]
    async fn test_second_network_shares_cluster() {
        let ctx = TestContext::new();
        bound(&ctx, "n1", "c1").await;
        bound(&ctx, "n2", "c1").await;
        reconcile(&ctx, "n1-c1").await.unwrap();

        assert_eq!(ctx.memory.clusters.len(), 1);
        assert_eq!(owner_count(&cluster(&ctx, "c1").unwrap()), 2);
    }

    #[tokio::test]
    async fn test_deletion_keeps_shared_cluster() {
        let ctx = TestContext::new();
        bound(&ctx, "n1", "c1").await;
        bound(&ctx, "n2", "c1").await;

        ctx.memory
            .network_clusters
            .delete(&ObjectKey::cluster("n1-c1"))
            .await
            .unwrap();
        reconcile(&ctx, "n1-c1").await.unwrap();

        assert!(nc(&ctx, "n1-c1").is_none());
        let c1 = cluster(&ctx, "c1").unwrap();
        assert_eq!(owner_names::<_, NetworkCluster>(&c1).collect::<Vec<_>>(), vec!["n2-c1"]);
    }

    #[tokio::test]
    async fn test_last_owner_deletes_cluster() {
        let ctx = TestContext::new();
        bound(&ctx, "n1", "c1").await;

        ctx.memory
            .network_clusters
            .delete(&ObjectKey::cluster("n1-c1"))
            .await
            .unwrap();
        reconcile(&ctx, "n1-c1").await.unwrap();

        assert!(nc(&ctx, "n1-c1").is_none());
        assert!(cluster(&ctx, "c1").is_none());
    }

    #[tokio::test]
    async fn test_terminating_cluster_is_retried() {
        let ctx = TestContext::new();
        let mut held = create_test_cluster("c1");
        held.metadata.finalizers = Some(vec![finalizers::CLUSTER.to_string()]);
        ctx.memory.clusters.insert(held);
        ctx.memory.clusters.delete(&ObjectKey::cluster("c1")).await.unwrap();
        ctx.memory
            .network_clusters
            .insert(create_test_network_cluster("n1", "c1"));

        reconcile(&ctx, "n1-c1").await.unwrap();
        let action = reconcile(&ctx, "n1-c1").await.unwrap();
        assert_eq!(action, Action::requeue(DEPENDENCY_WAIT));
    }
}
