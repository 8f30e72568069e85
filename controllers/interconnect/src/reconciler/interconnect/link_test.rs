//! Unit tests for Link reconciler

#[cfg(test)]
mod tests {
    use crate::store::{ObjectKey, ObjectStore};
    use crate::test_utils::*;
    use crds::{finalizers, ClusterPhase, IngressType, Link, LinkPhase};
    use kube::ResourceExt;
    use kube_runtime::controller::Action;
    use van_client::{IngressMode, VanCall, VanError, VanOp};

    fn current(ctx: &TestContext, name: &str) -> Option<Link> {
        ctx.memory.links.snapshot(&ObjectKey::cluster(name))
    }

    async fn reconcile(ctx: &TestContext, name: &str) -> Result<Action, crate::error::ControllerError> {
        let link = current(ctx, name).expect("link exists");
        ctx.reconciler.reconcile_link(&link).await
    }

    fn insert_link(ctx: &TestContext, phase: LinkPhase) {
        let mut link = create_test_link("l1", "c1", "c2");
        link.metadata.finalizers = Some(vec![finalizers::LINK.to_string()]);
        link.status_mut().phase = phase;
        ctx.memory.links.insert(link);
    }

    fn running_cluster(ctx: &TestContext, name: &str, ingress: IngressType) {
        ctx.memory
            .clusters
            .insert(create_test_cluster_with_status(name, ClusterPhase::Running, ingress));
        let mode = match ingress {
            IngressType::None => IngressMode::None,
            IngressType::LoadBalancer => IngressMode::LoadBalancer,
        };
        ctx.van.install_site(name, mode);
    }

    #[tokio::test]
    async fn test_new_link_gets_finalizer_then_linking() {
        let ctx = TestContext::new();
        ctx.memory.links.insert(create_test_link("l1", "c1", "c2"));

        reconcile(&ctx, "l1").await.unwrap();
        assert!(current(&ctx, "l1")
            .unwrap()
            .finalizers()
            .contains(&finalizers::LINK.to_string()));

        reconcile(&ctx, "l1").await.unwrap();
        assert_eq!(current(&ctx, "l1").unwrap().phase(), LinkPhase::Linking);
        assert_eq!(ctx.events.reasons_for("l1"), vec!["Linking"]);
    }

    #[tokio::test]
    async fn test_target_issues_when_only_target_has_load_balancer() {
        let ctx = TestContext::new();
        insert_link(&ctx, LinkPhase::Linking);
        running_cluster(&ctx, "c1", IngressType::None);
        running_cluster(&ctx, "c2", IngressType::LoadBalancer);

        let action = reconcile(&ctx, "l1").await.unwrap();
        assert_eq!(action, Action::await_change());
        assert_eq!(current(&ctx, "l1").unwrap().phase(), LinkPhase::Linked);
        assert_eq!(
            ctx.van.calls(),
            vec![
                VanCall::CreateTokenClaim {
                    cluster: "c2".to_string(),
                    name: "l1".to_string()
                },
                VanCall::CreateLink {
                    cluster: "c1".to_string(),
                    name: "l1".to_string()
                },
            ]
        );
        let established = ctx.van.link("l1").unwrap();
        assert_eq!(established.issuer, "c2");
        assert_eq!(established.connector, "c1");
    }

    #[tokio::test]
    async fn test_source_issues_when_both_have_load_balancer() {
        let ctx = TestContext::new();
        insert_link(&ctx, LinkPhase::Linking);
        running_cluster(&ctx, "c1", IngressType::LoadBalancer);
        running_cluster(&ctx, "c2", IngressType::LoadBalancer);

        reconcile(&ctx, "l1").await.unwrap();
        assert_eq!(ctx.van.link("l1").unwrap().issuer, "c1");
    }

    #[tokio::test]
    async fn test_no_issuer_waits_without_data_plane_calls() {
        let ctx = TestContext::new();
        insert_link(&ctx, LinkPhase::Linking);
        running_cluster(&ctx, "c1", IngressType::None);
        running_cluster(&ctx, "c2", IngressType::None);

        let action = reconcile(&ctx, "l1").await.unwrap();
        assert_eq!(action, Action::await_change());
        assert_eq!(current(&ctx, "l1").unwrap().phase(), LinkPhase::Linking);
        assert!(ctx.van.calls().is_empty());
        assert_eq!(ctx.events.reasons_for("l1"), vec!["NoIssuer"]);
    }

    #[tokio::test]
    async fn test_waits_for_sites_to_be_running() {
        let ctx = TestContext::new();
        insert_link(&ctx, LinkPhase::Linking);
        running_cluster(&ctx, "c1", IngressType::None);
        ctx.memory.clusters.insert(create_test_cluster_with_status(
            "c2",
            ClusterPhase::Configuring,
            IngressType::LoadBalancer,
        ));

        reconcile(&ctx, "l1").await.unwrap();
        assert_eq!(current(&ctx, "l1").unwrap().phase(), LinkPhase::Linking);
        assert!(ctx.van.calls().is_empty());
    }

    #[tokio::test]
    async fn test_waits_for_missing_cluster() {
        let ctx = TestContext::new();
        insert_link(&ctx, LinkPhase::Linking);
        running_cluster(&ctx, "c2", IngressType::LoadBalancer);

        reconcile(&ctx, "l1").await.unwrap();
        assert_eq!(current(&ctx, "l1").unwrap().phase(), LinkPhase::Linking);
        assert!(ctx.access.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_link_keeps_phase() {
        let ctx = TestContext::new();
        insert_link(&ctx, LinkPhase::Linking);
        running_cluster(&ctx, "c1", IngressType::None);
        running_cluster(&ctx, "c2", IngressType::LoadBalancer);
        ctx.van
            .fail_next(VanOp::CreateLink, VanError::PolicyDenied("link".to_string()));

        assert!(reconcile(&ctx, "l1").await.is_err());
        assert_eq!(current(&ctx, "l1").unwrap().phase(), LinkPhase::Linking);

        reconcile(&ctx, "l1").await.unwrap();
        assert_eq!(current(&ctx, "l1").unwrap().phase(), LinkPhase::Linked);
    }

    #[tokio::test]
    async fn test_deletion_unlinks_then_releases() {
        let ctx = TestContext::new();
        insert_link(&ctx, LinkPhase::Linking);
        running_cluster(&ctx, "c1", IngressType::None);
        running_cluster(&ctx, "c2", IngressType::LoadBalancer);
        reconcile(&ctx, "l1").await.unwrap();
        assert_eq!(ctx.van.link_count(), 1);

        ctx.memory.links.delete(&ObjectKey::cluster("l1")).await.unwrap();
        reconcile(&ctx, "l1").await.unwrap();
        assert_eq!(current(&ctx, "l1").unwrap().phase(), LinkPhase::Unlinking);

        reconcile(&ctx, "l1").await.unwrap();
        assert!(current(&ctx, "l1").is_none());
        assert_eq!(ctx.van.link_count(), 0);
        assert_eq!(
            ctx.van.calls().last(),
            Some(&VanCall::DeleteLink {
                source: "c1".to_string(),
                target: "c2".to_string(),
                name: "l1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_deletion_tolerates_missing_link() {
        let ctx = TestContext::new();
        insert_link(&ctx, LinkPhase::Unlinking);
        ctx.memory.links.delete(&ObjectKey::cluster("l1")).await.unwrap();

        reconcile(&ctx, "l1").await.unwrap();
        assert!(current(&ctx, "l1").is_none());
        assert_eq!(ctx.van.count(VanOp::DeleteLink), 1);
        assert_eq!(ctx.events.reasons_for("l1"), vec!["Unlinked"]);
    }

    #[tokio::test]
    async fn test_deletion_with_gone_cluster_skips_data_plane() {
        let ctx = TestContext::new();
        insert_link(&ctx, LinkPhase::Unlinking);
        ctx.memory.links.delete(&ObjectKey::cluster("l1")).await.unwrap();
        ctx.access.remove_cluster("c2");

        reconcile(&ctx, "l1").await.unwrap();
        assert!(current(&ctx, "l1").is_none());
        assert!(ctx.van.calls().is_empty());
    }
}
