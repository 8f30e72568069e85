//! Unit tests for DeploymentService reconciler

#[cfg(test)]
mod tests {
    use crate::config::{DEPENDENCY_WAIT, LABEL_WAIT};
    use crate::naming::network_service_name;
    use crate::reconcile_helpers::{owner_names, update_labels};
    use crate::store::{ObjectKey, ObjectStore};
    use crate::test_utils::*;
    use crds::labels::{
        APP_PROJECT_ID_LABEL, CLUSTER_NAME_LABEL, CLUSTER_NAMESPACE_LABEL, NETWORK_NAME_LABEL, NETWORK_PROJECT_ID_LABEL,
    };
    use crds::{finalizers, DeploymentCluster, ExposePort, NetworkCluster, NetworkService, ObjectReference};
    use kube::ResourceExt;
    use kube_runtime::controller::Action;

    fn dc(ctx: &TestContext, name: &str) -> Option<DeploymentCluster> {
        ctx.memory
            .deployment_clusters
            .snapshot(&ObjectKey::namespaced(PROJECT_NAMESPACE, name))
    }

    fn network_service(ctx: &TestContext, svc_namespace: &str, svc_name: &str) -> Option<NetworkService> {
        let name = network_service_name("n1", "c1", svc_namespace, svc_name);
        ctx.memory.network_services.snapshot(&ObjectKey::cluster(name))
    }

    async fn reconcile(ctx: &TestContext, name: &str) -> Result<Action, crate::error::ControllerError> {
        let current = dc(ctx, name).expect("deployment cluster exists");
        ctx.reconciler.reconcile_deployment_service(&current).await
    }

    /// NetworkCluster n1-c1 and a labelled DeploymentCluster running `app-a` on c1
    fn setup(ctx: &TestContext) -> NetworkCluster {
        let nc = ctx.memory.network_clusters.insert(create_test_network_cluster("n1", "c1"));
        let mut placed = create_test_deployment_cluster("dc1", "d-uid", "c1", &["app-a"]);
        update_labels(&mut placed, &[(NETWORK_NAME_LABEL, "n1")]);
        ctx.memory.deployment_clusters.insert(placed);
        nc
    }

    async fn run(ctx: &TestContext) -> Action {
        reconcile(ctx, "dc1").await.unwrap();
        reconcile(ctx, "dc1").await.unwrap()
    }

    #[tokio::test]
    async fn test_binds_exposed_service() {
        let ctx = TestContext::new();
        let nc = setup(&ctx);
        ctx.members.apply_service(
            "c1",
            expose(create_test_member_service("default", "svc-a", "app-a", &[80, 443]), Some("80,443")),
        );

        assert_eq!(run(&ctx).await, Action::await_change());

        let ns = network_service(&ctx, "default", "svc-a").expect("network service created");
        assert_eq!(ns.spec.network_ref, ObjectReference::named("n1"));
        assert_eq!(ns.spec.cluster_ref, nc.spec.cluster_ref);
        assert_eq!(ns.spec.service_ref, ObjectReference::namespaced("default", "svc-a"));
        assert_eq!(ns.spec.expose_ports, vec![ExposePort { port: 80 }, ExposePort { port: 443 }]);
        assert_eq!(owner_names::<_, NetworkCluster>(&ns).collect::<Vec<_>>(), vec!["n1-c1"]);

        let labels = ns.labels();
        assert_eq!(labels.get(NETWORK_NAME_LABEL).map(String::as_str), Some("n1"));
        assert_eq!(labels.get(CLUSTER_NAMESPACE_LABEL).map(String::as_str), Some(PROJECT_NAMESPACE));
        assert_eq!(labels.get(CLUSTER_NAME_LABEL).map(String::as_str), Some("c1"));
        assert_eq!(labels.get(NETWORK_PROJECT_ID_LABEL).map(String::as_str), Some(PROJECT));

        let member = ctx.members.service("c1", "default", "svc-a").unwrap();
        assert!(member.finalizers().contains(&finalizers::DEPLOYMENT_SERVICE.to_string()));
        assert_eq!(ctx.access.calls(), vec![("c1".to_string(), PROJECT.to_string())]);
    }

    #[tokio::test]
    async fn test_port_fallback_to_service_spec() {
        let ctx = TestContext::new();
        setup(&ctx);
        ctx.members.apply_service(
            "c1",
            expose(create_test_member_service("default", "svc-b", "app-a", &[80, 8080]), None),
        );

        run(&ctx).await;

        let ns = network_service(&ctx, "default", "svc-b").unwrap();
        assert_eq!(ns.spec.expose_ports, vec![ExposePort { port: 80 }, ExposePort { port: 8080 }]);
    }

    #[tokio::test]
    async fn test_ignores_unannotated_and_foreign_services() {
        let ctx = TestContext::new();
        setup(&ctx);
        ctx.members
            .apply_service("c1", create_test_member_service("default", "plain", "app-a", &[80]));
        ctx.members.apply_service(
            "c1",
            expose(create_test_member_service("default", "other", "app-z", &[80]), None),
        );

        run(&ctx).await;

        assert!(ctx.memory.network_services.is_empty());
        assert!(ctx.members.service("c1", "default", "plain").unwrap().finalizers().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_ports_skip_only_that_service() {
        let ctx = TestContext::new();
        setup(&ctx);
        ctx.members.apply_service(
            "c1",
            expose(create_test_member_service("default", "bad", "app-a", &[80]), Some("http")),
        );
        ctx.members.apply_service(
            "c1",
            expose(create_test_member_service("default", "good", "app-a", &[80]), None),
        );

        assert_eq!(run(&ctx).await, Action::await_change());

        assert!(network_service(&ctx, "default", "bad").is_none());
        assert!(network_service(&ctx, "default", "good").is_some());
        assert!(ctx.members.service("c1", "default", "bad").unwrap().finalizers().is_empty());
        assert_eq!(ctx.events.reasons_for("dc1"), vec!["InvalidExposePorts"]);
    }

    #[tokio::test]
    async fn test_starts_service_watch() {
        let ctx = TestContext::new();
        setup(&ctx);

        run(&ctx).await;

        assert_eq!(
            ctx.reconciler.service_watcher().watched_clusters(),
            vec![(PROJECT_NAMESPACE.to_string(), "c1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_waits_for_network_cluster() {
        let ctx = TestContext::new();
        let mut placed = create_test_deployment_cluster("dc1", "d-uid", "c1", &["app-a"]);
        update_labels(&mut placed, &[(NETWORK_NAME_LABEL, "n1")]);
        ctx.memory.deployment_clusters.insert(placed);

        assert_eq!(run(&ctx).await, Action::requeue(DEPENDENCY_WAIT));
        assert!(ctx.access.calls().is_empty());
    }

    #[tokio::test]
    async fn test_waits_for_project_label() {
        let ctx = TestContext::new();
        let mut nc = create_test_network_cluster("n1", "c1");
        nc.metadata.labels.as_mut().unwrap().remove(NETWORK_PROJECT_ID_LABEL);
        ctx.memory.network_clusters.insert(nc);
        let mut placed = create_test_deployment_cluster("dc1", "d-uid", "c1", &["app-a"]);
        update_labels(&mut placed, &[(NETWORK_NAME_LABEL, "n1")]);
        placed.metadata.labels.as_mut().unwrap().remove(APP_PROJECT_ID_LABEL);
        ctx.memory.deployment_clusters.insert(placed);

        assert_eq!(run(&ctx).await, Action::requeue(LABEL_WAIT));
        assert!(ctx.access.calls().is_empty());
    }

    #[tokio::test]
    async fn test_member_service_deletion_removes_network_service() {
        let ctx = TestContext::new();
        setup(&ctx);
        ctx.members.apply_service(
            "c1",
            expose(create_test_member_service("default", "svc-a", "app-a", &[80]), None),
        );
        run(&ctx).await;
        assert!(network_service(&ctx, "default", "svc-a").is_some());

        ctx.members.delete_service("c1", "default", "svc-a");
        assert!(ctx.members.service("c1", "default", "svc-a").is_some());

        reconcile(&ctx, "dc1").await.unwrap();
        assert!(network_service(&ctx, "default", "svc-a").is_none());
        assert!(ctx.members.service("c1", "default", "svc-a").is_none());
    }

    #[tokio::test]
    async fn test_repeat_reconcile_writes_nothing() {
        let ctx = TestContext::new();
        setup(&ctx);
        ctx.members.apply_service(
            "c1",
            expose(create_test_member_service("default", "svc-a", "app-a", &[80]), None),
        );
        run(&ctx).await;

        let writes = ctx.memory.write_count();
        reconcile(&ctx, "dc1").await.unwrap();
        assert_eq!(ctx.memory.write_count(), writes);
    }

    #[tokio::test]
    async fn test_deletion_unbinds_and_stops_watch() {
        let ctx = TestContext::new();
        setup(&ctx);
        ctx.members.apply_service(
            "c1",
            expose(create_test_member_service("default", "svc-a", "app-a", &[80]), None),
        );
        run(&ctx).await;

        ctx.memory
            .deployment_clusters
            .delete(&ObjectKey::namespaced(PROJECT_NAMESPACE, "dc1"))
            .await
            .unwrap();
        reconcile(&ctx, "dc1").await.unwrap();

        assert!(dc(&ctx, "dc1").is_none());
        assert!(network_service(&ctx, "default", "svc-a").is_none());
        assert!(ctx.reconciler.service_watcher().watched_clusters().is_empty());
        let member = ctx.members.service("c1", "default", "svc-a").unwrap();
        assert!(member.finalizers().is_empty());
    }

    /// setup() with the project carried only by the NetworkCluster
    fn setup_network_project(ctx: &TestContext) {
        setup(ctx);
        let key = ObjectKey::namespaced(PROJECT_NAMESPACE, "dc1");
        let mut placed = ctx.memory.deployment_clusters.snapshot(&key).unwrap();
        placed.metadata.labels.as_mut().unwrap().remove(APP_PROJECT_ID_LABEL);
        ctx.memory.deployment_clusters.insert(placed);
        ctx.members.apply_service(
            "c1",
            expose(create_test_member_service("default", "svc-a", "app-a", &[80]), None),
        );
    }

    async fn delete_dc(ctx: &TestContext) {
        ctx.memory
            .deployment_clusters
            .delete(&ObjectKey::namespaced(PROJECT_NAMESPACE, "dc1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deletion_uses_network_cluster_project() {
        let ctx = TestContext::new();
        setup_network_project(&ctx);
        run(&ctx).await;
        assert!(network_service(&ctx, "default", "svc-a").is_some());

        delete_dc(&ctx).await;
        reconcile(&ctx, "dc1").await.unwrap();

        assert!(dc(&ctx, "dc1").is_none());
        let projects: Vec<String> = ctx.access.calls().into_iter().map(|(_, project)| project).collect();
        assert!(!projects.is_empty());
        assert!(projects.iter().all(|p| p == PROJECT), "projects used: {:?}", projects);
        let member = ctx.members.service("c1", "default", "svc-a").unwrap();
        assert!(member.finalizers().is_empty());
    }

    #[tokio::test]
    async fn test_deletion_without_any_project_skips_member_services() {
        let ctx = TestContext::new();
        setup_network_project(&ctx);
        run(&ctx).await;
        let calls = ctx.access.calls().len();

        ctx.memory
            .network_clusters
            .delete(&ObjectKey::cluster("n1-c1"))
            .await
            .unwrap();
        delete_dc(&ctx).await;
        reconcile(&ctx, "dc1").await.unwrap();

        assert!(dc(&ctx, "dc1").is_none());
        assert!(network_service(&ctx, "default", "svc-a").is_none());
        assert_eq!(ctx.access.calls().len(), calls);
        let member = ctx.members.service("c1", "default", "svc-a").unwrap();
        assert!(member.finalizers().contains(&finalizers::DEPLOYMENT_SERVICE.to_string()));
    }
}
