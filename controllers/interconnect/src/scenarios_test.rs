//! End-to-end fabric scenarios
//!
//! Every reconciler runs over every object, round after round, until a full
//! round writes nothing and calls nothing on the data plane.

#[cfg(test)]
mod tests {
    use crate::naming::{link_name, network_cluster_name, network_link_name, network_service_name, service_name};
    use crate::reconcile_helpers::{is_deleting, owner_count};
    use crate::store::{ObjectKey, ObjectStore};
    use crate::test_utils::*;
    use crds::{
        Cluster, ClusterPhase, ExposePort, IngressType, Link, LinkPhase, NetworkCluster, NetworkClusterRole,
        NetworkLink, NetworkService, Service, ServicePhase, finalizers,
    };
    use kube::ResourceExt;
    use van_client::{IngressMode, VanOp};

    const MAX_ROUNDS: usize = 30;

    /// Reconcile the current version of every object in `$store`
    macro_rules! reconcile_all {
        ($ctx:expr, $errors:expr, $store:ident, $reconcile:ident) => {
            for obj in $ctx.memory.$store.all() {
                let key = ObjectKey::of(&obj);
                let Some(current) = $ctx.memory.$store.snapshot(&key) else {
                    continue;
                };
                if let Err(e) = $ctx.reconciler.$reconcile(&current).await {
                    $errors.push(format!("{} {}: {}", stringify!($reconcile), key, e));
                }
            }
        };
    }

    /// One pass of every reconciler; returns the failures
    async fn round(ctx: &TestContext) -> Vec<String> {
        let mut errors = Vec::new();
        reconcile_all!(ctx, errors, deployments, reconcile_deployment);
        reconcile_all!(ctx, errors, deployment_clusters, reconcile_deployment_cluster);
        reconcile_all!(ctx, errors, deployment_clusters, reconcile_deployment_service);
        reconcile_all!(ctx, errors, network_clusters, reconcile_network_cluster);
        reconcile_all!(ctx, errors, network_services, reconcile_network_cluster_status);
        reconcile_all!(ctx, errors, network_clusters, reconcile_network_cluster_role);
        reconcile_all!(ctx, errors, network_clusters, reconcile_network_cluster_link);
        reconcile_all!(ctx, errors, network_links, reconcile_network_link);
        reconcile_all!(ctx, errors, network_services, reconcile_network_service);
        reconcile_all!(ctx, errors, clusters, reconcile_cluster);
        reconcile_all!(ctx, errors, services, reconcile_cluster_status);
        reconcile_all!(ctx, errors, links, reconcile_link);
        reconcile_all!(ctx, errors, services, reconcile_service);
        errors
    }

    async fn converge(ctx: &mut TestContext) {
        let mut errors = Vec::new();
        for _ in 0..MAX_ROUNDS {
            let writes = ctx.memory.write_count();
            let calls = ctx.van.calls().len();
            errors = round(ctx).await;
            while let Ok(Some(_)) = ctx.member_events.try_next() {}
            if errors.is_empty() && ctx.memory.write_count() == writes && ctx.van.calls().len() == calls {
                return;
            }
        }
        panic!("fabric did not settle in {} rounds, last errors: {:?}", MAX_ROUNDS, errors);
    }

    fn dc_name(deployment: &str, cluster: &str) -> String {
        format!("{}-{}", deployment, cluster)
    }

    /// Deployment `name` on `network` with one DeploymentCluster on `cluster` running `app`
    fn deploy(ctx: &TestContext, name: &str, network: &str, cluster: &str, app: &str) {
        let deployment = ctx.memory.deployments.insert(create_test_deployment(name, network));
        let uid = deployment.uid().expect("uid assigned on insert");
        ctx.memory
            .deployment_clusters
            .insert(create_test_deployment_cluster(&dc_name(name, cluster), &uid, cluster, &[app]));
    }

    /// Delete a Deployment together with its DeploymentCluster on `cluster`
    async fn undeploy(ctx: &TestContext, name: &str, cluster: &str) {
        ctx.memory
            .deployments
            .delete(&ObjectKey::namespaced(PROJECT_NAMESPACE, name))
            .await
            .unwrap();
        ctx.memory
            .deployment_clusters
            .delete(&ObjectKey::namespaced(PROJECT_NAMESPACE, dc_name(name, cluster)))
            .await
            .unwrap();
    }

    fn nc(ctx: &TestContext, network: &str, cluster: &str) -> Option<NetworkCluster> {
        ctx.memory
            .network_clusters
            .snapshot(&ObjectKey::cluster(network_cluster_name(network, cluster)))
    }

    fn network_service(ctx: &TestContext, cluster: &str, service: &str) -> Option<NetworkService> {
        ctx.memory
            .network_services
            .snapshot(&ObjectKey::cluster(network_service_name("n1", cluster, "default", service)))
    }

    fn network_link(ctx: &TestContext, hub: &str, spoke: &str) -> Option<NetworkLink> {
        ctx.memory
            .network_links
            .snapshot(&ObjectKey::cluster(network_link_name("n1", hub, spoke)))
    }

    fn cluster(ctx: &TestContext, name: &str) -> Option<Cluster> {
        ctx.memory.clusters.snapshot(&ObjectKey::cluster(name))
    }

    fn fabric_link(ctx: &TestContext) -> Option<Link> {
        ctx.memory
            .links
            .snapshot(&ObjectKey::cluster(link_name("c1", "c2").name))
    }

    fn fabric_service(ctx: &TestContext, cluster: &str, service: &str) -> Option<Service> {
        ctx.memory
            .services
            .snapshot(&ObjectKey::cluster(service_name(cluster, PROJECT_NAMESPACE, service)))
    }

    /// Network n1: d1 on c1 exporting default/svc-a on 80 and 443
    async fn single_cluster() -> TestContext {
        let mut ctx = TestContext::new();
        deploy(&ctx, "d1", "n1", "c1", "app-a");
        ctx.members.apply_service(
            "c1",
            expose(create_test_member_service("default", "svc-a", "app-a", &[80, 443]), None),
        );
        converge(&mut ctx).await;
        ctx
    }

    /// [`single_cluster`] plus d2 on c2, which exports nothing
    async fn hub_and_spoke() -> TestContext {
        let mut ctx = single_cluster().await;
        deploy(&ctx, "d2", "n1", "c2", "app-b");
        converge(&mut ctx).await;
        ctx
    }

    /// Export default/svc-b from c2
    async fn promote_c2(ctx: &mut TestContext) {
        ctx.members.apply_service(
            "c2",
            expose(create_test_member_service("default", "svc-b", "app-b", &[8080]), None),
        );
        converge(ctx).await;
    }

    #[tokio::test]
    async fn test_single_cluster_expose() {
        let ctx = single_cluster().await;

        assert_eq!(nc(&ctx, "n1", "c1").expect("network cluster").role(), NetworkClusterRole::Hub);

        let ns = network_service(&ctx, "c1", "svc-a").expect("network service");
        assert_eq!(ns.spec.expose_ports, vec![ExposePort { port: 80 }, ExposePort { port: 443 }]);

        let c1 = cluster(&ctx, "c1").expect("cluster");
        assert_eq!(c1.phase(), ClusterPhase::Running);
        assert_eq!(c1.ingress(), IngressType::LoadBalancer);
        assert_eq!(ctx.van.site("c1"), Some(IngressMode::LoadBalancer));

        let service = fabric_service(&ctx, "c1", "svc-a").expect("fabric service");
        assert_eq!(service.phase(), ServicePhase::Exposed);
        assert_eq!(service.port_numbers(), vec![80, 443]);

        assert!(ctx.memory.network_links.is_empty());
        assert!(ctx.memory.links.is_empty());
        assert!(ctx
            .members
            .service("c1", "default", "svc-a")
            .unwrap()
            .finalizers()
            .contains(&finalizers::DEPLOYMENT_SERVICE.to_string()));
    }

    #[tokio::test]
    async fn test_hub_and_spoke() {
        let ctx = hub_and_spoke().await;

        assert_eq!(nc(&ctx, "n1", "c2").expect("network cluster").role(), NetworkClusterRole::Spoke);

        let nl = network_link(&ctx, "c1", "c2").expect("network link into the hub");
        assert_eq!(nl.spec.source_cluster_ref.name, "c2");
        assert_eq!(nl.spec.target_cluster_ref.name, "c1");
        assert_eq!(ctx.memory.network_links.len(), 1);

        let link = fabric_link(&ctx).expect("fabric link");
        assert_eq!(link.phase(), LinkPhase::Linked);
        assert_eq!(link.spec.source_cluster_ref.name, "c1");
        assert_eq!(link.spec.target_cluster_ref.name, "c2");
        assert!(link.name_any().starts_with("c2-"));

        let established = ctx.van.link(&link.name_any()).expect("data-plane link");
        assert_eq!(established.issuer, "c1");
        assert_eq!(established.connector, "c2");

        let c2 = cluster(&ctx, "c2").expect("cluster");
        assert_eq!(c2.phase(), ClusterPhase::Running);
        assert_eq!(c2.ingress(), IngressType::None);
    }

    #[tokio::test]
    async fn test_promotion_reuses_fabric_link() {
        let mut ctx = hub_and_spoke().await;
        let links_created = ctx.van.count(VanOp::CreateLink);

        promote_c2(&mut ctx).await;

        assert_eq!(nc(&ctx, "n1", "c2").unwrap().role(), NetworkClusterRole::Hub);
        let back = network_link(&ctx, "c2", "c1").expect("network link into c2");
        assert_eq!(back.spec.source_cluster_ref.name, "c1");
        assert_eq!(back.spec.target_cluster_ref.name, "c2");
        assert_eq!(ctx.memory.network_links.len(), 2);

        assert_eq!(ctx.memory.links.len(), 1);
        let link = fabric_link(&ctx).unwrap();
        assert_eq!(owner_count(&link), 2);
        assert_eq!(link.phase(), LinkPhase::Linked);
        assert_eq!(ctx.van.count(VanOp::CreateLink), links_created);

        assert_eq!(cluster(&ctx, "c2").unwrap().ingress(), IngressType::LoadBalancer);
    }

    #[tokio::test]
    async fn test_ports_fall_back_to_service_spec() {
        let mut ctx = TestContext::new();
        deploy(&ctx, "d1", "n1", "c1", "app-a");
        ctx.members.apply_service(
            "c1",
            expose(create_test_member_service("default", "web", "app-a", &[80, 8080]), None),
        );
        converge(&mut ctx).await;

        let ns = network_service(&ctx, "c1", "web").expect("network service");
        assert_eq!(ns.spec.expose_ports, vec![ExposePort { port: 80 }, ExposePort { port: 8080 }]);
        assert_eq!(fabric_service(&ctx, "c1", "web").unwrap().port_numbers(), vec![80, 8080]);
    }

    #[tokio::test]
    async fn test_teardown_keeps_shared_link_until_last_owner() {
        let mut ctx = hub_and_spoke().await;
        promote_c2(&mut ctx).await;
        undeploy(&ctx, "d1", "c1").await;

        let d1 = ctx
            .memory
            .deployments
            .snapshot(&ObjectKey::namespaced(PROJECT_NAMESPACE, "d1"))
            .unwrap();
        ctx.reconciler.reconcile_deployment(&d1).await.unwrap();
        let network = ctx.memory.networks.snapshot(&ObjectKey::cluster("n1")).expect("network kept for d2");
        let bound: Vec<&str> = network.deployment_refs().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(bound, vec!["d2"]);

        let dc = ctx
            .memory
            .deployment_clusters
            .snapshot(&ObjectKey::namespaced(PROJECT_NAMESPACE, dc_name("d1", "c1")))
            .unwrap();
        ctx.reconciler.reconcile_deployment_cluster(&dc).await.unwrap();
        let n1c1 = nc(&ctx, "n1", "c1").expect("network cluster held by finalizers");
        assert!(is_deleting(&n1c1));

        ctx.reconciler.reconcile_network_cluster_link(&n1c1).await.unwrap();
        let nl = network_link(&ctx, "c1", "c2").expect("network link held by its finalizer");
        assert!(is_deleting(&nl));
        ctx.reconciler.reconcile_network_link(&nl).await.unwrap();
        assert!(network_link(&ctx, "c1", "c2").is_none());

        let link = fabric_link(&ctx).expect("fabric link still owned by c2's network link");
        assert!(!is_deleting(&link));
        assert_eq!(owner_count(&link), 1);

        converge(&mut ctx).await;

        assert!(nc(&ctx, "n1", "c1").is_none());
        assert!(cluster(&ctx, "c1").is_none());
        assert!(fabric_service(&ctx, "c1", "svc-a").is_none());
        assert_eq!(ctx.van.site("c1"), None);
        assert!(ctx
            .members
            .service("c1", "default", "svc-a")
            .unwrap()
            .finalizers()
            .is_empty());

        assert_eq!(nc(&ctx, "n1", "c2").unwrap().role(), NetworkClusterRole::Hub);
        assert_eq!(cluster(&ctx, "c2").unwrap().phase(), ClusterPhase::Running);
        assert!(ctx.memory.network_links.is_empty());
        assert!(fabric_link(&ctx).is_none());
    }

    #[tokio::test]
    async fn test_teardown_of_last_deployment_empties_fabric() {
        let mut ctx = single_cluster().await;
        undeploy(&ctx, "d1", "c1").await;
        converge(&mut ctx).await;

        assert!(ctx.memory.deployments.is_empty());
        assert!(ctx.memory.deployment_clusters.is_empty());
        assert!(ctx.memory.networks.is_empty());
        assert!(ctx.memory.network_clusters.is_empty());
        assert!(ctx.memory.network_services.is_empty());
        assert!(ctx.memory.clusters.is_empty());
        assert!(ctx.memory.services.is_empty());
        assert_eq!(ctx.van.site("c1"), None);
    }

    #[tokio::test]
    async fn test_cluster_without_data_plane_terminates() {
        let mut ctx = TestContext::new();
        let mut c1 = create_test_cluster_with_status("c1", ClusterPhase::Running, IngressType::None);
        c1.metadata.finalizers = Some(vec![finalizers::CLUSTER.to_string()]);
        ctx.memory.clusters.insert(c1);
        ctx.memory.clusters.delete(&ObjectKey::cluster("c1")).await.unwrap();

        converge(&mut ctx).await;

        assert!(cluster(&ctx, "c1").is_none());
        assert_eq!(ctx.van.count(VanOp::DeleteSite), 1);
        assert_eq!(ctx.van.count(VanOp::InitSite), 0);
    }

    #[tokio::test]
    async fn test_settled_fabric_stays_quiet() {
        let mut ctx = hub_and_spoke().await;
        promote_c2(&mut ctx).await;

        let writes = ctx.memory.write_count();
        let calls = ctx.van.calls().len();
        assert!(round(&ctx).await.is_empty());
        assert_eq!(ctx.memory.write_count(), writes);
        assert_eq!(ctx.van.calls().len(), calls);
    }
}
