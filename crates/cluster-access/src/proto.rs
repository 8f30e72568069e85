//! Deployment-manager `ClusterService` messages
//!
//! Only the `GetKubeConfig` call is used, so the messages are declared by hand
//! instead of generated.

/// gRPC path of `deployment.v1.ClusterService/GetKubeConfig`
pub const GET_KUBE_CONFIG_PATH: &str = "/deployment.v1.ClusterService/GetKubeConfig";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetKubeConfigRequest {
    #[prost(string, tag = "1")]
    pub cluster_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetKubeConfigResponse {
    #[prost(message, optional, tag = "1")]
    pub kube_config_info: ::core::option::Option<KubeConfigInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KubeConfigInfo {
    #[prost(bytes = "vec", tag = "1")]
    pub kube_config: ::prost::alloc::vec::Vec<u8>,
}
