//! Kubernetes Event recording.
//!
//! Phase transitions and persistent failures are published against the CR that
//! triggered them, visible via `kubectl describe`. Publishing is fire-and-forget:
//! a failed event is logged and never fails the reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Reporting component on every Event
pub const CONTROLLER_NAME: &str = "interconnect-controller";

/// Publishes Kubernetes Events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event about `resource_ref`
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every Event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// A published Event as kept by [`RecordingEventPublisher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub kind: String,
    pub name: String,
    pub warning: bool,
    pub reason: String,
}

/// Publisher that keeps Events in memory for assertions
#[derive(Debug, Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Reasons of every Event published about `name`, in order
    pub fn reasons_for(&self, name: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.name == name)
            .map(|e| e.reason)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
        let event = RecordedEvent {
            kind: resource_ref.kind.clone().unwrap_or_default(),
            name: resource_ref.name.clone().unwrap_or_default(),
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
        };
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Event reasons
pub mod reasons {
    pub const SITE_CONFIGURING: &str = "SiteConfiguring";
    pub const SITE_READY: &str = "SiteReady";
    pub const SITE_DELETED: &str = "SiteDeleted";
    pub const CLUSTER_GONE: &str = "ClusterGone";
    pub const INGRESS_ENABLED: &str = "IngressEnabled";
    pub const LINKING: &str = "Linking";
    pub const LINKED: &str = "Linked";
    pub const NO_ISSUER: &str = "NoIssuer";
    pub const UNLINKED: &str = "Unlinked";
    pub const EXPOSING: &str = "Exposing";
    pub const EXPOSED: &str = "Exposed";
    pub const UNEXPOSED: &str = "Unexposed";
    pub const ROLE_CHANGED: &str = "RoleChanged";
    pub const INVALID_EXPOSE_PORTS: &str = "InvalidExposePorts";
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
}

/// Event actions
pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
    pub const DELETE: &str = "Delete";
}
