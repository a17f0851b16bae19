use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

use crate::error::{ControlPlaneError, Result};

/// Writes a Service's external-IP list back to the cluster API.
#[async_trait]
pub trait ServicePatcher: Send + Sync {
    async fn patch_external_ips(
        &self,
        namespace: &str,
        name: &str,
        external_ips: &[String],
    ) -> Result<()>;
}

/// Merge-patch body that replaces `spec.externalIPs`.
pub fn external_ips_patch(external_ips: &[String]) -> serde_json::Value {
    serde_json::json!({ "spec": { "externalIPs": external_ips } })
}

/// Patches Services through the cluster API's HTTP interface.
pub struct HttpServicePatcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpServicePatcher {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn service_url(&self, namespace: &str, name: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{}/services/{}",
            self.base_url, namespace, name
        )
    }
}

#[async_trait]
impl ServicePatcher for HttpServicePatcher {
    async fn patch_external_ips(
        &self,
        namespace: &str,
        name: &str,
        external_ips: &[String],
    ) -> Result<()> {
        let body = serde_json::to_vec(&external_ips_patch(external_ips))
            .map_err(|e| ControlPlaneError::Fatal(e.to_string()))?;
        let resp = self
            .client
            .patch(self.service_url(namespace, name))
            .header(CONTENT_TYPE, "application/merge-patch+json")
            .body(body)
            .send()
            .await
            .map_err(|e| ControlPlaneError::Transient(e.to_string()))?;

        let status = resp.status();
        match status {
            s if s.is_success() => {
                debug!(
                    "Patched service {}/{} externalIPs={:?}",
                    namespace, name, external_ips
                );
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(ControlPlaneError::not_found(
                "service",
                format!("{}/{}", namespace, name),
            )),
            StatusCode::CONFLICT => Err(ControlPlaneError::conflict(
                "service",
                format!("{}/{}", namespace, name),
            )),
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => Err(
                ControlPlaneError::Transient(format!("cluster API answered {}", s)),
            ),
            s => Err(ControlPlaneError::Fatal(format!(
                "cluster API answered {}",
                s
            ))),
        }
    }
}

/// Used when no cluster API is configured: records the intended patch in the
/// log only.
pub struct LogOnlyPatcher;

#[async_trait]
impl ServicePatcher for LogOnlyPatcher {
    async fn patch_external_ips(
        &self,
        namespace: &str,
        name: &str,
        external_ips: &[String],
    ) -> Result<()> {
        info!(
            "Service {}/{} externalIPs -> {:?} (no cluster API configured)",
            namespace, name, external_ips
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_body_replaces_external_ips() {
        let body = external_ips_patch(&["203.0.113.5".to_string()]);
        assert_eq!(
            body,
            serde_json::json!({"spec": {"externalIPs": ["203.0.113.5"]}})
        );
    }

    #[test]
    fn service_url_is_namespaced() {
        let patcher = HttpServicePatcher::new("http://127.0.0.1:8080/");
        assert_eq!(
            patcher.service_url("default", "web"),
            "http://127.0.0.1:8080/api/v1/namespaces/default/services/web"
        );
    }

    #[tokio::test]
    async fn log_only_patcher_accepts_everything() {
        assert!(
            LogOnlyPatcher
                .patch_external_ips("default", "web", &["203.0.113.5".to_string()])
                .await
                .is_ok()
        );
    }
}
