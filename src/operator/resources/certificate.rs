use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use serde_json::json;

use super::deployment::UI_CERT_SECRET;
use super::{labels_for_metadata, owner_namespace, ChildResource, APP_NAME};
use crate::operator::controller::Context;
use crate::operator::crd::CommonWebUI;
use crate::operator::document::Document;
use crate::operator::Error;

pub const UI_CERTIFICATE: &str = "common-web-ui-ca-cert";

const CERTIFICATE_TEMPLATE: &str = r#"{
  "apiVersion": "cert-manager.io/v1",
  "kind": "Certificate",
  "metadata": {"name": "common-web-ui-ca-cert"},
  "spec": {
    "secretName": "",
    "commonName": "",
    "dnsNames": [],
    "duration": "2160h",
    "renewBefore": "720h",
    "issuerRef": {"name": "cs-ca-issuer", "kind": "Issuer"}
  }
}"#;

pub fn certificate_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("cert-manager.io", "v1", "Certificate"),
        "certificates",
    )
}

/// Serving certificate for the UI service, issued by the common services CA.
pub struct UiCertificate;

#[async_trait]
impl ChildResource for UiCertificate {
    fn kind(&self) -> ApiResource {
        certificate_resource()
    }

    fn name(&self, _owner: &CommonWebUI) -> String {
        UI_CERTIFICATE.to_owned()
    }

    async fn desired(&self, owner: &CommonWebUI, _ctx: &Context) -> Result<DynamicObject, Error> {
        let namespace = owner_namespace(owner)?;
        let service = owner.service_name();

        let mut document = Document::parse(CERTIFICATE_TEMPLATE)?;
        document.set("metadata.namespace", namespace.as_str())?;
        document.set("metadata.labels", json!(labels_for_metadata(APP_NAME)))?;
        document.set("spec.secretName", UI_CERT_SECRET)?;
        document.set("spec.commonName", service)?;
        document.set(
            "spec.dnsNames",
            json!([
                service,
                format!("{service}.{namespace}"),
                format!("{service}.{namespace}.svc"),
                format!("{service}.{namespace}.svc.cluster.local"),
            ]),
        )?;

        Ok(document.into_object()?)
    }
}
