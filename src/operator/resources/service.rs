use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{ApiResource, DynamicObject, ObjectMeta};

use super::deployment::UI_PORT;
use super::{labels_for_metadata, labels_for_selector, owner_namespace, ChildResource, APP_NAME};
use crate::operator::controller::Context;
use crate::operator::crd::CommonWebUI;
use crate::operator::store::{api_resource, to_dynamic};
use crate::operator::Error;

/// Cluster service in front of the UI pods, named after `spec.commonWebUIConfig.serviceName`.
pub struct UiService;

#[async_trait]
impl ChildResource for UiService {
    fn kind(&self) -> ApiResource {
        api_resource::<Service>()
    }

    fn name(&self, owner: &CommonWebUI) -> String {
        owner.service_name().to_owned()
    }

    async fn desired(&self, owner: &CommonWebUI, _ctx: &Context) -> Result<DynamicObject, Error> {
        let name = owner.service_name();
        let mut labels = labels_for_metadata(APP_NAME);
        labels.insert("kubernetes.io/cluster-service".to_owned(), "true".to_owned());
        labels.insert("kubernetes.io/name".to_owned(), name.to_owned());
        labels.insert("app".to_owned(), name.to_owned());

        let service = Service {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some(owner_namespace(owner)?),
                labels: Some(labels),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some(name.to_owned()),
                    port: UI_PORT,
                    target_port: Some(IntOrString::Int(UI_PORT)),
                    ..ServicePort::default()
                }]),
                selector: Some(labels_for_selector(APP_NAME, owner)),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        };

        Ok(to_dynamic(&service)?)
    }
}
