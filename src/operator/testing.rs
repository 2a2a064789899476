//! In-memory object store and fixtures shared by the unit tests

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::Utc;
use kube::api::{ApiResource, DynamicObject};
use kube::core::{ErrorResponse, Selector, SelectorExt};
use kube::Resource;
use serde::de::DeserializeOwned;

use crate::config::test_config;
use crate::operator::controller::Context;
use crate::operator::crd::{CommonWebUI, CommonWebUISpec};
use crate::operator::reconciler::Reconciler;
use crate::operator::store::{from_dynamic, to_dynamic, ObjectStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub op: Op,
    pub kind: String,
    pub name: String,
}

struct Failure {
    op: Op,
    kind: String,
    code: u16,
    reason: String,
}

struct Entry {
    group: String,
    kind: String,
    object: DynamicObject,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    writes: Vec<Write>,
    failures: Vec<Failure>,
    next_uid: u64,
    next_version: u64,
}

impl Inner {
    fn position(&self, kind: &ApiResource, namespace: &str, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry.group == kind.group
                && entry.kind == kind.kind
                && entry.object.metadata.namespace.as_deref().unwrap_or_default() == namespace
                && entry.object.metadata.name.as_deref() == Some(name)
        })
    }

    fn injected(&self, op: Op, kind: &ApiResource) -> Result<(), StoreError> {
        match self
            .failures
            .iter()
            .find(|failure| failure.op == op && failure.kind == kind.kind)
        {
            Some(failure) => Err(StoreError::from(kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: format!("injected {:?} failure", op),
                reason: failure.reason.clone(),
                code: failure.code,
            }))),
            None => Ok(()),
        }
    }

    fn bump_version(&mut self, object: &mut DynamicObject) {
        self.next_version += 1;
        object.metadata.resource_version = Some(self.next_version.to_string());
    }

    fn record(&mut self, op: Op, kind: &ApiResource, name: &str) {
        self.writes.push(Write {
            op,
            kind: kind.kind.clone(),
            name: name.to_owned(),
        });
    }
}

/// Store keeping objects in insertion order, with optimistic concurrency on
/// resource versions and finalizer-aware deletion.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

fn key_of(object: &DynamicObject) -> (String, String) {
    (
        object.metadata.namespace.clone().unwrap_or_default(),
        object.metadata.name.clone().unwrap_or_default(),
    )
}

fn has_finalizers(object: &DynamicObject) -> bool {
    object
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| !finalizers.is_empty())
}

fn matches_selector(object: &DynamicObject, selector: &Selector) -> bool {
    selector.matches(&object.metadata.labels.clone().unwrap_or_default())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Stores an object as is, assigning uid and version when missing.
    pub fn insert(&self, kind: &ApiResource, mut object: DynamicObject) -> DynamicObject {
        let mut inner = self.lock();
        if object.metadata.uid.is_none() {
            inner.next_uid += 1;
            object.metadata.uid = Some(format!("uid-{}", inner.next_uid));
        }
        inner.bump_version(&mut object);
        let (namespace, name) = key_of(&object);
        if let Some(index) = inner.position(kind, &namespace, &name) {
            inner.entries.remove(index);
        }
        inner.entries.push(Entry {
            group: kind.group.clone(),
            kind: kind.kind.clone(),
            object: object.clone(),
        });
        object
    }

    pub fn insert_typed<K>(&self, object: &K) -> DynamicObject
    where
        K: Resource<DynamicType = ()> + serde::Serialize,
    {
        let dynamic = to_dynamic(object).expect("fixture should serialize");
        self.insert(&ApiResource::erase::<K>(&()), dynamic)
    }

    pub fn object(&self, kind: &ApiResource, namespace: &str, name: &str) -> Option<DynamicObject> {
        let inner = self.lock();
        inner
            .position(kind, namespace, name)
            .map(|index| inner.entries[index].object.clone())
    }

    pub fn typed<K>(&self, namespace: &str, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.object(&ApiResource::erase::<K>(&()), namespace, name)
            .map(|object| from_dynamic(object).expect("stored object should deserialize"))
    }

    pub fn count(&self, kind: &ApiResource) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.group == kind.group && entry.kind == kind.kind)
            .count()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.lock().writes.clone()
    }

    pub fn writes_of(&self, op: Op) -> usize {
        self.lock().writes.iter().filter(|write| write.op == op).count()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Every `op` on `kind` fails with the given API status until cleared.
    pub fn fail_on(&self, op: Op, kind: &str, code: u16, reason: &str) {
        self.lock().failures.push(Failure {
            op,
            kind: kind.to_owned(),
            code,
            reason: reason.to_owned(),
        });
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Marks an object as deleting, the way the API server does for objects with finalizers.
    pub fn mark_deleting(&self, kind: &ApiResource, namespace: &str, name: &str) {
        let mut inner = self.lock();
        if let Some(index) = inner.position(kind, namespace, name) {
            inner.entries[index].object.metadata.deletion_timestamp = Some(Time(Utc::now()));
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(
        &self,
        kind: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        self.lock().injected(Op::Get, kind)?;
        Ok(self.object(kind, namespace, name))
    }

    async fn create(
        &self,
        kind: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut inner = self.lock();
        inner.injected(Op::Create, kind)?;
        let (namespace, name) = key_of(object);
        if inner.position(kind, &namespace, &name).is_some() {
            return Err(StoreError::AlreadyExists);
        }

        let mut created = object.clone();
        inner.next_uid += 1;
        created.metadata.uid = Some(format!("uid-{}", inner.next_uid));
        inner.bump_version(&mut created);
        inner.record(Op::Create, kind, &name);
        inner.entries.push(Entry {
            group: kind.group.clone(),
            kind: kind.kind.clone(),
            object: created.clone(),
        });
        Ok(created)
    }

    async fn update(
        &self,
        kind: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut inner = self.lock();
        inner.injected(Op::Update, kind)?;
        let (namespace, name) = key_of(object);
        let index = inner
            .position(kind, &namespace, &name)
            .ok_or(StoreError::NotFound)?;

        let stored = inner.entries[index].object.clone();
        if object.metadata.resource_version.is_some()
            && object.metadata.resource_version != stored.metadata.resource_version
        {
            return Err(StoreError::Conflict);
        }

        let mut updated = object.clone();
        updated.metadata.uid = stored.metadata.uid.clone();
        updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        match stored.data.get("status") {
            Some(status) => updated.data["status"] = status.clone(),
            None => {
                if let Some(data) = updated.data.as_object_mut() {
                    data.remove("status");
                }
            }
        }
        inner.bump_version(&mut updated);
        inner.record(Op::Update, kind, &name);

        if updated.metadata.deletion_timestamp.is_some() && !has_finalizers(&updated) {
            inner.entries.remove(index);
        } else {
            inner.entries[index].object = updated.clone();
        }
        Ok(updated)
    }

    async fn update_status(
        &self,
        kind: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut inner = self.lock();
        inner.injected(Op::UpdateStatus, kind)?;
        let (namespace, name) = key_of(object);
        let index = inner
            .position(kind, &namespace, &name)
            .ok_or(StoreError::NotFound)?;

        let mut updated = inner.entries[index].object.clone();
        if object.metadata.resource_version.is_some()
            && object.metadata.resource_version != updated.metadata.resource_version
        {
            return Err(StoreError::Conflict);
        }
        updated.data["status"] = object.data.get("status").cloned().unwrap_or_default();
        inner.bump_version(&mut updated);
        inner.record(Op::UpdateStatus, kind, &name);
        inner.entries[index].object = updated.clone();
        Ok(updated)
    }

    async fn delete(
        &self,
        kind: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.injected(Op::Delete, kind)?;
        let index = inner
            .position(kind, namespace, name)
            .ok_or(StoreError::NotFound)?;
        inner.record(Op::Delete, kind, name);

        if has_finalizers(&inner.entries[index].object) {
            inner.entries[index].object.metadata.deletion_timestamp = Some(Time(Utc::now()));
        } else {
            inner.entries.remove(index);
        }
        Ok(())
    }

    async fn list(
        &self,
        kind: &ApiResource,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let inner = self.lock();
        inner.injected(Op::List, kind)?;
        Ok(inner
            .entries
            .iter()
            .filter(|entry| entry.group == kind.group && entry.kind == kind.kind)
            .map(|entry| &entry.object)
            .filter(|object| {
                namespace.is_empty()
                    || object.metadata.namespace.as_deref() == Some(namespace)
            })
            .filter(|object| matches_selector(object, selector))
            .cloned()
            .collect())
    }
}

/// A stored descriptor `cs/ui` with the default spec.
pub fn descriptor() -> CommonWebUI {
    let mut ui = CommonWebUI::new("ui", CommonWebUISpec::default());
    ui.metadata.namespace = Some("cs".to_string());
    ui.metadata.uid = Some("owner-uid".to_string());
    ui
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

pub fn context(store: Arc<dyn ObjectStore>) -> Context {
    Context::new(store, test_config(), Reconciler::standard())
}
