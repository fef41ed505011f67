use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use axum::async_trait;

use crate::storage::{ObjectLocation, ObjectStore};

/// In-process stand-in for S3 used by the request tests.
#[derive(Default)]
pub(crate) struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing_uploads: Mutex<Vec<String>>,
    workspace_removals: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub(crate) fn with_object(self, uri: &str, body: &[u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(uri.to_string(), body.to_vec());
        self
    }

    /// Any upload to `uri` fails with an access-denied error.
    pub(crate) fn failing_upload(self, uri: &str) -> Self {
        self.failing_uploads.lock().unwrap().push(uri.to_string());
        self
    }

    /// Once `uri` is stored, deletes the request workspace the stem was read
    /// from, so the handler's own cleanup finds nothing to remove.
    pub(crate) fn removing_workspace_after(self, uri: &str) -> Self {
        self.workspace_removals.lock().unwrap().push(uri.to_string());
        self
    }

    pub(crate) fn get(&self, uri: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(uri).cloned()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(&self, location: &ObjectLocation, local_path: &Path) -> Result<()> {
        let body = self
            .get(&location.to_string())
            .ok_or_else(|| anyhow!("NoSuchKey: {location}"))?;
        tokio::fs::write(local_path, body).await?;
        Ok(())
    }

    async fn upload(&self, local_path: &Path, location: &ObjectLocation) -> Result<()> {
        let uri = location.to_string();
        if self.failing_uploads.lock().unwrap().contains(&uri) {
            bail!("AccessDenied: {uri}");
        }
        let body = tokio::fs::read(local_path).await?;
        let remove_workspace = self.workspace_removals.lock().unwrap().contains(&uri);
        self.objects.lock().unwrap().insert(uri, body);

        if remove_workspace {
            // <workspace>/output/<model>/<track>/<stem>
            if let Some(workspace) = local_path.ancestors().nth(4) {
                tokio::fs::remove_dir_all(workspace).await?;
            }
        }
        Ok(())
    }
}
