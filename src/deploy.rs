use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, ResourceExt},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
    Client,
};
use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::*;

use crate::collector::kube_api::client_from_kubeconfig;
use crate::error::{Error, Result};
use crate::executor::CommandExecutor;

// Deploys and removes the workloads a validation stage needs.
// Removal is best effort and must tolerate workloads that are already gone.
#[async_trait]
pub trait WorkloadDeployer: Send + Sync {
    async fn deploy(&self, manifest: &Path) -> Result<()>;

    async fn remove(&self, manifest: &Path) -> Result<()>;
}

// Deploys every manifest, runs body, then removes whatever was deployed, in reverse order,
// whether or not body succeeded.
pub async fn with_workloads<T, F, Fut>(
    deployer: &dyn WorkloadDeployer,
    manifests: &[PathBuf],
    body: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut deployed: Vec<&Path> = Vec::new();
    let mut deploy_result = Ok(());
    for manifest in manifests {
        match deployer.deploy(manifest).await {
            Ok(()) => deployed.push(manifest),
            Err(e) => {
                error!("{} manifest not deployed: {}", manifest.display(), e);
                deploy_result = Err(e);
                break;
            }
        }
    }

    let result = match deploy_result {
        Ok(()) => body().await,
        Err(e) => Err(e),
    };

    for manifest in deployed.into_iter().rev() {
        if let Err(e) = deployer.remove(manifest).await {
            warn!("Failed to remove {}: {}", manifest.display(), e);
        }
    }
    result
}

pub struct KubectlDeployer {
    executor: Arc<dyn CommandExecutor>,
    kubeconfig: PathBuf,
}

impl KubectlDeployer {
    pub fn new(executor: Arc<dyn CommandExecutor>, kubeconfig: impl Into<PathBuf>) -> Self {
        KubectlDeployer {
            executor,
            kubeconfig: kubeconfig.into(),
        }
    }
}

#[async_trait]
impl WorkloadDeployer for KubectlDeployer {
    async fn deploy(&self, manifest: &Path) -> Result<()> {
        let cmd = format!(
            "kubectl apply -f {} --kubeconfig={}",
            manifest.display(),
            self.kubeconfig.display()
        );
        self.executor
            .run(&cmd)
            .await
            .map_err(|e| Error::DeployFailed {
                manifest: manifest.display().to_string(),
                reason: e.to_string(),
            })?;
        info!("applied {}", manifest.display());
        Ok(())
    }

    async fn remove(&self, manifest: &Path) -> Result<()> {
        let cmd = format!(
            "kubectl delete -f {} --ignore-not-found --kubeconfig={}",
            manifest.display(),
            self.kubeconfig.display()
        );
        self.executor.run(&cmd).await?;
        info!("removed {}", manifest.display());
        Ok(())
    }
}

// Server-side applies every document of a manifest through API discovery.
// Client and discovery are set up on first use, after the cluster is built.
pub struct KubeApplyDeployer {
    kubeconfig: PathBuf,
    api: OnceCell<(Client, Discovery)>,
}

impl KubeApplyDeployer {
    pub fn new(kubeconfig: impl Into<PathBuf>) -> Self {
        KubeApplyDeployer {
            kubeconfig: kubeconfig.into(),
            api: OnceCell::new(),
        }
    }

    async fn api(&self) -> Result<&(Client, Discovery)> {
        self.api
            .get_or_try_init(|| async {
                let client = client_from_kubeconfig(&self.kubeconfig).await?;
                let discovery = Discovery::new(client.clone()).run().await?;
                Ok::<_, Error>((client, discovery))
            })
            .await
    }

    fn documents(manifest: &Path) -> Result<Vec<DynamicObject>> {
        let yaml = std::fs::read_to_string(manifest)?;
        let mut objects = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(&yaml) {
            let value = serde_yaml::Value::deserialize(doc)?;
            if value.is_null() {
                continue;
            }
            objects.push(serde_yaml::from_value(value)?);
        }
        Ok(objects)
    }

    async fn resolve(&self, obj: &DynamicObject, manifest: &Path) -> Result<Api<DynamicObject>> {
        let deploy_failed = |reason: String| Error::DeployFailed {
            manifest: manifest.display().to_string(),
            reason,
        };
        let (client, discovery) = self.api().await?;
        let tm = obj.types.as_ref().ok_or_else(|| {
            deploy_failed(format!("cannot apply object without valid TypeMeta {:?}", obj))
        })?;
        let gvk = GroupVersionKind::try_from(tm).map_err(|e| deploy_failed(e.to_string()))?;
        let (ar, caps) = discovery
            .resolve_gvk(&gvk)
            .ok_or_else(|| deploy_failed(format!("cannot apply document for unknown {:?}", gvk)))?;
        Ok(dynamic_api(
            ar,
            caps,
            client.clone(),
            obj.metadata.namespace.as_deref(),
        ))
    }
}

fn dynamic_api(ar: ApiResource, caps: ApiCapabilities, client: Client, ns: Option<&str>) -> Api<DynamicObject> {
    if caps.scope == Scope::Cluster {
        Api::all_with(client, &ar)
    } else if let Some(namespace) = ns {
        Api::namespaced_with(client, namespace, &ar)
    } else {
        Api::default_namespaced_with(client, &ar)
    }
}

#[async_trait]
impl WorkloadDeployer for KubeApplyDeployer {
    async fn deploy(&self, manifest: &Path) -> Result<()> {
        let ssapply = PatchParams::apply("mixedos-validator").force();
        for obj in Self::documents(manifest)? {
            let api = self.resolve(&obj, manifest).await?;
            let name = obj.name_any();
            let data = serde_json::to_value(&obj)?;
            api.patch(&name, &ssapply, &Patch::Apply(data))
                .await
                .map_err(|e| Error::DeployFailed {
                    manifest: manifest.display().to_string(),
                    reason: e.to_string(),
                })?;
            info!("applied {}", name);
        }
        Ok(())
    }

    async fn remove(&self, manifest: &Path) -> Result<()> {
        for obj in Self::documents(manifest)?.iter().rev() {
            let api = self.resolve(obj, manifest).await?;
            let name = obj.name_any();
            if api.get_opt(&name).await?.is_none() {
                debug!("{} already gone", name);
                continue;
            }
            api.delete(&name, &DeleteParams::default()).await?;
            info!("deleted {}", name);
        }
        Ok(())
    }
}
