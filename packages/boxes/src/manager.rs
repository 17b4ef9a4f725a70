// ABOUTME: Box lifecycle manager composing images, ports, credentials and SSH config
// ABOUTME: Runs boxes end to end and tears them down, cleaning up local SSH state

use crate::credentials::{Ed25519KeyGenerator, KeyGenerator};
use crate::error::{BoxError, Result};
use crate::images::{ImageService, LogSink};
use crate::naming;
use crate::ports::PortAllocator;
use crate::runtime::{self, ContainerRuntime, ContainerSummary, CreateSpec, NetworkSpec, RuntimeError};
use crate::ssh::SshConfigStore;
use crate::types::{BoxInfo, ImageRef, Port, RunRequest};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vbox_config::constants::{
    AUTHORIZED_KEYS_PATH, BOX_SSH_PORT, BOX_USER, NETWORK_DRIVER, NETWORK_NAME, NETWORK_SUBNET,
};
use vbox_config::AppConfig;

/// Result of resolving a user-supplied box reference
enum Lookup {
    Ours(ContainerSummary),
    Foreign,
    Missing,
}

/// Box lifecycle manager
pub struct BoxManager {
    runtime: Arc<dyn ContainerRuntime>,
    images: ImageService,
    ssh: SshConfigStore,
    ports: PortAllocator,
    keys: Arc<dyn KeyGenerator>,
}

impl BoxManager {
    pub fn new(config: &AppConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            images: ImageService::new(runtime.clone(), &config.templates_dir),
            ssh: SshConfigStore::new(config),
            ports: PortAllocator::new(config.port_attempts),
            keys: Arc::new(Ed25519KeyGenerator),
            runtime,
        }
    }

    pub fn with_port_allocator(mut self, ports: PortAllocator) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_key_generator(mut self, keys: Arc<dyn KeyGenerator>) -> Self {
        self.keys = keys;
        self
    }

    pub fn images(&self) -> &ImageService {
        &self.images
    }

    pub fn ssh(&self) -> &SshConfigStore {
        &self.ssh
    }

    /// All vbox containers, running or stopped
    pub async fn list(&self, cancel: &CancellationToken) -> Result<Vec<BoxInfo>> {
        let containers =
            runtime::call(cancel, "list", "containers", self.runtime.list_containers()).await?;

        Ok(containers
            .into_iter()
            .filter(|c| naming::is_ours(&c.name))
            .map(to_box_info)
            .collect())
    }

    /// Look up a box by name, container ID or container name
    pub async fn get(&self, id: &str, cancel: &CancellationToken) -> Result<BoxInfo> {
        match self.lookup(id, cancel).await? {
            Lookup::Ours(container) => Ok(to_box_info(container)),
            Lookup::Foreign | Lookup::Missing => Err(BoxError::NotFound(format!("box {}", id))),
        }
    }

    /// Box names are tried first, then the raw reference.
    async fn lookup(&self, id: &str, cancel: &CancellationToken) -> Result<Lookup> {
        let mut candidates = Vec::with_capacity(2);
        if naming::is_valid_box_name(id) && !naming::is_ours(id) {
            candidates.push(naming::namespaced(id));
        }
        candidates.push(id.to_string());

        let mut foreign = false;
        for candidate in candidates {
            match runtime::call(
                cancel,
                "inspect",
                &candidate,
                self.runtime.inspect_container(&candidate),
            )
            .await
            {
                Ok(container) if naming::is_ours(&container.name) => {
                    return Ok(Lookup::Ours(container))
                }
                Ok(container) => {
                    debug!("Container {} is not managed by vbox", container.name);
                    foreign = true;
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(if foreign {
            Lookup::Foreign
        } else {
            Lookup::Missing
        })
    }

    /// Create and start a box.
    ///
    /// Builds the image from its template when missing, picks an SSH port when
    /// none is given and, without a caller key, generates a key pair and
    /// registers an SSH alias named after the box.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: &CancellationToken,
        on_log: LogSink<'_>,
    ) -> Result<BoxInfo> {
        let image = validate(&request)?;
        let public_key = match &request.public_key {
            Some(path) => Some(resolve_public_key(path)?),
            None => None,
        };
        let container_name = naming::namespaced(&request.name);

        self.images.ensure_image(&image, cancel, on_log).await?;

        // Advisory; the runtime's create conflict is authoritative
        if self.name_taken(&container_name, cancel).await? {
            return Err(BoxError::AlreadyExists(format!("box {}", request.name)));
        }

        let ssh_port = if request.ssh_port == 0 {
            let port = self.ports.allocate_random()?;
            info!("Allocated SSH port {} for {}", port, request.name);
            port
        } else {
            request.ssh_port
        };

        let (public_key, fresh_alias) = match public_key {
            Some(path) => (path, false),
            None => self.provision_alias(&request.name, ssh_port)?,
        };

        let mut ports = request.ports.clone();
        ports.push(Port::tcp(BOX_SSH_PORT, ssh_port));

        let mut binds: Vec<String> = request
            .volumes
            .iter()
            .map(|v| format!("{}:{}", v.host_path, v.container_path))
            .collect();
        binds.push(format!(
            "{}:{}:ro",
            public_key.display(),
            AUTHORIZED_KEYS_PATH
        ));

        let spec = CreateSpec {
            name: container_name,
            image: naming::image_tag(&image.name, &image.version),
            ports,
            binds,
            network: NETWORK_NAME.to_string(),
        };

        let outcome = self.create_and_start(&spec, cancel).await;
        if outcome.is_err() && fresh_alias {
            if let Err(e) = self.ssh.remove(&request.name) {
                warn!("Failed to roll back SSH host {}: {}", request.name, e);
            }
        }
        outcome
    }

    async fn name_taken(&self, container_name: &str, cancel: &CancellationToken) -> Result<bool> {
        let containers =
            runtime::call(cancel, "list", "containers", self.runtime.list_containers()).await?;
        Ok(containers
            .iter()
            .any(|c| c.name.trim_start_matches('/') == container_name))
    }

    /// Generate keys and register `alias`. Returns the public key path and
    /// whether the alias is new.
    fn provision_alias(&self, alias: &str, ssh_port: u16) -> Result<(PathBuf, bool)> {
        let existed = match self.ssh.get(alias) {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };

        let credential = self.keys.generate(&naming::namespaced(alias))?;
        info!("Generated SSH key pair for {}", alias);

        let entry = self.ssh.entry_for(alias, ssh_port, BOX_USER);
        let public_key = self.ssh.upsert(&entry, &credential)?;
        info!("SSH host {} -> {}:{}", alias, entry.host_name, ssh_port);

        Ok((public_key, !existed))
    }

    async fn create_and_start(&self, spec: &CreateSpec, cancel: &CancellationToken) -> Result<BoxInfo> {
        self.ensure_network(cancel).await?;

        let id = match runtime::call(
            cancel,
            "create",
            &spec.name,
            self.runtime.create_container(spec),
        )
        .await
        {
            Ok(id) => id,
            Err(BoxError::Runtime {
                source: RuntimeError::Conflict(_),
                ..
            }) => return Err(BoxError::AlreadyExists(format!("container {}", spec.name))),
            Err(e) => return Err(e),
        };
        info!("Created container {} ({})", spec.name, id);

        if let Err(e) =
            runtime::call(cancel, "start", &spec.name, self.runtime.start_container(&id)).await
        {
            // The caller's token may already be cancelled
            let cleanup = CancellationToken::new();
            if let Err(cleanup_err) =
                runtime::call(&cleanup, "remove", &id, self.runtime.remove_container(&id, true))
                    .await
            {
                warn!("Failed to remove unstarted container {}: {}", id, cleanup_err);
            }
            return Err(e);
        }
        info!("Started container {}", spec.name);

        let container =
            runtime::call(cancel, "inspect", &id, self.runtime.inspect_container(&id)).await?;
        Ok(to_box_info(container))
    }

    async fn ensure_network(&self, cancel: &CancellationToken) -> Result<()> {
        let networks =
            runtime::call(cancel, "list", "networks", self.runtime.list_networks()).await?;
        if networks.iter().any(|n| n == NETWORK_NAME) {
            return Ok(());
        }

        let spec = NetworkSpec {
            name: NETWORK_NAME.to_string(),
            driver: NETWORK_DRIVER.to_string(),
            subnet: NETWORK_SUBNET.to_string(),
        };
        match runtime::call(
            cancel,
            "create network",
            NETWORK_NAME,
            self.runtime.create_network(&spec),
        )
        .await
        {
            Ok(()) => Ok(()),
            // Created concurrently
            Err(BoxError::Runtime {
                source: RuntimeError::Conflict(_),
                ..
            }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Stop a box. Stopping a stopped box succeeds.
    pub async fn stop(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let container = match self.lookup(id, cancel).await? {
            Lookup::Ours(container) => container,
            Lookup::Foreign | Lookup::Missing => {
                return Err(BoxError::NotFound(format!("box {}", id)))
            }
        };

        self.stop_container(&container.id, cancel).await?;
        info!("Stopped box {}", naming::unqualify(&container.name));
        Ok(())
    }

    async fn stop_container(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        match runtime::call(cancel, "stop", id, self.runtime.stop_container(id)).await {
            Ok(()) => Ok(()),
            Err(BoxError::Runtime { source, .. })
                if source.is_already_stopped() || source.is_not_found() =>
            {
                debug!("Container {} already stopped", id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Stop and delete a box, then drop its SSH alias.
    ///
    /// A failed lookup does not stop the removal; SSH cleanup failures are
    /// logged and ignored once the container is gone.
    pub async fn remove(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let known = match self.lookup(id, cancel).await {
            Ok(Lookup::Ours(container)) => Some(container),
            Ok(Lookup::Foreign) => return Err(BoxError::NotFound(format!("box {}", id))),
            Ok(Lookup::Missing) => {
                info!("Box {} not found, attempting removal anyway", id);
                None
            }
            Err(e) => {
                warn!("Failed to look up box {}, attempting removal anyway: {}", id, e);
                None
            }
        };

        let target = known.as_ref().map(|c| c.id.as_str()).unwrap_or(id);

        self.stop_container(target, cancel).await?;

        match runtime::call(
            cancel,
            "remove",
            target,
            self.runtime.remove_container(target, false),
        )
        .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                return Err(BoxError::NotFound(format!("box {}", id)));
            }
            Err(e) => return Err(e),
        }
        info!("Removed container {}", target);

        if let Some(container) = known {
            let alias = naming::unqualify(&container.name);
            match self.ssh.remove(&alias) {
                Ok(()) => info!("Removed SSH host {}", alias),
                Err(e) => warn!("Failed to remove SSH host {}: {}", alias, e),
            }
        }

        Ok(())
    }
}

fn validate(request: &RunRequest) -> Result<ImageRef> {
    if !naming::is_valid_box_name(&request.name) {
        return Err(BoxError::InvalidArgument(format!(
            "invalid box name '{}', use letters, digits, '_', '.' or '-'",
            request.name
        )));
    }

    let image = request.image.parse::<ImageRef>()?;

    if let Some(port) = request.ports.iter().find(|p| p.private_port == 0) {
        return Err(BoxError::InvalidArgument(format!(
            "container port must be greater than zero in '{}'",
            port
        )));
    }

    Ok(image)
}

/// Absolute path of an existing public key file
fn resolve_public_key(path: &std::path::Path) -> Result<PathBuf> {
    let metadata = fs::metadata(path).map_err(|e| {
        BoxError::InvalidArgument(format!("public key {}: {}", path.display(), e))
    })?;
    if metadata.is_dir() {
        return Err(BoxError::InvalidArgument(format!(
            "public key {} is a directory",
            path.display()
        )));
    }
    fs::canonicalize(path).map_err(|e| BoxError::io(path, e))
}

fn to_box_info(container: ContainerSummary) -> BoxInfo {
    BoxInfo {
        name: naming::unqualify(&container.name),
        image: naming::unqualify(&container.image),
        id: container.id,
        status: container.status,
        state: container.state,
        ports: container.ports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VolumeBind;
    use tempfile::TempDir;

    fn request(name: &str, image: &str) -> RunRequest {
        RunRequest {
            name: name.to_string(),
            image: image.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(matches!(
            validate(&request("dev", "bad")),
            Err(BoxError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate(&request("", "base:1.0")),
            Err(BoxError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate(&request("dev box", "base:1.0")),
            Err(BoxError::InvalidArgument(_))
        ));

        let mut zero_port = request("dev", "base:1.0");
        zero_port.ports.push(Port::tcp(0, 8080));
        assert!(matches!(
            validate(&zero_port),
            Err(BoxError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_validate_accepts_volumes_and_ports() {
        let mut ok = request("dev", "base:1.0");
        ok.ports.push("8080:80".parse().unwrap());
        ok.volumes.push(VolumeBind {
            host_path: "/src".to_string(),
            container_path: "/workspace".to_string(),
        });
        let image = validate(&ok).unwrap();
        assert_eq!(image.name, "base");
        assert_eq!(image.version, "1.0");
    }

    #[test]
    fn test_public_key_must_be_a_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolve_public_key(dir.path()),
            Err(BoxError::InvalidArgument(_))
        ));
        assert!(matches!(
            resolve_public_key(&dir.path().join("missing.pub")),
            Err(BoxError::InvalidArgument(_))
        ));

        let key = dir.path().join("id.pub");
        fs::write(&key, "ssh-ed25519 AAAA test\n").unwrap();
        let resolved = resolve_public_key(&key).unwrap();
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_box_info_strips_namespace() {
        let info = to_box_info(ContainerSummary {
            id: "abc".to_string(),
            name: "/vbox-dev".to_string(),
            image: "vbox-base:1.0".to_string(),
            status: "Up 2 minutes".to_string(),
            state: "running".to_string(),
            ports: vec![Port::tcp(22, 40022)],
        });
        assert_eq!(info.name, "dev");
        assert_eq!(info.image, "base:1.0");
    }
}
