// ABOUTME: Docker implementation of the container runtime trait
// ABOUTME: Uses bollard to manage vbox containers, the shared network and namespaced images

use super::{
    BuildFrame, BuildSpec, BuildStream, ContainerRuntime, ContainerSummary, CreateSpec,
    ImageSummary, NetworkSpec, Result, RuntimeError,
};
use crate::types::{Port, Protocol};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
        StartContainerOptions, StopContainerOptions,
    },
    image::{BuildImageOptions, ListImagesOptions, RemoveImageOptions},
    models::{HostConfig, Ipam, IpamConfig, PortBinding, PortMap},
    network::{CreateNetworkOptions, ListNetworksOptions},
    Docker,
};
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const BUILD_CHANNEL_CAPACITY: usize = 64;

pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform default socket
    pub fn new() -> Result<Self> {
        let client = Docker::connect_with_defaults()
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Docker) -> Self {
        Self { client }
    }

    pub async fn ping(&self) -> Result<()> {
        self.client.ping().await.map_err(classify)?;
        Ok(())
    }
}

/// Map a bollard error onto the runtime classification the manager reasons about.
fn classify(err: bollard::errors::Error) -> RuntimeError {
    use bollard::errors::Error as E;
    match err {
        E::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(message),
        E::DockerResponseServerError {
            status_code: 409,
            message,
        } => RuntimeError::Conflict(message),
        E::DockerResponseServerError {
            status_code: 304,
            message,
        } => RuntimeError::NotModified(message),
        E::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Api(format!("{} (status {})", message, status_code)),
        e @ E::IOError { .. } => RuntimeError::Connection(e.to_string()),
        other => RuntimeError::Api(other.to_string()),
    }
}

fn parse_protocol(raw: &str) -> Protocol {
    match raw {
        "udp" => Protocol::Udp,
        _ => Protocol::Tcp,
    }
}

/// Convert a create request into bollard's container config
pub(crate) fn to_container_config(spec: &CreateSpec) -> Config<String> {
    let mut exposed_ports = HashMap::new();
    let mut port_bindings: PortMap = HashMap::new();

    for port in &spec.ports {
        let key = port.key();
        exposed_ports.insert(key.clone(), HashMap::new());

        // Several host ports may publish the same container port
        if port.public_port > 0 {
            port_bindings
                .entry(key)
                .or_insert_with(|| Some(Vec::new()))
                .get_or_insert_with(Vec::new)
                .push(PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(port.public_port.to_string()),
                });
        }
    }

    let host_config = HostConfig {
        binds: if spec.binds.is_empty() {
            None
        } else {
            Some(spec.binds.clone())
        },
        port_bindings: if port_bindings.is_empty() {
            None
        } else {
            Some(port_bindings)
        },
        network_mode: Some(spec.network.clone()),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        exposed_ports: Some(exposed_ports),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// Flatten a `{"22/tcp": [{HostIp, HostPort}]}` map into ports.
fn ports_from_map(map: &PortMap) -> Vec<Port> {
    let mut ports = Vec::new();
    for (key, bindings) in map {
        let (number, proto) = key.split_once('/').unwrap_or((key.as_str(), "tcp"));
        let Ok(private_port) = number.parse::<u16>() else {
            continue;
        };
        let protocol = parse_protocol(proto);

        match bindings.as_ref().filter(|b| !b.is_empty()) {
            Some(bindings) => {
                for binding in bindings {
                    ports.push(Port {
                        ip: binding.host_ip.clone().unwrap_or_default(),
                        private_port,
                        public_port: binding
                            .host_port
                            .as_deref()
                            .and_then(|p| p.parse().ok())
                            .unwrap_or(0),
                        protocol,
                    });
                }
            }
            None => ports.push(Port {
                ip: String::new(),
                private_port,
                public_port: 0,
                protocol,
            }),
        }
    }
    ports.sort_by_key(|p| (p.private_port, p.public_port));
    ports
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(classify)?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                status: c.status.map(|s| s.to_string()).unwrap_or_default(),
                state: c.state.map(|s| s.to_string()).unwrap_or_default(),
                ports: c
                    .ports
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| Port {
                        ip: p.ip.unwrap_or_default(),
                        private_port: p.private_port,
                        public_port: p.public_port.unwrap_or(0),
                        protocol: p
                            .typ
                            .map(|t| parse_protocol(&t.to_string()))
                            .unwrap_or(Protocol::Tcp),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn inspect_container(&self, id_or_name: &str) -> Result<ContainerSummary> {
        let inspect = self
            .client
            .inspect_container(id_or_name, None)
            .await
            .map_err(classify)?;

        let status = inspect
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let ports = inspect
            .network_settings
            .as_ref()
            .and_then(|ns| ns.ports.as_ref())
            .map(ports_from_map)
            .unwrap_or_default();

        Ok(ContainerSummary {
            id: inspect.id.unwrap_or_else(|| id_or_name.to_string()),
            name: inspect.name.unwrap_or_default(),
            image: inspect
                .config
                .and_then(|c| c.image)
                .unwrap_or_default(),
            state: status.clone(),
            status,
            ports,
        })
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String> {
        debug!("Creating container {} from {}", spec.name, spec.image);

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let container = self
            .client
            .create_container(Some(options), to_container_config(spec))
            .await
            .map_err(classify)?;

        for warning in &container.warnings {
            warn!("Docker warning for {}: {}", spec.name, warning);
        }

        Ok(container.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        debug!("Starting container {}", id);
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(classify)
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        debug!("Stopping container {}", id);
        self.client
            .stop_container(id, None::<StopContainerOptions>)
            .await
            .map_err(classify)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        debug!("Removing container {} (force: {})", id, force);

        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.client
            .remove_container(id, Some(options))
            .await
            .map_err(classify)
    }

    async fn list_networks(&self) -> Result<Vec<String>> {
        let networks = self
            .client
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(classify)?;

        Ok(networks.into_iter().filter_map(|n| n.name).collect())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<()> {
        info!("Creating network {} ({})", spec.name, spec.subnet);

        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            driver: spec.driver.clone(),
            ipam: Ipam {
                config: Some(vec![IpamConfig {
                    subnet: Some(spec.subnet.clone()),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            ..Default::default()
        };

        self.client
            .create_network(options)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn build_image(&self, spec: BuildSpec) -> Result<BuildStream> {
        info!("Building image {} ({})", spec.tag, spec.dockerfile);

        let options = BuildImageOptions::<String> {
            dockerfile: spec.dockerfile,
            t: spec.tag,
            rm: spec.remove_intermediate,
            nocache: spec.no_cache,
            buildargs: spec.build_args,
            ..Default::default()
        };

        let client = self.client.clone();
        let context = spec.context;
        let (tx, rx) = tokio::sync::mpsc::channel(BUILD_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut stream = Box::pin(client.build_image(options, None, Some(context.into())));
            while let Some(result) = stream.next().await {
                let frame = match result {
                    Ok(info) => BuildFrame {
                        stream: info.stream,
                        error: info
                            .error
                            .or_else(|| info.error_detail.and_then(|d| d.message)),
                    },
                    Err(e) => {
                        // Surface transport and decode failures instead of ending the stream quietly
                        warn!("Build stream interrupted: {}", e);
                        let _ = tx.send(BuildFrame::failure(e.to_string())).await;
                        break;
                    }
                };

                if tx.send(frame).await.is_err() {
                    break; // Receiver dropped
                }
            }
        });

        Ok(BuildStream { receiver: rx })
    }

    async fn image_exists(&self, tag: &str) -> Result<bool> {
        match self.client.inspect_image(tag).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(classify(e)),
        }
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };

        let images = self
            .client
            .list_images(Some(options))
            .await
            .map_err(classify)?;

        Ok(images
            .into_iter()
            .map(|img| ImageSummary {
                id: img.id,
                repo_tags: img.repo_tags,
                size: img.size,
                created: img.created,
            })
            .collect())
    }

    async fn remove_image(&self, id: &str, force: bool, prune_children: bool) -> Result<()> {
        info!("Removing image {} (force: {})", id, force);

        let options = RemoveImageOptions {
            force,
            noprune: !prune_children,
        };

        self.client
            .remove_image(id, Some(options), None)
            .await
            .map_err(classify)?;
        Ok(())
    }
}
