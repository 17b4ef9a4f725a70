// ABOUTME: Box, port, volume and image value types shared across the crate
// ABOUTME: Includes parsers for the `host:container[/proto]` and `name:version` argument formats

use crate::error::BoxError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(BoxError::InvalidArgument(format!(
                "unsupported protocol '{}', expected tcp or udp",
                other
            ))),
        }
    }
}

/// A port exposed by a box. `public_port == 0` means the port is not bound on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub ip: String,
    pub private_port: u16,
    pub public_port: u16,
    pub protocol: Protocol,
}

impl Port {
    pub fn tcp(private_port: u16, public_port: u16) -> Self {
        Self {
            ip: String::new(),
            private_port,
            public_port,
            protocol: Protocol::Tcp,
        }
    }

    /// Runtime key for this port, e.g. `22/tcp`
    pub fn key(&self) -> String {
        format!("{}/{}", self.private_port, self.protocol)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.public_port > 0 {
            write!(f, "{}:{}/{}", self.public_port, self.private_port, self.protocol)
        } else {
            write!(f, "{}/{}", self.private_port, self.protocol)
        }
    }
}

fn parse_port_number(raw: &str, input: &str) -> Result<u16, BoxError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| BoxError::InvalidArgument(format!("invalid port in '{}'", input)))
}

/// Accepts `80`, `80/udp`, `8080:80` and `8080:80/tcp`.
impl FromStr for Port {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(BoxError::InvalidArgument("empty port mapping".to_string()));
        }

        let (ports, protocol) = match input.split_once('/') {
            Some((ports, proto)) => (ports, proto.parse::<Protocol>()?),
            None => (input, Protocol::Tcp),
        };

        let (public_port, private_port) = match ports.split_once(':') {
            Some((public, private)) => (
                parse_port_number(public, input)?,
                parse_port_number(private, input)?,
            ),
            None => (0, parse_port_number(ports, input)?),
        };

        if private_port == 0 {
            return Err(BoxError::InvalidArgument(format!(
                "container port must be greater than zero in '{}'",
                input
            )));
        }

        Ok(Port {
            ip: String::new(),
            private_port,
            public_port,
            protocol,
        })
    }
}

/// Host path bound into a box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBind {
    pub host_path: String,
    pub container_path: String,
}

impl FromStr for VolumeBind {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, container) = s.split_once(':').ok_or_else(|| {
            BoxError::InvalidArgument(format!(
                "invalid volume '{}', expected host_path:container_path",
                s
            ))
        })?;
        let (host, container) = (host.trim(), container.trim());
        if host.is_empty() || container.is_empty() {
            return Err(BoxError::InvalidArgument(format!(
                "invalid volume '{}', both paths are required",
                s
            )));
        }
        Ok(VolumeBind {
            host_path: host.to_string(),
            container_path: container.to_string(),
        })
    }
}

/// `name:version` image reference as typed by the user, without the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: String,
    pub version: String,
}

impl FromStr for ImageRef {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((name, version)) if !name.trim().is_empty() && !version.trim().is_empty() => {
                Ok(ImageRef {
                    name: name.trim().to_string(),
                    version: version.trim().to_string(),
                })
            }
            _ => Err(BoxError::InvalidArgument(format!(
                "invalid image '{}', expected name:version",
                s
            ))),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// View of a box reconstructed from the runtime's live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub state: String,
    pub ports: Vec<Port>,
}

impl BoxInfo {
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub size: i64,
    pub created: DateTime<Utc>,
}

/// Parameters for starting a new box.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub name: String,
    /// `name:version`, resolved against the namespaced image store
    pub image: String,
    pub ports: Vec<Port>,
    /// 0 picks a free host port
    pub ssh_port: u16,
    /// Existing public key file to authorize; empty generates a key pair and SSH alias
    pub public_key: Option<PathBuf>,
    pub volumes: Vec<VolumeBind>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("80", 0, 80, Protocol::Tcp)]
    #[case("80/udp", 0, 80, Protocol::Udp)]
    #[case("8080:80", 8080, 80, Protocol::Tcp)]
    #[case("8080:80/tcp", 8080, 80, Protocol::Tcp)]
    #[case(" 53:53/UDP ", 53, 53, Protocol::Udp)]
    fn test_port_parsing(
        #[case] input: &str,
        #[case] public: u16,
        #[case] private: u16,
        #[case] protocol: Protocol,
    ) {
        let port: Port = input.parse().unwrap();
        assert_eq!(port.public_port, public);
        assert_eq!(port.private_port, private);
        assert_eq!(port.protocol, protocol);
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("8080:")]
    #[case("8080:80/sctp")]
    #[case("0")]
    #[case("70000:80")]
    fn test_port_parsing_rejects(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Port>(),
            Err(BoxError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_port_display() {
        assert_eq!(Port::tcp(22, 40022).to_string(), "40022:22/tcp");
        assert_eq!(Port::tcp(22, 0).to_string(), "22/tcp");
        assert_eq!(Port::tcp(22, 0).key(), "22/tcp");
    }

    #[test]
    fn test_volume_parsing() {
        let bind: VolumeBind = "/src:/workspace".parse().unwrap();
        assert_eq!(bind.host_path, "/src");
        assert_eq!(bind.container_path, "/workspace");

        assert!("/src".parse::<VolumeBind>().is_err());
        assert!(":/workspace".parse::<VolumeBind>().is_err());
        assert!("/src: ".parse::<VolumeBind>().is_err());
    }

    #[rstest]
    #[case("bad")]
    #[case(":1.0")]
    #[case("base:")]
    fn test_image_ref_rejects(#[case] input: &str) {
        assert!(matches!(
            input.parse::<ImageRef>(),
            Err(BoxError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_image_ref_parses() {
        let image: ImageRef = "base:1.0".parse().unwrap();
        assert_eq!(image.name, "base");
        assert_eq!(image.version, "1.0");
    }

    #[test]
    fn test_short_id() {
        let info = BoxInfo {
            id: "0123456789abcdef".to_string(),
            name: "dev".to_string(),
            image: "base:1.0".to_string(),
            status: "running".to_string(),
            state: "running".to_string(),
            ports: vec![],
        };
        assert_eq!(info.short_id(), "0123456789ab");
    }
}
