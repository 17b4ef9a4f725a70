// ABOUTME: Naming constants and environment variable names
// ABOUTME: Centralized definitions shared by the box manager and the CLI

// Namespace applied to every runtime resource vbox owns
pub const NAMESPACE: &str = "vbox";
pub const NAMESPACE_SEPARATOR: char = '-';

// Shared bridge network
pub const NETWORK_NAME: &str = "vbox-network";
pub const NETWORK_DRIVER: &str = "bridge";
pub const NETWORK_SUBNET: &str = "172.20.0.0/16";

// In-box login
pub const BOX_USER: &str = "devbox";
pub const BOX_SSH_PORT: u16 = 22;
pub const AUTHORIZED_KEYS_PATH: &str = "/home/devbox/.ssh/authorized_keys";

// Image building
pub const DOCKERFILE_NAME: &str = "Dockerfile";

// Host-side defaults
pub const DEFAULT_SSH_HOST: &str = "localhost";
pub const DEFAULT_PORT_ATTEMPTS: u32 = 100;
pub const CONFIG_DIR_NAME: &str = "vbox";
pub const SSH_DIR_NAME: &str = "ssh";
pub const SSH_CONFIG_FILE_NAME: &str = "config";
pub const SSH_KEYS_DIR_NAME: &str = "keys";
pub const TEMPLATES_DIR_NAME: &str = "env";

// Environment overrides
pub const VBOX_CONFIG_DIR: &str = "VBOX_CONFIG_DIR";
pub const VBOX_TEMPLATES_DIR: &str = "VBOX_TEMPLATES_DIR";
pub const VBOX_USER_SSH_CONFIG: &str = "VBOX_USER_SSH_CONFIG";
pub const VBOX_SSH_HOST: &str = "VBOX_SSH_HOST";
pub const VBOX_PORT_ATTEMPTS: &str = "VBOX_PORT_ATTEMPTS";
pub const VBOX_LOG: &str = "VBOX_LOG";
