// ABOUTME: Bundled image templates and lookup of the template that builds a given image name
// ABOUTME: Produces tarred build contexts for the runtime from a template file or directory

use crate::error::{BoxError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vbox_config::constants::DOCKERFILE_NAME;

const BASE_TEMPLATE: &str = include_str!("../templates/base");
const SETUP_SCRIPT: &str = include_str!("../templates/setup.sh");

/// Files written by [`init`], as (file name, contents)
pub const BUNDLED: &[(&str, &str)] = &[("base", BASE_TEMPLATE), ("setup.sh", SETUP_SCRIPT)];

/// A directory to send as build context plus the Dockerfile inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub dir: PathBuf,
    pub dockerfile: String,
}

impl BuildContext {
    /// Context for an explicit Dockerfile: its directory, addressed by file name
    pub fn from_dockerfile(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BoxError::NotFound(format!(
                "Dockerfile {}",
                path.display()
            )));
        }
        let dockerfile = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                BoxError::InvalidArgument(format!("invalid Dockerfile path {}", path.display()))
            })?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self { dir, dockerfile })
    }

    /// Tar the whole context directory
    pub fn archive(&self) -> Result<Vec<u8>> {
        let mut archive = tar::Builder::new(Vec::new());
        archive
            .append_dir_all(".", &self.dir)
            .map_err(|e| BoxError::io(&self.dir, e))?;
        archive
            .into_inner()
            .map_err(|e| BoxError::io(&self.dir, e))
    }
}

/// Find the template for `image_name` under `templates_dir`, ignoring case.
///
/// A file named like the image is used as the Dockerfile with the templates
/// directory as context. A directory named like the image is used as context
/// when it contains a `Dockerfile`.
pub fn resolve(templates_dir: &Path, image_name: &str) -> Result<BuildContext> {
    let not_found = || BoxError::TemplateNotFound {
        name: image_name.to_string(),
        dir: templates_dir.to_path_buf(),
    };

    let entries = match fs::read_dir(templates_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(BoxError::io(templates_dir, e)),
    };

    let mut names: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.eq_ignore_ascii_case(image_name))
        .collect();
    names.sort();

    for name in names {
        let path = templates_dir.join(&name);
        if path.is_file() {
            debug!("Using template file {}", path.display());
            return Ok(BuildContext {
                dir: templates_dir.to_path_buf(),
                dockerfile: name,
            });
        }
        if path.join(DOCKERFILE_NAME).is_file() {
            debug!("Using template directory {}", path.display());
            return Ok(BuildContext {
                dir: path,
                dockerfile: DOCKERFILE_NAME.to_string(),
            });
        }
    }

    Err(not_found())
}

/// Write the bundled templates into `dir`, replacing existing copies.
pub fn init(dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| BoxError::io(dir, e))?;

    let mut written = Vec::with_capacity(BUNDLED.len());
    for (name, contents) in BUNDLED {
        let path = dir.join(name);
        fs::write(&path, contents).map_err(|e| BoxError::io(&path, e))?;
        written.push(path);
    }

    info!("Initialized templates in {}", dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_resolve_base() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("env");

        let written = init(&templates).unwrap();
        assert_eq!(written.len(), 2);

        let context = resolve(&templates, "BASE").unwrap();
        assert_eq!(context.dir, templates);
        assert_eq!(context.dockerfile, "base");
    }

    #[test]
    fn test_init_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base"), "FROM scratch\n").unwrap();

        init(dir.path()).unwrap();
        let contents = fs::read_to_string(dir.path().join("base")).unwrap();
        assert!(contents.contains("setup.sh"));
    }

    #[test]
    fn test_resolve_directory_template() {
        let dir = TempDir::new().unwrap();
        let golang = dir.path().join("Golang");
        fs::create_dir_all(&golang).unwrap();
        fs::write(golang.join("Dockerfile"), "FROM golang:1.22\n").unwrap();

        let context = resolve(dir.path(), "golang").unwrap();
        assert_eq!(context.dir, golang);
        assert_eq!(context.dockerfile, "Dockerfile");
    }

    #[test]
    fn test_resolve_missing_template() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("rust")).unwrap();

        assert!(matches!(
            resolve(dir.path(), "rust"),
            Err(BoxError::TemplateNotFound { .. })
        ));
        assert!(matches!(
            resolve(&dir.path().join("missing"), "base"),
            Err(BoxError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn test_archive_contains_context_files() {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        let context = resolve(dir.path(), "base").unwrap();

        let bytes = context.archive().unwrap();
        let mut archive = tar::Archive::new(bytes.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("base")));
        assert!(names.iter().any(|n| n.ends_with("setup.sh")));
    }

    #[test]
    fn test_context_from_dockerfile() {
        let dir = TempDir::new().unwrap();
        let dockerfile = dir.path().join("Dockerfile.dev");
        fs::write(&dockerfile, "FROM alpine\n").unwrap();

        let context = BuildContext::from_dockerfile(&dockerfile).unwrap();
        assert_eq!(context.dir, dir.path());
        assert_eq!(context.dockerfile, "Dockerfile.dev");

        assert!(matches!(
            BuildContext::from_dockerfile(&dir.path().join("nope")),
            Err(BoxError::NotFound(_))
        ));
    }
}
