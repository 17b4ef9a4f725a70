// ABOUTME: Namespaced image lookup, on-demand template builds, listing and removal
// ABOUTME: Consumes the runtime build stream and turns error frames into build failures

use crate::error::{BoxError, Result};
use crate::naming;
use crate::runtime::{self, BuildSpec, BuildStream, ContainerRuntime};
use crate::templates::{self, BuildContext};
use crate::types::{ImageInfo, ImageRef};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const DIGEST_PREFIX: &str = "sha256:";

/// Receives each non-empty build log line.
pub type LogSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

pub struct ImageService {
    runtime: Arc<dyn ContainerRuntime>,
    templates_dir: PathBuf,
}

impl ImageService {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            templates_dir: templates_dir.into(),
        }
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    /// Make sure `vbox-<name>:<version>` exists, building it from its template if not.
    /// Returns whether a build ran.
    pub async fn ensure_image(
        &self,
        image: &ImageRef,
        cancel: &CancellationToken,
        on_log: LogSink<'_>,
    ) -> Result<bool> {
        let tag = naming::image_tag(&image.name, &image.version);
        let exists = runtime::call(cancel, "inspect image", &tag, self.runtime.image_exists(&tag))
            .await?;
        if exists {
            debug!("Image {} already present", tag);
            return Ok(false);
        }

        let context = templates::resolve(&self.templates_dir, &image.name)?;
        info!(
            "Image {} not found, building from template {}",
            tag,
            context.dir.join(&context.dockerfile).display()
        );
        self.build(&context, image, cancel, on_log).await?;
        Ok(true)
    }

    /// Build an image from an explicit Dockerfile path.
    pub async fn build_from_dockerfile(
        &self,
        dockerfile: &Path,
        image: &ImageRef,
        cancel: &CancellationToken,
        on_log: LogSink<'_>,
    ) -> Result<()> {
        let context = BuildContext::from_dockerfile(dockerfile)?;
        self.build(&context, image, cancel, on_log).await
    }

    /// Success means the stream ended without an error frame.
    pub async fn build(
        &self,
        context: &BuildContext,
        image: &ImageRef,
        cancel: &CancellationToken,
        on_log: LogSink<'_>,
    ) -> Result<()> {
        let tag = naming::image_tag(&image.name, &image.version);
        let spec = BuildSpec {
            tag: tag.clone(),
            dockerfile: context.dockerfile.clone(),
            context: context.archive()?,
            remove_intermediate: true,
            no_cache: false,
            build_args: HashMap::new(),
        };

        let stream =
            runtime::call(cancel, "build image", &tag, self.runtime.build_image(spec)).await?;
        consume_build(&tag, stream, cancel, on_log).await?;

        info!("Built image {}", tag);
        Ok(())
    }

    /// Every `vbox-<name>:<version>` tag present in the runtime, one entry per tag.
    pub async fn list(&self, cancel: &CancellationToken) -> Result<Vec<ImageInfo>> {
        let summaries =
            runtime::call(cancel, "list", "images", self.runtime.list_images()).await?;

        let mut images = Vec::new();
        for summary in summaries {
            for tag in &summary.repo_tags {
                let Some((name, version)) = naming::parse_image_tag(tag) else {
                    continue;
                };
                images.push(ImageInfo {
                    id: summary
                        .id
                        .strip_prefix(DIGEST_PREFIX)
                        .unwrap_or(&summary.id)
                        .to_string(),
                    name,
                    version,
                    size: summary.size,
                    created: DateTime::<Utc>::from_timestamp(summary.created, 0)
                        .unwrap_or_default(),
                });
            }
        }
        Ok(images)
    }

    /// Remove a vbox image by ID (full or prefix) or by `name:version`.
    /// Images without a vbox tag are reported as not found.
    pub async fn remove(&self, reference: &str, force: bool, cancel: &CancellationToken) -> Result<()> {
        let images = self.list(cancel).await?;
        let wanted = reference.strip_prefix(DIGEST_PREFIX).unwrap_or(reference);

        let by_name = wanted.parse::<ImageRef>().ok();
        let matched = images.iter().find(|img| match &by_name {
            Some(r) => img.name == r.name && img.version == r.version,
            None => !wanted.is_empty() && img.id.starts_with(wanted),
        });

        let Some(image) = matched else {
            return Err(BoxError::NotFound(format!("image {}", reference)));
        };

        // A tag removes just that tag; an ID removes the image
        let target = match &by_name {
            Some(r) => naming::image_tag(&r.name, &r.version),
            None => format!("{}{}", DIGEST_PREFIX, image.id),
        };

        runtime::call(
            cancel,
            "remove image",
            &target,
            self.runtime.remove_image(&target, force, true),
        )
        .await
    }
}

/// Drain a build stream. An error frame fails the build; cancellation aborts it.
pub async fn consume_build(
    tag: &str,
    mut stream: BuildStream,
    cancel: &CancellationToken,
    on_log: LogSink<'_>,
) -> Result<()> {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(BoxError::BuildCancelled(tag.to_string()));
            }
            frame = stream.receiver.recv() => frame,
        };

        let Some(frame) = frame else {
            return Ok(());
        };

        if let Some(message) = frame.error {
            return Err(BoxError::Build(message.trim().to_string()));
        }

        if let Some(line) = frame.stream {
            let line = line.trim_end();
            if !line.is_empty() {
                on_log(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::BuildFrame;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn stream_of(frames: Vec<BuildFrame>) -> BuildStream {
        let (tx, rx) = mpsc::channel(frames.len().max(1));
        for frame in frames {
            tx.try_send(frame).unwrap();
        }
        BuildStream { receiver: rx }
    }

    #[tokio::test]
    async fn test_clean_stream_succeeds_and_forwards_logs() {
        let lines = Mutex::new(Vec::new());
        let sink = |line: &str| lines.lock().unwrap().push(line.to_string());

        let stream = stream_of(vec![
            BuildFrame::log("Step 1/3 : FROM ubuntu\n"),
            BuildFrame::log("\n"),
            BuildFrame::log("Successfully built abc\n"),
        ]);
        consume_build("vbox-base:1.0", stream, &CancellationToken::new(), &sink)
            .await
            .unwrap();

        assert_eq!(
            *lines.lock().unwrap(),
            vec!["Step 1/3 : FROM ubuntu", "Successfully built abc"]
        );
    }

    #[tokio::test]
    async fn test_error_frame_fails_build() {
        let stream = stream_of(vec![
            BuildFrame::log("Step 1/3 : FROM ubuntu\n"),
            BuildFrame::failure("The command '/bin/sh -c false' returned a non-zero code: 1"),
            BuildFrame::log("never read\n"),
        ]);
        let result =
            consume_build("vbox-base:1.0", stream, &CancellationToken::new(), &|_| {}).await;

        match result {
            Err(BoxError::Build(message)) => assert!(message.contains("non-zero code")),
            other => panic!("expected build error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_build() {
        let (_tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = consume_build(
            "vbox-base:1.0",
            BuildStream { receiver: rx },
            &cancel,
            &|_| {},
        )
        .await;
        assert!(matches!(result, Err(BoxError::BuildCancelled(_))));
    }
}
