//! Render the live-preview document of a file.

use anyhow::{bail, Context, Result};
use codesync_client::ClientConfig;
use codesync_core::{is_previewable_name, render_artifact, PreviewArtifact, PreviewMode};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Render a file into a preview artifact, stamped with `rendered_at`.
pub async fn render(path: &Path, rendered_at: u64) -> Result<PreviewArtifact> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Preview source needs a file name")?;
    if !is_previewable_name(file_name) {
        bail!("{} is not an HTML document", file_name);
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    render_artifact(file_name, &content, rendered_at)
        .with_context(|| format!("Failed to render preview of {}", file_name))
}

/// Run the preview command.
pub async fn run(
    path: &Path,
    mode: PreviewMode,
    output: Option<&Path>,
    config: &ClientConfig,
) -> Result<()> {
    tracing::debug!(
        "Rendering {} for {:?} preview (regenerates after {:?} of quiet)",
        path.display(),
        mode,
        config.preview_timing().for_mode(mode)
    );

    let artifact = render(path, now_millis()).await?;

    match output {
        Some(out) => {
            tokio::fs::write(out, &artifact.markup)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            tracing::info!(
                "Wrote preview of {} to {} ({} bytes)",
                artifact.file_name,
                out.display(),
                artifact.markup.len()
            );
        }
        None => print!("{}", artifact.markup),
    }

    Ok(())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesync_core::BADGE_CLASS;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fragment_is_wrapped_with_one_badge() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, "<p>hi</p>").unwrap();

        let artifact = render(&path, 0).await.unwrap();

        assert!(artifact.markup.starts_with("<!DOCTYPE html>"));
        assert!(artifact.markup.contains("<p>hi</p>"));
        let badge = format!("class=\"{BADGE_CLASS}\"");
        assert_eq!(artifact.markup.matches(&badge).count(), 1);
        assert!(artifact.markup.contains("00:00:00"));
    }

    #[tokio::test]
    async fn malformed_markup_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.html");
        std::fs::write(&path, "<p>hi</p><div").unwrap();

        let err = render(&path, 0).await.unwrap_err();
        assert!(err.to_string().contains("broken.html"));
    }

    #[tokio::test]
    async fn non_html_file_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("style.css");
        std::fs::write(&path, "p {}").unwrap();

        assert!(render(&path, 0).await.is_err());
    }

    #[tokio::test]
    async fn output_file_receives_markup() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("page.htm");
        let out = dir.path().join("out.html");
        std::fs::write(&source, "<html><body><h1>x</h1></body></html>").unwrap();

        run(&source, PreviewMode::Inline, Some(&out), &ClientConfig::default())
            .await
            .unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        let badge = written.find(BADGE_CLASS).unwrap();
        assert!(badge < written.find("</body>").unwrap());
    }
}
