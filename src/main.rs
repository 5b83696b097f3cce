use anyhow::{bail, Context, Result};
use clap::Parser;
use heritage_weaver::app::App;
use heritage_weaver::config::Config;
use heritage_weaver::mime::detect_image_mime;
use heritage_weaver::models::Fragment;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "heritage-weaver")]
#[command(about = "Reconstruct a broken object from photographs of its fragments")]
struct CliArgs {
    /// Extra description of the object; a generic restoration prompt is used when omitted.
    #[arg(short, long)]
    prompt: Option<String>,

    /// Directory for the generated image (overrides OUTPUT_DIR).
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Fragment image files, in order.
    #[arg(value_name = "FRAGMENT")]
    fragments: Vec<PathBuf>,
}

async fn read_fragments(paths: &[PathBuf], max_bytes: usize) -> Result<Vec<Fragment>> {
    let mut fragments = Vec::with_capacity(paths.len());
    for path in paths {
        let size = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat fragment {}", path.display()))?
            .len();
        if size > max_bytes as u64 {
            bail!(
                "Fragment {} is {} bytes, larger than the {} byte limit",
                path.display(),
                size,
                max_bytes
            );
        }

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read fragment {}", path.display()))?;
        let mime_type = detect_image_mime(&bytes).unwrap_or("application/octet-stream");

        let mut fragment = Fragment::new(mime_type, bytes);
        if let Some(name) = path.file_name() {
            fragment = fragment.with_file_name(name.to_string_lossy());
        }
        fragments.push(fragment);
    }
    Ok(fragments)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heritage_weaver=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let mut config = Config::from_env()?;
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }

    info!("Starting heritage-weaver");
    let app = App::from_config(&config)?;
    let fragments = read_fragments(&args.fragments, config.max_fragment_bytes).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling reconstruction");
            on_interrupt.cancel();
        }
    });

    match app.reconstruct(args.prompt, fragments, &cancel).await {
        Ok(reconstruction) => {
            info!("Saved image at {}", reconstruction.stored.path.display());
            println!("{}", serde_json::to_string_pretty(&reconstruction)?);
            Ok(())
        }
        Err(e) => {
            error!("Reconstruction failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_prompt_and_fragments() {
        let args = CliArgs::parse_from(["heritage-weaver", "-p", "vase", "a.png", "b.jpg"]);
        assert_eq!(args.prompt.as_deref(), Some("vase"));
        assert_eq!(args.fragments.len(), 2);
        assert!(args.output_dir.is_none());
    }

    #[tokio::test]
    async fn test_unrecognised_file_gets_non_image_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"just text").unwrap();

        let fragments = read_fragments(&[path], 1024).await.unwrap();
        assert_eq!(fragments[0].mime_type, "application/octet-stream");
        assert_eq!(fragments[0].file_name.as_deref(), Some("notes.txt"));
    }

    #[tokio::test]
    async fn test_oversized_file_is_not_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        std::fs::write(&path, vec![0x89; 33]).unwrap();

        let err = read_fragments(&[path.clone()], 32).await.unwrap_err();
        assert!(err.to_string().contains("larger than the 32 byte limit"));
        assert_eq!(read_fragments(&[path], 33).await.unwrap().len(), 1);
    }
}
