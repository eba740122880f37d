//! Model file auto-download from HuggingFace.
//!
//! Fetches the `all-MiniLM-L6-v2` ONNX export and tokenizer files on first
//! use. Files already on disk are never re-downloaded.
use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Base URL for HuggingFace model files.
const HF_BASE: &str = "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main";

/// Files required for the embedder, with their relative URL paths.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
    ("special_tokens_map.json", "special_tokens_map.json"),
    ("tokenizer_config.json", "tokenizer_config.json"),
];

/// Return the default model directory path.
#[must_use]
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models/all-MiniLM-L6-v2")
}

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

/// Download model files from HuggingFace if any are missing.
pub fn download_model_files(model_dir: &Path) -> Result<()> {
    if all_files_present(model_dir) {
        info!("All model files found in {}", model_dir.display());
        return Ok(());
    }

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    eprintln!("Downloading embedding model (~90MB, one-time)...");

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(600))
        .build()
        .context("failed to build HTTP client")?;

    for &(filename, url_path) in MODEL_FILES {
        let dest = model_dir.join(filename);
        if dest.exists() {
            continue;
        }

        let url = format!("{HF_BASE}/{url_path}");
        info!("Downloading {filename} from {url}");
        download_file(&client, &dest, &url)
            .with_context(|| format!("failed to download {filename}"))?;
    }

    eprintln!("Model download complete.");
    Ok(())
}

/// Stream one file to `<dest>.part` with a progress bar, then rename it
/// into place so an interrupted download is never mistaken for a model.
fn download_file(client: &reqwest::blocking::Client, dest: &Path, url: &str) -> Result<()> {
    let mut resp = client
        .get(url)
        .send()
        .with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let pb = match resp.content_length() {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
                    .context("invalid progress template")?
                    .progress_chars("█▓░"),
            );
            pb
        }
        _ => ProgressBar::new_spinner(),
    };
    if let Some(name) = dest.file_name() {
        pb.set_message(name.to_string_lossy().into_owned());
    }

    let partial = dest.with_extension("part");
    let file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;
    let mut writer = pb.wrap_write(BufWriter::new(file));

    io::copy(&mut resp, &mut writer).context("failed to write model file")?;
    drop(writer);
    pb.finish_and_clear();

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move {} into place", partial.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_all_files_present_empty_dir() {
        let dir = tempdir().unwrap();
        assert!(!all_files_present(dir.path()));
    }

    #[test]
    fn test_all_files_present_complete() {
        let dir = tempdir().unwrap();
        for &(name, _) in MODEL_FILES {
            fs::write(dir.path().join(name), "dummy").unwrap();
        }
        assert!(all_files_present(dir.path()));
    }

    #[test]
    fn test_all_files_present_partial() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("tokenizer.json"), "dummy").unwrap();
        assert!(!all_files_present(dir.path()));
    }

    #[test]
    fn test_download_skipped_when_present() {
        let dir = tempdir().unwrap();
        for &(name, _) in MODEL_FILES {
            fs::write(dir.path().join(name), "dummy").unwrap();
        }
        // No network access needed
        assert!(download_model_files(dir.path()).is_ok());
    }

    #[test]
    fn test_default_model_dir() {
        let dir = default_model_dir();
        assert!(dir.to_string_lossy().contains("all-MiniLM-L6-v2"));
    }
}
