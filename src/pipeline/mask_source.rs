// src/pipeline/mask_source.rs
//
// Reads pre-thresholded top-down masks from disk, one file per frame in
// file-name order, and decodes them ahead of the tracker on a blocking
// task. Decoded frames arrive through a bounded channel so the tracking
// loop never waits on image I/O unless the loader falls behind.

use super::metrics::RunMetrics;
use crate::types::{BinaryMask, InputConfig};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug)]
pub struct MaskFrame {
    /// Position in the sorted file list.
    pub index: usize,
    pub path: PathBuf,
    pub mask: BinaryMask,
}

/// Mask files under `input.mask_dir`, sorted by path.
pub fn find_mask_files(input: &InputConfig) -> Result<Vec<PathBuf>> {
    let root = Path::new(&input.mask_dir);
    if !root.is_dir() {
        bail!("mask directory {} does not exist", root.display());
    }

    let mut masks = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if input
                .extensions
                .iter()
                .any(|wanted| wanted.eq_ignore_ascii_case(ext))
            {
                masks.push(path.to_path_buf());
            }
        }
    }
    masks.sort();

    info!("Found {} mask files in {}", masks.len(), root.display());
    Ok(masks)
}

/// Decode one mask image.
pub fn load_mask(path: &Path, on_threshold: u8) -> Result<BinaryMask> {
    let image = image::open(path)
        .with_context(|| format!("decoding mask {}", path.display()))?
        .to_luma8();
    Ok(BinaryMask::from_luma(&image, on_threshold))
}

/// Start decoding `files` on a blocking task.
///
/// Files that fail to decode are skipped with a warning. A mask whose size
/// differs from the first one is sent as an error and ends the stream: the
/// trackers cannot mix geometries within one video.
pub fn spawn_loader(
    files: Vec<PathBuf>,
    input: &InputConfig,
    metrics: Arc<RunMetrics>,
) -> mpsc::Receiver<Result<MaskFrame>> {
    let (tx, rx) = mpsc::channel(input.prefetch.max(1));
    let threshold = input.on_threshold;

    tokio::task::spawn_blocking(move || {
        let mut dims: Option<(usize, usize)> = None;
        for (index, path) in files.into_iter().enumerate() {
            let mask = match load_mask(&path, threshold) {
                Ok(mask) => mask,
                Err(e) => {
                    metrics.inc(&metrics.decode_failures);
                    warn!("⚠️ Skipping {}: {:#}", path.display(), e);
                    continue;
                }
            };
            metrics.inc(&metrics.frames_decoded);

            let size = (mask.width(), mask.height());
            let expected = *dims.get_or_insert(size);
            if size != expected {
                let err = anyhow::anyhow!(
                    "mask {} is {}x{}, expected {}x{}",
                    path.display(),
                    size.0,
                    size.1,
                    expected.0,
                    expected.1
                );
                let _ = tx.blocking_send(Err(err));
                return;
            }

            if tx.blocking_send(Ok(MaskFrame { index, path, mask })).is_err() {
                // receiver dropped: the run was stopped
                return;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lane-tracking-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_mask(path: &Path, w: u32, h: u32, on_column: u32) {
        let img = image::GrayImage::from_fn(w, h, |x, _| {
            image::Luma([if x == on_column { 255 } else { 0 }])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_find_mask_files_filters_and_sorts() {
        let dir = temp_dir("find");
        write_mask(&dir.join("b.png"), 4, 4, 1);
        write_mask(&dir.join("a.PNG"), 4, 4, 1);
        fs::write(dir.join("notes.txt"), "x").unwrap();

        let input = InputConfig {
            mask_dir: dir.to_string_lossy().into_owned(),
            ..InputConfig::default()
        };
        let files = find_mask_files(&input).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.png"]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_dir_is_error() {
        let input = InputConfig {
            mask_dir: "/nonexistent/lane-masks".to_string(),
            ..InputConfig::default()
        };
        assert!(find_mask_files(&input).is_err());
    }

    #[test]
    fn test_load_mask_thresholds() {
        let dir = temp_dir("load");
        let path = dir.join("m.png");
        write_mask(&path, 5, 3, 2);
        let mask = load_mask(&path, 128).unwrap();
        assert_eq!((mask.width(), mask.height()), (5, 3));
        assert_eq!(mask.count_on(), 3);
        assert!(mask.is_on(2, 1));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_loader_stops_on_size_change() {
        let dir = temp_dir("loader");
        write_mask(&dir.join("0.png"), 8, 6, 1);
        write_mask(&dir.join("1.png"), 8, 6, 2);
        write_mask(&dir.join("2.png"), 9, 6, 2);
        fs::write(dir.join("3.png"), b"not an image").unwrap();

        let input = InputConfig {
            mask_dir: dir.to_string_lossy().into_owned(),
            prefetch: 1,
            ..InputConfig::default()
        };
        let files = find_mask_files(&input).unwrap();
        let metrics = Arc::new(RunMetrics::new());
        let mut rx = spawn_loader(files, &input, Arc::clone(&metrics));

        let mut ok = 0;
        let mut errors = 0;
        while let Some(frame) = rx.recv().await {
            match frame {
                Ok(f) => {
                    assert_eq!(f.index, ok);
                    ok += 1;
                }
                Err(_) => errors += 1,
            }
        }
        assert_eq!(ok, 2);
        assert_eq!(errors, 1);
        fs::remove_dir_all(&dir).unwrap();
    }
}
