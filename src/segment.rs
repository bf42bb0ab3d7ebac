use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{Result, SubburnError};
use crate::media::MediaEncoder;

/// Remainders shorter than this are treated as rounding noise of the probe
const DURATION_EPSILON: f64 = 1e-6;

/// Time range of one chunk before it is written to disk
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChunkSpan {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl ChunkSpan {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// One encoded segment of the source, owned by a [`Workspace`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub path: PathBuf,
}

/// Per-run temporary directory. Removed recursively when released or dropped.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl Workspace {
    /// Create a fresh workspace under `root`, or under the system temp dir
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("subburn-");

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let path = dir.path().to_path_buf();
        debug!("Created workspace {}", path.display());

        Ok(Self { path, dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the directory now. Failures are logged, never returned.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!("Removed workspace {}", self.path.display()),
                Err(e) => warn!("Cleanup warning: failed to remove workspace {}: {}", self.path.display(), e),
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Compute chunk boundaries stepping through `[0, total)` by `step`.
///
/// Boundary `i` is `i * step`; the final chunk ends exactly at `total` and is
/// shorter than `step` when `total` is not a multiple of it.
pub fn plan_chunks(total: f64, step: f64) -> Result<Vec<ChunkSpan>> {
    if !(step.is_finite() && step > 0.0) {
        return Err(SubburnError::Config(format!("chunk duration must be positive, got {}", step)));
    }
    if !(total.is_finite() && total > DURATION_EPSILON) {
        return Err(SubburnError::Segmentation(format!("source has no duration ({})", total)));
    }

    let count = (((total - DURATION_EPSILON) / step).ceil() as usize).max(1);

    let spans = (0..count)
        .map(|index| {
            let start = index as f64 * step;
            let end = if index + 1 == count {
                total
            } else {
                (index + 1) as f64 * step
            };
            ChunkSpan { index, start, end }
        })
        .collect();

    Ok(spans)
}

/// Writes chunks of a source video into a new workspace
pub struct Segmenter {
    encoder: Arc<dyn MediaEncoder>,
    workspace_root: Option<PathBuf>,
}

impl Segmenter {
    pub fn new(encoder: Arc<dyn MediaEncoder>, workspace_root: Option<PathBuf>) -> Self {
        Self { encoder, workspace_root }
    }

    /// Split `source` into chunks of `chunk_duration` seconds.
    ///
    /// The returned workspace owns every chunk file; the caller is responsible
    /// for releasing it. On error no workspace survives.
    pub async fn segment(&self, source: &Path, chunk_duration: f64) -> Result<(Vec<Chunk>, Workspace)> {
        if !source.is_file() {
            return Err(SubburnError::Segmentation(format!(
                "cannot open source {}",
                source.display()
            )));
        }

        let media = self
            .encoder
            .probe(source)
            .await
            .map_err(|e| e.into_stage(|m| SubburnError::Segmentation(format!("cannot read source: {}", m))))?;

        let spans = plan_chunks(media.duration, chunk_duration)?;
        info!(
            "Segmenting {} ({:.3}s) into {} chunks of {}s",
            source.display(),
            media.duration,
            spans.len(),
            chunk_duration
        );

        let workspace = Workspace::create(self.workspace_root.as_deref())
            .map_err(|e| e.into_stage(|m| SubburnError::Segmentation(format!("cannot create workspace: {}", m))))?;

        let mut chunks = Vec::with_capacity(spans.len());
        for span in spans {
            let path = workspace.join(format!("chunk_{:04}.mp4", span.index));

            self.encoder
                .cut(source, &media, span.start, span.duration(), &path)
                .await
                .map_err(|e| {
                    e.into_stage(|m| {
                        SubburnError::Segmentation(format!("chunk {} could not be written: {}", span.index, m))
                    })
                })?;

            if !path.is_file() {
                return Err(SubburnError::Segmentation(format!(
                    "chunk {} was not written to {}",
                    span.index,
                    path.display()
                )));
            }

            debug!("Wrote chunk {} [{:.3}, {:.3})", span.index, span.start, span.end);
            chunks.push(Chunk {
                index: span.index,
                start: span.start,
                end: span.end,
                path,
            });
        }

        Ok((chunks, workspace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twelve_seconds_in_five_second_chunks() {
        let spans = plan_chunks(12.0, 5.0).unwrap();
        let ranges: Vec<(f64, f64)> = spans.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0.0, 5.0), (5.0, 10.0), (10.0, 12.0)]);
        assert_eq!(spans.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let spans = plan_chunks(10.0, 5.0).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].end, 10.0);
    }

    #[test]
    fn test_short_source_is_single_chunk() {
        let spans = plan_chunks(0.5, 5.0).unwrap();
        assert_eq!(spans, vec![ChunkSpan { index: 0, start: 0.0, end: 0.5 }]);
    }

    #[test]
    fn test_coverage_without_gaps_or_overlap() {
        for &(total, step) in &[(12.0, 5.0), (59.94, 5.0), (3.3, 0.7), (100.0, 3.0), (7.0, 7.0), (1.0, 10.0)] {
            let spans = plan_chunks(total, step).unwrap();
            assert_eq!(spans[0].start, 0.0);
            assert_eq!(spans.last().unwrap().end, total);
            for pair in spans.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
                assert!((pair[0].duration() - step).abs() < 1e-9);
            }
            for span in &spans {
                assert!(span.end > span.start);
                assert!(span.duration() <= step + 1e-9);
                assert_eq!(span.start, span.index as f64 * step);
            }
        }
    }

    #[test]
    fn test_remainder_is_strictly_shorter() {
        let spans = plan_chunks(11.0, 5.0).unwrap();
        let last = spans.last().unwrap();
        assert!(last.duration() < 5.0);
        assert_eq!(last.duration(), 1.0);
    }

    #[test]
    fn test_zero_duration_is_segmentation_error() {
        assert!(matches!(plan_chunks(0.0, 5.0), Err(SubburnError::Segmentation(_))));
        assert!(matches!(plan_chunks(f64::NAN, 5.0), Err(SubburnError::Segmentation(_))));
    }

    #[test]
    fn test_non_positive_step_is_rejected() {
        assert!(matches!(plan_chunks(12.0, 0.0), Err(SubburnError::Config(_))));
        assert!(matches!(plan_chunks(12.0, -1.0), Err(SubburnError::Config(_))));
    }

    #[test]
    fn test_workspace_removed_on_release_and_drop() {
        let root = tempfile::tempdir().unwrap();

        let workspace = Workspace::create(Some(root.path())).unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::create_dir(path.join("nested")).unwrap();
        std::fs::write(path.join("nested").join("chunk_0000.mp4"), b"x").unwrap();
        assert!(path.is_dir());
        workspace.release();
        assert!(!path.exists());

        let workspace = Workspace::create(Some(root.path())).unwrap();
        let path = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!path.exists());
    }
}
