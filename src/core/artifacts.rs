//! # Artifact Collection Module / 产物收集模块
//!
//! Recorders stage their bytes in a temporary file inside the output
//! directory while a case runs; at teardown the capture policy and the final
//! status decide whether each staged file is renamed into the attempt's
//! artifact directory or deleted.
//!
//! 记录器在用例运行期间将数据暂存在输出目录内的临时文件中；
//! 在清理时，捕获策略和最终状态决定每个暂存文件是被重命名到该次尝试的产物目录中还是被删除。

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::error::ArtifactError;
use crate::core::models::{Artifact, ArtifactKind, CapturePolicy, ExecutionStatus};

struct Recorder {
    kind: ArtifactKind,
    policy: CapturePolicy,
    staged: Option<NamedTempFile>,
    bytes: u64,
    broken: bool,
}

/// Per-context artifact recorders.
/// 每个执行上下文的产物记录器。
pub struct ArtifactCollector {
    staging_dir: PathBuf,
    artifact_dir: PathBuf,
    recorders: Vec<Recorder>,
    notes: Vec<String>,
}

/// What survived teardown.
#[derive(Debug, Default)]
pub struct CollectedArtifacts {
    pub artifacts: Vec<Artifact>,
    pub notes: Vec<String>,
}

impl ArtifactCollector {
    /// Creates recorders for the kinds whose policy records during `attempt`.
    /// Kinds with policy `never` get no recorder at all.
    pub fn new<I>(staging_dir: &Path, artifact_dir: PathBuf, policies: I, attempt: u32) -> Self
    where
        I: IntoIterator<Item = (ArtifactKind, CapturePolicy)>,
    {
        let recorders = policies
            .into_iter()
            .filter(|(_, policy)| policy.records_attempt(attempt))
            .map(|(kind, policy)| Recorder {
                kind,
                policy,
                staged: None,
                bytes: 0,
                broken: false,
            })
            .collect();
        Self {
            staging_dir: staging_dir.to_path_buf(),
            artifact_dir,
            recorders,
            notes: Vec::new(),
        }
    }

    pub fn is_recording(&self, kind: ArtifactKind) -> bool {
        self.recorders.iter().any(|r| r.kind == kind && !r.broken)
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Appends bytes to the recorder of `kind`. A staging failure disables
    /// that recorder and is kept as a note for the result.
    pub fn append(&mut self, kind: ArtifactKind, data: &[u8]) {
        let staging_dir = &self.staging_dir;
        let Some(recorder) = self.recorders.iter_mut().find(|r| r.kind == kind && !r.broken) else {
            return;
        };
        if let Err(e) = recorder.write(staging_dir, data) {
            warn!(error = %e, "artifact recorder disabled");
            recorder.broken = true;
            recorder.staged = None;
            self.notes.push(e.to_string());
        }
    }

    /// Persists or discards every staged recording according to its policy
    /// and the attempt's final `status`.
    ///
    /// 根据策略和该次尝试的最终 `status` 持久化或丢弃每个暂存的记录。
    pub fn finalize(self, status: ExecutionStatus) -> CollectedArtifacts {
        let mut collected = CollectedArtifacts {
            artifacts: Vec::new(),
            notes: self.notes,
        };
        for recorder in self.recorders {
            let Some(staged) = recorder.staged else {
                continue;
            };
            if recorder.bytes == 0 || !recorder.policy.retains(status) {
                debug!(kind = recorder.kind.as_str(), %status, "discarding staged recording");
                drop(staged);
                continue;
            }
            match persist(staged, &self.artifact_dir, recorder.kind) {
                Ok(path) => collected.artifacts.push(Artifact {
                    kind: recorder.kind,
                    policy: recorder.policy,
                    path,
                    bytes: recorder.bytes,
                }),
                Err(e) => {
                    warn!(error = %e, "failed to keep artifact");
                    collected.notes.push(e.to_string());
                }
            }
        }
        collected
    }
}

impl Recorder {
    fn write(&mut self, staging_dir: &Path, data: &[u8]) -> Result<(), ArtifactError> {
        let kind = self.kind;
        let stage_error = |source| ArtifactError::Stage {
            kind: kind.as_str(),
            source,
        };
        if self.staged.is_none() {
            let file = tempfile::Builder::new()
                .prefix(".staging-")
                .suffix(kind.file_name())
                .tempfile_in(staging_dir)
                .map_err(stage_error)?;
            self.staged = Some(file);
        }
        if let Some(file) = self.staged.as_mut() {
            file.write_all(data).map_err(stage_error)?;
            self.bytes += data.len() as u64;
        }
        Ok(())
    }
}

fn persist(staged: NamedTempFile, dir: &Path, kind: ArtifactKind) -> Result<PathBuf, ArtifactError> {
    let path = dir.join(kind.file_name());
    let persist_error = |source| ArtifactError::Persist {
        kind: kind.as_str(),
        path: path.clone(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(persist_error)?;
    let mut file = staged.persist(&path).map_err(|e| persist_error(e.error))?;
    file.flush().map_err(persist_error)?;
    Ok(path)
}
