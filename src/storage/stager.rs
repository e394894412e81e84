use std::io;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tracing::{debug, info, warn};

const INPUT_PREFIX: &str = "upload-";
/// Prefix of the files actix-multipart spools uploads into
const SPOOL_PREFIX: &str = ".tmp";
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to create scratch file in {dir}: {source}")]
    Create {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write upload to scratch storage: {0}")]
    Write(#[source] io::Error),
}

/// An uploaded file moved into the scratch area.
///
/// Releasing consumes the value, so an input can only be released once.
/// If it is dropped unreleased (a panicking runner, a rejected upload) the
/// file is still deleted.
#[derive(Debug)]
pub struct StagedInput {
    path: TempPath,
}

impl StagedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Owns the scratch area for uploads and the output area for artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStager {
    scratch_dir: PathBuf,
    output_dir: PathBuf,
    extension: &'static str,
}

impl ArtifactStager {
    /// `extension` is the artifact container's file extension, e.g. `webm`.
    pub fn new(scratch_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, extension: &'static str) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            output_dir: output_dir.into(),
            extension,
        }
    }

    /// Where multipart uploads should be spooled so adopting them is a rename
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Create the scratch and output directories if they don't exist yet
    pub async fn prepare(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await
    }

    /// Take ownership of a spooled upload under a uniquely named scratch file.
    ///
    /// The upload is renamed into place; it is copied only when it lives on
    /// another filesystem. The declared name only contributes a sanitized
    /// extension, so two uploads with the same name always get different
    /// files. On failure nothing is left behind.
    pub async fn adopt_input(&self, upload: NamedTempFile, suggested_name: &str) -> Result<StagedInput, StageError> {
        let suffix = sanitized_extension(suggested_name);
        let scratch_dir = self.scratch_dir.clone();

        let path = tokio::task::spawn_blocking(move || adopt_blocking(upload, &scratch_dir, &suffix))
            .await
            .map_err(|e| StageError::Write(io::Error::other(e)))??;

        debug!("Staged upload at {}", path.display());
        Ok(StagedInput { path })
    }

    /// Delete a staged input. Failures are logged, never returned.
    pub fn release_input(&self, input: StagedInput) {
        let shown = input.path().display().to_string();
        match input.path.close() {
            Ok(()) => debug!("Released staged input {}", shown),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete staged input {}: {}", shown, e),
        }
    }

    /// Where the finished artifact of job `id` lives
    pub fn output_path(&self, id: i32) -> PathBuf {
        self.output_dir.join(format!("{}.{}", id, self.extension))
    }

    /// Best-effort removal of an output that must not be served
    pub async fn discard_output(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!("Removed unusable output {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove output {}: {}", path.display(), e),
        }
    }

    /// Delete staged inputs, spooled uploads and partial outputs left by a
    /// previous process.
    ///
    /// Must run before the server and any worker start. Returns the number of
    /// files removed.
    pub async fn purge_leftovers(&self) -> io::Result<usize> {
        let mut removed = 0;
        removed += remove_matching(&self.scratch_dir, |name| {
            name.starts_with(INPUT_PREFIX) || name.starts_with(SPOOL_PREFIX)
        })
        .await?;
        removed += remove_matching(&self.output_dir, |name| name.ends_with(PARTIAL_SUFFIX)).await?;
        Ok(removed)
    }
}

/// Path an encoder writes to before the artifact is complete
pub fn partial_path(output: &Path) -> PathBuf {
    let mut partial = output.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    PathBuf::from(partial)
}

fn adopt_blocking(upload: NamedTempFile, scratch_dir: &Path, suffix: &str) -> Result<TempPath, StageError> {
    // Reserving the name first keeps it unique; the rename then replaces the placeholder.
    let target = tempfile::Builder::new()
        .prefix(INPUT_PREFIX)
        .suffix(suffix)
        .tempfile_in(scratch_dir)
        .map_err(|source| StageError::Create {
            dir: scratch_dir.to_path_buf(),
            source,
        })?
        .into_temp_path();

    if let Err(e) = upload.persist(&target) {
        debug!("Rename into scratch failed ({}), copying instead", e.error);
        let mut source = std::fs::File::open(e.file.path()).map_err(StageError::Write)?;
        let mut dest = std::fs::File::create(&target).map_err(StageError::Write)?;
        io::copy(&mut source, &mut dest).map_err(StageError::Write)?;
        dest.sync_all().map_err(StageError::Write)?;
    }
    Ok(target)
}

/// Keep a short alphanumeric extension from an untrusted file name.
fn sanitized_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

async fn remove_matching(dir: &Path, matches: impl Fn(&str) -> bool) -> io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_str().is_some_and(&matches) || !entry.file_type().await?.is_file() {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove leftover {}: {}", entry.path().display(), e),
        }
    }
    Ok(removed)
}
