//! Transactional replacement of the TRex installation directory.
//!
//! An update fetches a `.tar.gz` package into the staging directory, unpacks
//! it, checks that it contains exactly one top-level directory and swaps that
//! directory in place of the installation with two renames. The previous tree
//! is kept as a backup until the swap succeeds and is renamed back if it
//! does not.

use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::paths;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::io::{Read, Write};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tar::Archive;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_PACKAGE_URL: &str = "http://trex-tgn.cisco.com/trex/release/latest";

const PACKAGE_FILE: &str = "trex_package.tar.gz";
const HTTP_FETCH_TIMEOUT: Duration = Duration::from_secs(600);
const LOCAL_FETCH_TIMEOUT: Duration = Duration::from_secs(300);
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(120);

/// Directory moves performed by the BACKUP, SWAP, CLEANUP and ROLLBACK steps.
pub trait FsOps: Send + Sync {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// `std::fs` passthrough.
pub struct StdFs;

impl FsOps for StdFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
}

/// Where a package comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    Url(String),
    Path(PathBuf),
}

impl PackageSource {
    /// Anything starting with `http` is fetched over HTTP; the rest is a
    /// local path resolved against `base`.
    pub fn parse(source: &str, base: &Path) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::Url(source.to_string())
        } else {
            Self::Path(paths::normalize(base, Path::new(source)))
        }
    }
}

/// Runs update transactions against one installation directory.
#[derive(Clone)]
pub struct Updater {
    target_dir: PathBuf,
    tmp_dir: PathBuf,
    base_dir: PathBuf,
    allowed_roots: Vec<PathBuf>,
    allow_update: bool,
    fs: Arc<dyn FsOps>,
    /// Held for a whole transaction; every update shares the staging dir.
    staging: Arc<Mutex<()>>,
}

impl Updater {
    pub fn new(target_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            tmp_dir: tmp_dir.into(),
            base_dir: PathBuf::from("/"),
            allowed_roots: Vec::new(),
            allow_update: false,
            fs: Arc::new(StdFs),
            staging: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(&config.trex_dir, &config.tmp_dir)
            .base_dir(&config.launch_dir)
            .allowed_roots(config.allowed_roots())
            .allow_update(config.allow_update)
    }

    pub fn allow_update(mut self, allow: bool) -> Self {
        self.allow_update = allow;
        self
    }

    pub fn allowed_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.allowed_roots = roots;
        self
    }

    /// Directory relative package paths resolve against.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn FsOps>) -> Self {
        self.fs = fs;
        self
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Check the guards, then run one transaction to completion. Concurrent
    /// calls queue up and run one after another.
    pub async fn update(&self, source: &str) -> Result<()> {
        if !self.allow_update {
            return Err(SupervisorError::UpdateDisabled);
        }
        paths::ensure_under_roots(&self.target_dir, &self.allowed_roots)?;

        let _staging = self.staging.lock().await;
        let transaction = UpdateTransaction {
            source: PackageSource::parse(source, &self.base_dir),
            backup_dir: backup_dir_for(&self.target_dir),
            tmp_dir: self.tmp_dir.clone(),
            target_dir: self.target_dir.clone(),
        };
        info!(
            "Updating {} from {:?}",
            transaction.target_dir.display(),
            transaction.source
        );
        transaction.run(self.fs.as_ref()).await
    }
}

/// One update attempt. Discarded once it reaches success or rollback.
#[derive(Debug)]
pub struct UpdateTransaction {
    pub source: PackageSource,
    pub tmp_dir: PathBuf,
    pub target_dir: PathBuf,
    pub backup_dir: PathBuf,
}

impl UpdateTransaction {
    pub async fn run(self, fs_ops: &dyn FsOps) -> Result<()> {
        fs::create_dir_all(&self.tmp_dir)?;
        let archive = self.tmp_dir.join(PACKAGE_FILE);

        // FETCH
        match &self.source {
            PackageSource::Url(url) => download(url, &archive).await?,
            PackageSource::Path(path) => copy_local(path, &archive).await?,
        }
        debug!("Fetched package to {}", archive.display());

        // CLEAN-STAGING
        for dir in staged_dirs(&self.tmp_dir)? {
            debug!("Removing stale staging dir {}", dir.display());
            fs_ops.remove_dir_all(&dir)?;
        }

        // EXTRACT
        extract(&archive, &self.tmp_dir).await?;

        // VALIDATE
        let mut unpacked = staged_dirs(&self.tmp_dir)?;
        if unpacked.len() != 1 {
            return Err(SupervisorError::Layout { found: unpacked });
        }
        let new_tree = unpacked.remove(0);

        // PREPARE TARGET
        prepare_target(&self.target_dir)?;

        // BACKUP
        fs_ops.rename(&self.target_dir, &self.backup_dir)?;

        // SWAP
        if let Err(e) = fs_ops.rename(&new_tree, &self.target_dir) {
            warn!("Swap failed ({}), restoring {}", e, self.target_dir.display());
            return Err(self.rollback(fs_ops, e.into()));
        }

        // CLEANUP
        if let Err(e) = fs_ops.remove_dir_all(&self.backup_dir) {
            warn!(
                "Update applied but backup {} could not be removed: {}",
                self.backup_dir.display(),
                e
            );
        }

        info!("Installation {} updated", self.target_dir.display());
        Ok(())
    }

    /// Put the backup back in place; returns the error to report.
    fn rollback(&self, fs_ops: &dyn FsOps, original: SupervisorError) -> SupervisorError {
        let restore = || -> io::Result<()> {
            if let Ok(meta) = fs::symlink_metadata(&self.target_dir) {
                if meta.is_dir() {
                    fs_ops.remove_dir_all(&self.target_dir)?;
                } else {
                    fs::remove_file(&self.target_dir)?;
                }
            }
            fs_ops.rename(&self.backup_dir, &self.target_dir)
        };

        match restore() {
            Ok(()) => original,
            Err(rollback) => SupervisorError::RollbackFailed {
                original: Box::new(original),
                rollback,
            },
        }
    }
}

/// `<target>_BU<unix seconds>`, suffixed with a counter if that name is taken.
fn backup_dir_for(target: &Path) -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let base = format!("{}_BU{}", target.display(), secs);

    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while fs::symlink_metadata(&candidate).is_ok() {
        candidate = PathBuf::from(format!("{}_{}", base, n));
        n += 1;
    }
    candidate
}

/// Real (non-symlink) directories directly under `dir`.
fn staged_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn prepare_target(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.file_type().is_symlink() || meta.is_file() => {
            debug!("Unlinking {}", target.display());
            fs::remove_file(target)?;
        }
        Ok(_) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    fs::create_dir_all(target)?;
    set_world_writable(target)?;
    Ok(())
}

pub(crate) fn set_world_writable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o777))?;
    }
    Ok(())
}

async fn download(url: &str, dest: &Path) -> Result<()> {
    let client = reqwest::Client::builder()
        .user_agent("trex-master")
        .timeout(HTTP_FETCH_TIMEOUT)
        .build()
        .map_err(|e| SupervisorError::Fetch(format!("Failed to create HTTP client: {}", e)))?;

    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SupervisorError::Fetch(format!("{}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(SupervisorError::Fetch(format!(
            "{} returned status: {}",
            url,
            response.status()
        )));
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| SupervisorError::Fetch(format!("{}: {}", dest.display(), e)))?;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| SupervisorError::Fetch(format!("{}: {}", url, e)))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| SupervisorError::Fetch(format!("{}: {}", dest.display(), e)))?;
    }
    file.flush()
        .await
        .map_err(|e| SupervisorError::Fetch(format!("{}: {}", dest.display(), e)))?;
    Ok(())
}

/// Copy following symlinks and keep the source modification time.
async fn copy_local(source: &Path, dest: &Path) -> Result<()> {
    let (source, dest) = (source.to_path_buf(), dest.to_path_buf());
    let display = source.display().to_string();
    let deadline = Instant::now() + LOCAL_FETCH_TIMEOUT;

    let copy = tokio::task::spawn_blocking(move || copy_until(&source, &dest, deadline));
    match copy.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SupervisorError::Fetch(format!("{}: {}", display, e))),
        Err(e) => Err(SupervisorError::Fetch(format!("{}: {}", display, e))),
    }
}

fn copy_until(source: &Path, dest: &Path, deadline: Instant) -> io::Result<()> {
    let mut input = File::open(source)?;
    let modified = input.metadata()?.modified()?;
    let mut output = File::create(dest)?;

    let mut buf = vec![0u8; 256 * 1024];
    loop {
        check_deadline(deadline, "copy")?;
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n])?;
    }
    output.flush()?;
    output.set_modified(modified)
}

async fn extract(archive: &Path, into: &Path) -> Result<()> {
    extract_within(archive, into, EXTRACT_TIMEOUT).await
}

/// Unpack entry by entry, giving up between entries once `limit` elapses.
/// Returns only after the blocking work has stopped.
async fn extract_within(archive: &Path, into: &Path, limit: Duration) -> Result<()> {
    let (archive, into) = (archive.to_path_buf(), into.to_path_buf());
    let deadline = Instant::now() + limit;

    let unpack = tokio::task::spawn_blocking(move || -> io::Result<()> {
        let mut archive = Archive::new(GzDecoder::new(File::open(&archive)?));
        archive.set_preserve_permissions(true);
        for entry in archive.entries()? {
            check_deadline(deadline, "unpack")?;
            entry?.unpack_in(&into)?;
        }
        Ok(())
    });

    match unpack.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SupervisorError::Extract(e.to_string())),
        Err(e) => Err(SupervisorError::Extract(e.to_string())),
    }
}

fn check_deadline(deadline: Instant, what: &str) -> io::Result<()> {
    if Instant::now() >= deadline {
        return Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{} timed out", what),
        ));
    }
    Ok(())
}
