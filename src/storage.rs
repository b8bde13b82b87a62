use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use uuid::Uuid;

use crate::models::StoredFile;
use crate::utils::{is_temp_name, split_extension, TEMP_PREFIX};

/// temp files currently being written, keyed by path
pub type InFlight = Arc<DashMap<PathBuf, Instant>>;

/// where uploaded bytes go.
///
/// a part is opened before its name is known to be usable, written chunk by
/// chunk, then finalized under a collision-free name.
pub trait UploadSink: Send + Sync {
    type Part: Write + Send;

    fn create_part(&self) -> io::Result<Self::Part>;

    fn finalize(&self, part: Self::Part, basename: &str) -> io::Result<StoredFile>;

    /// final permissions, applied once post-upload hooks are done with the file
    fn seal(&self, file: &StoredFile) -> io::Result<()>;
}

/// stores parts as files inside one destination directory
#[derive(Clone)]
pub struct DirectorySink {
    directory: PathBuf,
    file_mode: Option<u32>,
    in_flight: InFlight,
}

impl DirectorySink {
    pub fn new(directory: PathBuf, file_mode: Option<u32>, in_flight: InFlight) -> Self {
        Self {
            directory,
            file_mode,
            in_flight,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// an open temp file; removed on drop unless it was promoted
pub struct TempPart {
    file: Option<File>,
    path: PathBuf,
    written: u64,
    in_flight: InFlight,
}

impl TempPart {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for TempPart {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("temp part already closed"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for TempPart {
    fn drop(&mut self) {
        self.in_flight.remove(&self.path);
        if self.file.take().is_some() {
            match fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!("Discarded temp file {:?}", self.path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to discard temp file {:?}: {}", self.path, e),
            }
        }
    }
}

impl UploadSink for DirectorySink {
    type Part = TempPart;

    fn create_part(&self) -> io::Result<TempPart> {
        loop {
            let path = self
                .directory
                .join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4().simple()));
            // registered before it exists
            self.in_flight.insert(path.clone(), Instant::now());
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    tracing::trace!("Opened temp file {:?}", path);
                    return Ok(TempPart {
                        file: Some(file),
                        path,
                        written: 0,
                        in_flight: self.in_flight.clone(),
                    });
                }
                Err(e) => {
                    self.in_flight.remove(&path);
                    if e.kind() != io::ErrorKind::AlreadyExists {
                        return Err(e);
                    }
                }
            }
        }
    }

    fn finalize(&self, mut part: TempPart, basename: &str) -> io::Result<StoredFile> {
        if let Some(file) = part.file.as_mut() {
            file.flush()?;
            file.sync_all()?;
        }
        // closed before the rename; from here on cleanup is manual
        drop(part.file.take());
        let final_path = match promote(&part.path, &self.directory, basename) {
            Ok(path) => path,
            Err(e) => {
                let _ = fs::remove_file(&part.path);
                return Err(e);
            }
        };

        let name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| basename.to_string());
        Ok(StoredFile {
            name,
            path: final_path,
            size: part.written,
        })
    }

    fn seal(&self, file: &StoredFile) -> io::Result<()> {
        match self.file_mode {
            Some(mode) => apply_mode(&file.path, mode),
            None => Ok(()),
        }
    }
}

/// candidate final names: `name`, then `stem-1.ext`, `stem-2.ext`, ...
pub fn candidate_name(basename: &str, attempt: u64) -> String {
    if attempt == 0 {
        return basename.to_string();
    }
    let (stem, ext) = split_extension(basename);
    format!("{stem}-{attempt}{ext}")
}

/// move `temp` into `directory` under the first free candidate name.
///
/// each candidate is reserved with an exclusive create before the rename, so
/// two writers can never land on the same final path.
pub fn promote(temp: &Path, directory: &Path, basename: &str) -> io::Result<PathBuf> {
    for attempt in 0u64.. {
        let candidate = directory.join(candidate_name(basename, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(reservation) => {
                drop(reservation);
                if let Err(e) = fs::rename(temp, &candidate) {
                    let _ = fs::remove_file(&candidate);
                    return Err(e);
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::trace!("Name taken: {:?}", candidate);
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {basename}"),
    ))
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    tracing::warn!("File mode {:o} ignored for {:?} on this platform", mode, path);
    Ok(())
}

/// remove abandoned temp files older than `max_age`.
///
/// anything still registered in `in_flight` is left alone regardless of age.
pub fn sweep_temp_files(directory: &Path, max_age: Duration, in_flight: &InFlight) -> io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_temp_name(name) {
            continue;
        }
        let path = entry.path();
        if in_flight.contains_key(&path) {
            tracing::trace!("Skipping in-flight temp file {:?}", path);
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("Failed to stat {:?}: {}", path, e);
                continue;
            }
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                tracing::info!("🧹 Removed stale temp file {:?} ({}s old)", path, age.as_secs());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove stale temp file {:?}: {}", path, e),
        }
    }

    Ok(removed)
}

/// run the sweep now, then every `interval` on a background thread
pub fn spawn_sweeper(
    directory: PathBuf,
    max_age: Duration,
    interval: Duration,
    in_flight: InFlight,
) -> io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("droopy-sweep".to_string())
        .spawn(move || loop {
            match sweep_temp_files(&directory, max_age, &in_flight) {
                Ok(0) => tracing::debug!("No stale temp files in {:?}", directory),
                Ok(n) => tracing::info!("Sweep removed {} stale temp file(s)", n),
                Err(e) => tracing::error!("Temp sweep of {:?} failed: {}", directory, e),
            }
            std::thread::sleep(interval);
        })
}

/// published names: regular, non-temp files sorted case-insensitively
pub async fn published_files(directory: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if is_temp_name(&name) {
            continue;
        }
        // follows symlinks, like a plain isfile check
        match tokio::fs::metadata(entry.path()).await {
            Ok(m) if m.is_file() => names.push(name),
            _ => {}
        }
    }
    names.sort_by_key(|n| n.to_lowercase());
    Ok(names)
}
