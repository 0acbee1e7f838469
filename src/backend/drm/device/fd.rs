use drm::{control::Device as ControlDevice, Device as BasicDevice};
use std::{
    fs::{File, OpenOptions},
    os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd},
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{error, info, warn};

use crate::backend::drm::error::Error;

#[derive(Debug)]
struct InternalDrmDeviceFd {
    file: File,
    path: PathBuf,
    privileged: bool,
}

impl Drop for InternalDrmDeviceFd {
    fn drop(&mut self) {
        info!("Dropping device: {:?}", self.path);
        if self.privileged {
            if let Err(err) = self.release_master_lock() {
                error!("Failed to drop drm master state. Error: {}", err);
            }
        }
    }
}

impl AsFd for InternalDrmDeviceFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}
impl BasicDevice for InternalDrmDeviceFd {}
impl ControlDevice for InternalDrmDeviceFd {}

/// Ref-counted file descriptor of an open drm device
///
/// Kernel objects created through the device keep a clone around, so they
/// can release themselves no matter who drops them last.
#[derive(Debug, Clone)]
pub struct DrmDeviceFd(Arc<InternalDrmDeviceFd>);

impl AsFd for DrmDeviceFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.file.as_fd()
    }
}

impl AsRawFd for DrmDeviceFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.file.as_raw_fd()
    }
}

impl DrmDeviceFd {
    /// Open the drm node at `path`.
    ///
    /// This function will try to acquire the master lock for the underlying drm device
    /// and release the lock on drop again.
    /// For that reason you should never open the same node twice for presenting,
    /// but instead clone the `DrmDeviceFd`.
    pub fn open(path: impl AsRef<Path>) -> Result<DrmDeviceFd, Error> {
        let path = path.as_ref();
        // std opens files with O_CLOEXEC
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| Error::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let mut dev = InternalDrmDeviceFd {
            file,
            path: path.to_path_buf(),
            privileged: false,
        };

        // Newer kernels grant master to the first opener anyway,
        // and we can still do everything we need if the node was already lit up.
        if dev.acquire_master_lock().is_err() {
            warn!("Unable to become drm master, assuming unprivileged mode");
        } else {
            dev.privileged = true;
        }

        Ok(DrmDeviceFd(Arc::new(dev)))
    }

    /// Path the device was opened from
    pub fn path(&self) -> &Path {
        &self.0.path
    }

    /// Returns true if this process holds the master lock of the device
    pub fn is_privileged(&self) -> bool {
        self.0.privileged
    }
}

impl BasicDevice for DrmDeviceFd {}
impl ControlDevice for DrmDeviceFd {}
