/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Throwaway GnuPG home directories.
//!
//! Each backend operation runs against its own keyring in a private temporary
//! directory. The directory, and every key imported into it, is removed when
//! the [`EphemeralKeyring`] is dropped, whether the operation succeeded or not.

use super::backend::{BackendError, ImportResult};
use super::status::StatusLog;
use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Output of one gpg invocation.
#[derive(Debug)]
pub struct GpgOutput {
    pub stdout: Vec<u8>,
    pub status: StatusLog,
    pub success: bool,
}

/// A private GnuPG home directory that lives for one operation.
pub struct EphemeralKeyring {
    dir: TempDir,
    gpg_path: PathBuf,
    timeout: Duration,
}

impl EphemeralKeyring {
    /// Creates a keyring directory (mode 0700) under `root`, or the system
    /// temporary directory when `root` is `None`.
    pub fn create(
        gpg_path: &Path,
        root: Option<&Path>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("signum-gpg-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))?;
        }

        debug!("Created ephemeral keyring at {}", dir.path().display());
        Ok(Self {
            dir,
            gpg_path: gpg_path.to_path_buf(),
            timeout,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `content` to a file inside the keyring directory.
    pub fn write_file(&self, name: &str, content: &[u8]) -> Result<PathBuf, BackendError> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Writes a file readable only by the owner; used for passphrases.
    pub fn write_secret_file(&self, name: &str, content: &[u8]) -> Result<PathBuf, BackendError> {
        let path = self.dir.path().join(name);
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        file.write_all(content)?;
        Ok(path)
    }

    /// Runs gpg against this keyring.
    ///
    /// A non-zero exit status is not an error here: gpg exits non-zero for
    /// many definite answers (a bad signature, an unknown key), and callers
    /// decide from the status lines. Only failing to run, or running past the
    /// timeout, is an error.
    pub fn run<I, S>(&self, args: I) -> Result<GpgOutput, BackendError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.gpg_path);
        command
            .arg("--homedir")
            .arg(self.dir.path())
            .args([
                "--batch",
                "--no-tty",
                "--yes",
                "--status-fd",
                "2",
                "--pinentry-mode",
                "loopback",
            ])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running {:?}", command);
        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackendError::Process(format!(
                    "gpg executable not found at {}",
                    self.gpg_path.display()
                ))
            } else {
                BackendError::Io(e)
            }
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let exit = self.wait(&mut child)?;

        let stdout = join_output(stdout)?;
        let stderr = join_output(stderr)?;
        Ok(GpgOutput {
            stdout,
            status: StatusLog::parse(&String::from_utf8_lossy(&stderr)),
            success: exit.success(),
        })
    }

    fn wait(&self, child: &mut Child) -> Result<std::process::ExitStatus, BackendError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!("gpg did not finish within {:?}, killing it", self.timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Err(BackendError::Timeout(self.timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Imports ASCII-armored or binary key material.
    pub fn import(&self, key_data: &[u8]) -> Result<ImportResult, BackendError> {
        let path = self.write_file("import.key", key_data)?;
        let output = self.run([OsStr::new("--import"), path.as_os_str()])?;
        Ok(output.status.import_result())
    }

    /// Imports every key in `keys` with one gpg call.
    pub fn import_all(&self, keys: &[String]) -> Result<ImportResult, BackendError> {
        if keys.is_empty() {
            return Ok(ImportResult::default());
        }
        self.import(keys.join("\n").as_bytes())
    }

    fn gpgconf_path(&self) -> PathBuf {
        match self.gpg_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join("gpgconf"),
            _ => PathBuf::from("gpgconf"),
        }
    }
}

impl Drop for EphemeralKeyring {
    fn drop(&mut self) {
        // Stop the agent gpg may have started for this home directory so the
        // directory can actually be removed.
        let result = Command::new(self.gpgconf_path())
            .arg("--homedir")
            .arg(self.dir.path())
            .args(["--kill", "all"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = result {
            debug!("gpgconf --kill failed for {}: {}", self.dir.path().display(), e);
        }
    }
}

type Drain = std::thread::JoinHandle<std::io::Result<Vec<u8>>>;

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Option<Drain> {
    source.map(|mut reader| {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer)?;
            Ok(buffer)
        })
    })
}

fn join_output(handle: Option<Drain>) -> Result<Vec<u8>, BackendError> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| BackendError::Process("output reader panicked".to_string()))?
            .map_err(BackendError::Io),
        None => Ok(Vec::new()),
    }
}
