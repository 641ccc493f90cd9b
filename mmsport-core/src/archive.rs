//! Packager/Shipper: gzip tarballs of the dump tree and their transfer to
//! the support dropbox.
//!
//! The archive is named after the tracking identifier, exists only between
//! packaging and transfer, and is deleted once the transfer succeeds.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::info;

use crate::context::RunContext;
use crate::error::{MmsPortError, Result};
use crate::exec::CommandSpec;
use crate::layout::{DROPBOX_HOST, DROPBOX_PORT, DUMP_DIR, FTP_PREFIX};

/// Archives the `dump/` tree under `directory` into `<name>.gzip` beside it.
///
/// Entries are stored under the `dump/` prefix so an unpack reproduces the
/// tree exactly, version tag and sidecars included.
pub fn package(directory: &Path, name: &str) -> Result<PathBuf> {
    let target = directory.join(format!("{}.gzip", name));
    let dump_dir = directory.join(DUMP_DIR);
    info!("packaging {} into {}", dump_dir.display(), target.display());

    let file = File::create(&target)
        .map_err(|e| MmsPortError::io(format!("failed to create {}", target.display()), e))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(DUMP_DIR, &dump_dir)
        .map_err(|e| {
            MmsPortError::io(format!("failed to archive {}", dump_dir.display()), e)
        })?;
    let encoder = builder
        .into_inner()
        .map_err(|e| MmsPortError::io("failed to finalize archive".to_string(), e))?;
    encoder
        .finish()
        .map_err(|e| MmsPortError::io("failed to finalize gzip stream".to_string(), e))?;

    Ok(target)
}

/// Extracts a shipped archive into `target_dir`.
pub fn unpack(archive: &Path, target_dir: &Path) -> Result<()> {
    info!("exploding {} into {}", archive.display(), target_dir.display());
    let file = File::open(archive)
        .map_err(|e| MmsPortError::io(format!("failed to open {}", archive.display()), e))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(decoder);
    tar.unpack(target_dir).map_err(|e| {
        MmsPortError::io(format!("failed to extract {}", archive.display()), e)
    })
}

/// Transfers the archive to the support dropbox and deletes it on success.
///
/// The per-case account is the fixed prefix plus the tracking identifier;
/// identifier and paths are passed to `scp` as discrete arguments.
pub fn ship(archive: &Path, caseid: &str, ctx: &RunContext) -> Result<()> {
    info!("preparing to upload to the support dropbox");
    info!("*** you will be prompted for a password, just press <enter> ***");

    let destination = format!("{}{}@{}:.", FTP_PREFIX, caseid, DROPBOX_HOST);
    CommandSpec::new("scp")
        .arg("-o")
        .arg("StrictHostKeyChecking=no")
        .arg("-P")
        .arg(DROPBOX_PORT.to_string())
        .arg(archive.display().to_string())
        .arg(destination)
        .run_checked(ctx)?;

    if !ctx.dry_run {
        fs::remove_file(archive).map_err(|e| {
            MmsPortError::io(format!("failed to remove {}", archive.display()), e)
        })?;
    }
    info!("upload done");
    Ok(())
}
