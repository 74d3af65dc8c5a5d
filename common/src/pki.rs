// Copyright (C) 2024 Nicola Dardanis <nicdard@gmail.com>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    fs::{DirBuilder, File, OpenOptions},
    io::Write,
    path::Path,
};

use crate::error::{Error, Result};

/// Permissions of the directory holding the generated credentials (`rwx------`).
pub const OUTPUT_DIR_MODE: u32 = 0o700;
/// Permissions of every generated file (`rw-------`).
pub const OUTPUT_FILE_MODE: u32 = 0o600;

/// Create the output directory, readable only by the owner.
/// Fails if the directory already exists, so that the key material of a previous run is never overwritten.
pub fn create_output_dir(path: &Path) -> Result<()> {
    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(OUTPUT_DIR_MODE);
    }
    builder
        .create(path)
        .map_err(|e| Error::filesystem(path, e))?;
    log::debug!("Created the output directory `{}`.", path.display());
    Ok(())
}

/// Write `contents` to a new file at `path`, readable and writable only by the owner.
/// No partial-write recovery is attempted: on failure the file may be left truncated.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = create_new_file(path).map_err(|e| Error::filesystem(path, e))?;
    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|e| Error::filesystem(path, e))?;
    log::debug!("Wrote `{}` bytes to `{}`.", contents.len(), path.display());
    Ok(())
}

fn create_new_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(OUTPUT_FILE_MODE);
    }
    options.open(path)
}
