// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The narrow four-operation filesystem interface.
//!
//! Everything the store persists goes through these full-pathname
//! operations; directory handling lives with the collection lifecycle, not
//! here. `create` refuses to clobber and `update` refuses to invent, so the
//! document/metadata pair invariants reduce to io-error mapping at the
//! call sites.

use std::io;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Write a new file; fails with `AlreadyExists` if the path is taken.
pub(crate) async fn create(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}

/// Read a file; fails with `NotFound` if it does not exist.
pub(crate) async fn read(path: &Path) -> io::Result<Vec<u8>> {
    fs::read(path).await
}

/// Overwrite an existing file; fails with `NotFound` if it does not.
pub(crate) async fn update(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}

/// Remove a file; fails with `NotFound` if it does not exist.
pub(crate) async fn delete(path: &Path) -> io::Result<()> {
    fs::remove_file(path).await
}
