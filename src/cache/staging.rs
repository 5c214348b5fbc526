//! Staging of local sources into the cache's slot tree
//!
//! Content is copied into a scratch directory next to the slot and renamed
//! into place once complete. A slot that already exists is never written
//! again: slots are keyed by content, so an existing slot already holds what
//! would be copied. Builds staging the same slot at once race only on the
//! final rename, and the loser discards its copy. File modification times
//! are copied from the source.

use crate::error::{CacheError, CacheResult};
use std::fs::{self, File};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Stage `source` (file or directory) at `dest`, the base name inside a slot
///
/// Returns `false` when the slot was already staged.
pub fn stage_local(source: &Path, dest: &Path) -> CacheResult<bool> {
    if dest.exists() {
        debug!("{} is already staged", dest.display());
        return Ok(false);
    }

    let slot = dest
        .parent()
        .ok_or_else(|| CacheError::Internal(format!("{} has no slot", dest.display())))?;
    let base = dest
        .file_name()
        .ok_or_else(|| CacheError::Internal(format!("{} has no base name", dest.display())))?;
    let slots = slot
        .parent()
        .ok_or_else(|| CacheError::Internal(format!("{} has no parent", slot.display())))?;
    fs::create_dir_all(slots)
        .map_err(|e| CacheError::io(format!("creating directory {}", slots.display()), e))?;

    let scratch = tempfile::Builder::new()
        .prefix(".stage")
        .tempdir_in(slots)
        .map_err(|e| CacheError::io(format!("creating scratch dir in {}", slots.display()), e))?;
    let staged = scratch.path().join(base);

    let meta = fs::metadata(source)
        .map_err(|e| CacheError::io(format!("reading metadata of {}", source.display()), e))?;
    if meta.is_dir() {
        copy_tree(source, &staged)?;
    } else {
        copy_file(source, &staged)?;
    }

    // Dropping `scratch` after a successful rename finds nothing to remove
    let installed = fs::rename(scratch.path(), slot).or_else(|e| {
        if dest.exists() || !slot.exists() {
            return Err(e);
        }
        // a slot without its base entry was damaged from outside
        debug!("Replacing incomplete slot {}", slot.display());
        fs::remove_dir_all(slot)?;
        fs::rename(scratch.path(), slot)
    });
    match installed {
        Ok(()) => {
            debug!("Staged {} at {}", source.display(), dest.display());
            Ok(true)
        }
        Err(_) if dest.exists() => {
            debug!("{} was staged concurrently", dest.display());
            Ok(false)
        }
        Err(e) => Err(CacheError::io(
            format!("moving staged content into {}", slot.display()),
            e,
        )),
    }
}

fn copy_tree(source: &Path, dest: &Path) -> CacheResult<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| {
            CacheError::Internal(format!("walking {}: {}", source.display(), e))
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| CacheError::Internal(e.to_string()))?;
        let target = dest.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| CacheError::io(format!("creating {}", target.display()), e))?;
        } else if file_type.is_file() {
            copy_file(entry.path(), &target)?;
        } else {
            debug!("Skipping non-regular file {}", entry.path().display());
        }
    }
    Ok(())
}

fn copy_file(source: &Path, dest: &Path) -> CacheResult<()> {
    fs::copy(source, dest).map_err(|e| {
        CacheError::io(
            format!("copying {} to {}", source.display(), dest.display()),
            e,
        )
    })?;

    let modified = fs::metadata(source)
        .and_then(|m| m.modified())
        .map_err(|e| CacheError::io(format!("reading mtime of {}", source.display()), e))?;
    File::options()
        .write(true)
        .open(dest)
        .and_then(|f| f.set_modified(modified))
        .map_err(|e| CacheError::io(format!("setting mtime of {}", dest.display()), e))?;
    Ok(())
}
