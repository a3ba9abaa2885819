//! tar + zstd archives of cached paths
//!
//! Path number `i` of the saved list is stored under the top-level archive
//! name `i`, so restoring only needs the same path list in the same order.

use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

const ZSTD_LEVEL: i32 = 3;

/// Write `paths` into a compressed tar archive at `dst_file`
pub fn write_archive(paths: &[PathBuf], dst_file: &Path) -> Result<()> {
    let file = fs::File::create(dst_file).map_err(|e| Error::io(e, dst_file, "create"))?;
    let enc = zstd::Encoder::new(file, ZSTD_LEVEL)
        .map_err(|e| Error::configuration(format!("zstd encoder error: {e}")))?;
    let mut builder = tar::Builder::new(enc);
    builder.follow_symlinks(false);

    for (index, path) in paths.iter().enumerate() {
        let name = index.to_string();
        let appended = if path.is_dir() {
            builder.append_dir_all(&name, path)
        } else {
            builder.append_path_with_name(path, &name)
        };
        appended.map_err(|e| Error::io(e, path, "archive"))?;
        tracing::debug!(path = %path.display(), entry = %name, "Added path to archive");
    }

    let enc = builder
        .into_inner()
        .map_err(|e| Error::configuration(format!("tar finalize failed: {e}")))?;
    enc.finish()
        .map_err(|e| Error::configuration(format!("zstd finish failed: {e}")))?;
    Ok(())
}

/// Extract an archive written by [`write_archive`] back onto `paths`
///
/// Returns the number of regular files written.
pub fn extract_archive(src_file: &Path, paths: &[PathBuf]) -> Result<usize> {
    let file = fs::File::open(src_file).map_err(|e| Error::io(e, src_file, "open"))?;
    let dec = zstd::Decoder::new(file)
        .map_err(|e| Error::configuration(format!("zstd decoder error: {e}")))?;
    let mut archive = tar::Archive::new(dec);

    let entries = archive
        .entries()
        .map_err(|e| Error::io(e, src_file, "read archive"))?;

    let mut files = 0usize;
    let mut links: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::io(e, src_file, "read archive entry"))?;
        let member = entry
            .path()
            .map_err(|e| Error::io(e, src_file, "read archive entry path"))?
            .into_owned();
        let entry_type = entry.header().entry_type();
        if entry_type.is_hard_link() {
            return Err(Error::validation(format!(
                "unexpected hard link in archive: {}",
                member.display()
            )));
        }
        let (base, dest) = destination_for(&member, paths)?;
        if let Some(link) = linked_ancestor(&dest, base, &links) {
            return Err(Error::validation(format!(
                "archive member {} is below the symlink {}",
                member.display(),
                link.display()
            )));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;
        }
        entry
            .unpack(&dest)
            .map_err(|e| Error::io(e, &dest, "unpack"))?;
        if entry_type.is_symlink() {
            links.push(dest);
        } else if entry_type.is_file() {
            files += 1;
        }
    }
    Ok(files)
}

/// A symlink unpacked earlier that `dest` would be written through
fn linked_ancestor<'a>(dest: &Path, base: &Path, links: &'a [PathBuf]) -> Option<&'a Path> {
    dest.ancestors()
        .skip(1)
        .take_while(|ancestor| ancestor.starts_with(base))
        .find_map(|ancestor| links.iter().find(|link| link.as_path() == ancestor))
        .map(PathBuf::as_path)
}

/// Map an archive member name onto the restore path it belongs to
///
/// Returns that path together with the member's destination.
fn destination_for<'a>(member: &Path, paths: &'a [PathBuf]) -> Result<(&'a Path, PathBuf)> {
    let mut components = member.components();
    let index = match components.next() {
        Some(Component::Normal(first)) => first
            .to_str()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| {
                Error::validation(format!("unexpected archive member: {}", member.display()))
            })?,
        _ => {
            return Err(Error::validation(format!(
                "unexpected archive member: {}",
                member.display()
            )));
        }
    };
    let base = paths.get(index).ok_or_else(|| {
        Error::validation(format!(
            "archive member {} has no matching path (only {} given)",
            member.display(),
            paths.len()
        ))
    })?;

    let mut dest = base.clone();
    for component in components {
        match component {
            Component::Normal(part) => dest.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::validation(format!(
                    "archive member escapes its root: {}",
                    member.display()
                )));
            }
        }
    }
    Ok((base.as_path(), dest))
}

/// Hex sha256 of a file's contents
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|e| Error::io(e, path, "open"))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::io(e, path, "read"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
