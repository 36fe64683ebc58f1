use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::safety::absolute_path;
use crate::types::ImageFormat;

/// Images found directly inside one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Absolute paths of eligible images, in the order the filesystem
    /// reported them
    pub images: Vec<PathBuf>,

    /// Set when the directory itself could not be enumerated. `images` is
    /// empty in that case.
    pub diagnostic: Option<String>,
}

impl Expansion {
    fn failed(diagnostic: String) -> Self {
        Self {
            images: Vec::new(),
            diagnostic: Some(diagnostic),
        }
    }
}

/// List convertible images directly inside `directory` (no recursion).
///
/// Never fails: an unreadable directory yields an empty expansion with a
/// diagnostic, and unreadable entries are skipped.
pub fn list_images<P: AsRef<Path>>(directory: P) -> Expansion {
    let directory = absolute_path(directory.as_ref());

    if !directory.is_dir() {
        let message = format!("not a readable directory: {}", directory.display());
        warn!("{}", message);
        return Expansion::failed(message);
    }

    let mut images = Vec::new();

    for entry in WalkDir::new(&directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let message = format!("cannot read directory {}: {}", directory.display(), e);
                warn!("{}", message);
                return Expansion::failed(message);
            }
            Err(e) => {
                // Log error but continue with other entries
                warn!("Skipping unreadable entry in {}: {}", directory.display(), e);
                continue;
            }
        };

        if entry.file_type().is_file() && is_image_path(entry.path()) {
            images.push(entry.into_path());
        }
    }

    debug!("Found {} images in {}", images.len(), directory.display());

    Expansion {
        images,
        diagnostic: None,
    }
}

/// Returns if the given path has a convertible image extension
pub fn is_image_path(path: &Path) -> bool {
    ImageFormat::from_path(path)
        .map(|format| format.is_supported_input())
        .unwrap_or(false)
}

// -- Tests --
