//! Folder selection with sub-folder preservation.
//!
//! Files directly in the chosen folder keep their names. Files one level
//! down are renamed `<uuid>-dsp-<sub>-fsp-<name>` so the server can
//! create one album per sub-folder and the client can later map each file
//! back to it. Deeper levels are not part of a selection.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use darkroom_protocol::FolderAlbums;
use darkroom_protocol::constants::EventType;
use darkroom_protocol::messages::FolderInformation;

use crate::channel::push_typed;
use crate::error::UploadError;
use crate::session::UploadSession;
use crate::types::SelectedFile;

/// Separator between the uuid and the sub-folder name.
pub const DIR_SEP: &str = "-dsp-";
/// Separator between the sub-folder id and the file name.
pub const FILE_SEP: &str = "-fsp-";

/// Content types a folder upload accepts.
pub const ALLOWED_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// One file found by [`scan_folder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Upload name; encodes the sub-folder id for nested files.
    pub name: String,
    /// `<uuid>-dsp-<sub>` for files in a sub-folder.
    pub sub_folder: Option<String>,
}

/// Result of scanning a folder, kept until the server confirms it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderSelection {
    pub folder: String,
    pub sub_folders: Vec<String>,
    pub files: Vec<ScannedFile>,
}

impl FolderSelection {
    /// What the page is told about the scan.
    pub fn information(&self) -> FolderInformation {
        FolderInformation {
            folder: self.folder.clone(),
            sub_folders: self.sub_folders.clone(),
        }
    }

    /// Applies the sub-folder and type filters and reads the survivors.
    pub async fn into_upload(self, include_subfolders: bool) -> Result<Vec<SelectedFile>, UploadError> {
        let mut selected = Vec::new();
        for scanned in self.files {
            if !include_subfolders && scanned.sub_folder.is_some() {
                continue;
            }
            let Some(mime) = detect_content_type(&scanned.name).filter(|m| is_allowed(m)) else {
                debug!(name = %scanned.name, "skipping unsupported file type");
                continue;
            };
            let data = tokio::fs::read(&scanned.path).await?;
            selected.push(SelectedFile::new(scanned.name, mime, data));
        }
        Ok(selected)
    }
}

/// Scans `root` one level deep.
///
/// Entries are visited in name order. Each sub-folder gets one synthetic
/// id, shared by all of its files.
pub fn scan_folder(root: &Path) -> Result<FolderSelection, UploadError> {
    let folder = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut selection = FolderSelection {
        folder,
        ..Default::default()
    };

    for entry in sorted_entries(root)? {
        let metadata = std::fs::metadata(&entry)?;
        let name = file_name(&entry);

        if metadata.is_file() {
            selection.files.push(ScannedFile {
                path: entry,
                name,
                sub_folder: None,
            });
        } else if metadata.is_dir() {
            let sub_id = format!("{}{DIR_SEP}{name}", uuid::Uuid::new_v4());
            for nested in sorted_entries(&entry)? {
                let nested_meta = std::fs::metadata(&nested)?;
                if nested_meta.is_dir() {
                    warn!(path = %nested.display(), "skipping folder nested more than one level deep");
                    continue;
                }
                if !nested_meta.is_file() {
                    continue;
                }
                selection.files.push(ScannedFile {
                    name: format!("{sub_id}{FILE_SEP}{}", file_name(&nested)),
                    path: nested,
                    sub_folder: Some(sub_id.clone()),
                });
            }
            selection.sub_folders.push(sub_id);
        }
    }

    debug!(
        folder = %selection.folder,
        files = selection.files.len(),
        sub_folders = selection.sub_folders.len(),
        "folder scanned"
    );
    Ok(selection)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, UploadError> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Scans `root`, remembers the selection and tells the page about it.
///
/// The upload itself starts when the server answers with `upload-photos`.
pub async fn select_folder(session: &UploadSession, root: &Path) -> Result<FolderInformation, UploadError> {
    session.ensure_open()?;
    let selection = scan_folder(root)?;
    let info = selection.information();
    session.set_folder_selection(selection);
    push_typed(session.channel(), EventType::FolderInformation, &info).await?;
    Ok(info)
}

/// Splits an upload name into `(sub-folder id, original name)`.
pub fn decode_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(FILE_SEP) {
        Some((sub, original)) if sub.contains(DIR_SEP) => (Some(sub), original),
        _ => (None, name),
    }
}

/// Picks the album for a file.
///
/// Exact match of the decoded sub-folder id against the cached album
/// keys first, then any key contained in the name, then `fallback`.
pub fn resolve_container(
    file_name: &str,
    albums: Option<&FolderAlbums>,
    fallback: Option<&str>,
) -> Option<String> {
    if let Some(albums) = albums {
        if let (Some(sub), _) = decode_name(file_name)
            && let Some(album) = albums.albums.get(sub)
        {
            return Some(album.id.clone());
        }
        if let Some((_, album)) = albums.albums.iter().find(|(key, _)| file_name.contains(key.as_str())) {
            return Some(album.id.clone());
        }
    }
    fallback.map(str::to_string)
}

/// Returns the MIME type for an image file name, if recognized.
pub fn detect_content_type(name: &str) -> Option<&'static str> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("webp") => Some("image/webp"),
        Some("gif") => Some("image/gif"),
        Some("heic") => Some("image/heic"),
        _ => None,
    }
}

pub fn is_allowed(mime: &str) -> bool {
    ALLOWED_TYPES.contains(&mime)
}
