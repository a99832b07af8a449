use records_core::error::StoreError;
use records_core::schema::AchievementDocument;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct VaultPaths {
    pub root: PathBuf,
    pub achievements_dir: PathBuf,
}

impl VaultPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            achievements_dir: root.join("achievements"),
            root,
        }
    }

    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.achievements_dir)
    }

    /// Path of the JSON file backing `id`, or `None` when `id` is not a
    /// well-formed document id.
    pub fn document_path(&self, id: &str) -> Option<PathBuf> {
        is_document_id(id).then(|| self.achievements_dir.join(format!("{id}.json")))
    }
}

/// 24 lowercase hex characters: eight of creation time in unix seconds,
/// then sixteen random.
pub fn new_document_id(unix_seconds: i64) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{:08x}{}", unix_seconds as u32, &random[..16])
}

pub fn is_document_id(id: &str) -> bool {
    id.len() == 24 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

pub fn read_document(path: &Path) -> Result<Option<AchievementDocument>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Replaces the file at `path` through a sibling temp file so readers never
/// observe a partial document.
pub fn write_document(path: &Path, doc: &AchievementDocument) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn remove_document(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}
