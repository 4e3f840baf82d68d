use chrono::{DateTime, Utc};
use object_store::{Metadata, ObjectProperties};

/// Metadata key marking a zero-byte object as a directory.
pub const FOLDER_KEY: &str = "hdi_isfolder";
/// Metadata key marking an object as a symbolic link.
pub const SYMLINK_KEY: &str = "is_symlink";
/// Metadata key holding octal permission bits.
pub const PERMISSIONS_KEY: &str = "permissions";

/// Size reported for directories.
pub const DIRECTORY_SIZE: u64 = 4096;

const S_IFDIR: u32 = libc::S_IFDIR as u32;
const S_IFREG: u32 = libc::S_IFREG as u32;
const S_IFLNK: u32 = libc::S_IFLNK as u32;

/// A file, directory or link as seen through the mount.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    /// Path relative to the mount root, without leading separator
    pub path: String,
    /// Final path component
    pub name: String,
    pub size: u64,
    /// File type and permission bits
    pub mode: u32,
    pub mtime: DateTime<Utc>,
    pub atime: DateTime<Utc>,
    pub ctime: DateTime<Utc>,
    pub crtime: DateTime<Utc>,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub metadata: Metadata,
    /// Metadata came from the backend rather than being synthesized
    pub metadata_retrieved: bool,
    /// Permission bits are not stored; the mount default applies
    pub mode_default: bool,
}

fn flag_set(metadata: &Metadata, key: &str) -> bool {
    metadata
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case(key) && v.eq_ignore_ascii_case("true"))
}

/// Whether metadata marks its object as a directory.
pub fn is_folder(metadata: &Metadata) -> bool {
    flag_set(metadata, FOLDER_KEY)
}

/// Whether metadata marks its object as a symbolic link.
pub fn is_symlink(metadata: &Metadata) -> bool {
    flag_set(metadata, SYMLINK_KEY)
}

/// Permission bits stored in metadata, if any.
pub fn stored_permissions(metadata: &Metadata) -> Option<u32> {
    metadata
        .get(PERMISSIONS_KEY)
        .and_then(|p| u32::from_str_radix(p.trim_start_matches("0o"), 8).ok())
        .map(|p| p & 0o7777)
}

/// Final component of a slash separated path.
pub fn base_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

impl DirectoryEntry {
    /// Entry for a backend object at mount path `path`.
    pub fn from_properties(path: String, props: &ObjectProperties) -> Self {
        let is_dir = is_folder(&props.metadata);
        let is_symlink = !is_dir && is_symlink(&props.metadata);
        let permissions = stored_permissions(&props.metadata);
        let file_type = if is_dir {
            S_IFDIR
        } else if is_symlink {
            S_IFLNK
        } else {
            S_IFREG
        };

        Self {
            name: base_name(&path).to_string(),
            path,
            size: if is_dir { DIRECTORY_SIZE } else { props.size },
            mode: file_type | permissions.unwrap_or(0),
            mtime: props.modified_at,
            atime: props.modified_at,
            ctime: props.modified_at,
            crtime: props.created_at,
            is_dir,
            is_symlink,
            metadata: props.metadata.clone(),
            metadata_retrieved: true,
            mode_default: permissions.is_none(),
        }
    }

    /// Entry for a directory that exists only as a common name prefix.
    pub fn virtual_dir(path: String) -> Self {
        let now = Utc::now();
        Self {
            name: base_name(&path).to_string(),
            path,
            size: DIRECTORY_SIZE,
            mode: S_IFDIR,
            mtime: now,
            atime: now,
            ctime: now,
            crtime: now,
            is_dir: true,
            is_symlink: false,
            metadata: Metadata::new(),
            metadata_retrieved: true,
            mode_default: true,
        }
    }

    /// Entry for the mount root.
    pub fn root() -> Self {
        Self::virtual_dir(String::new())
    }

    /// Permission bits without the file type.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(name: &str, size: u64, metadata: &[(&str, &str)]) -> ObjectProperties {
        ObjectProperties {
            name: name.to_string(),
            size,
            content_type: None,
            tier: None,
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            created_at: DateTime::from_timestamp(1, 0).unwrap(),
            modified_at: DateTime::from_timestamp(2, 0).unwrap(),
        }
    }

    #[test]
    fn test_file_entry() {
        let entry = DirectoryEntry::from_properties("a/b.txt".into(), &props("a/b.txt", 5, &[]));
        assert_eq!(entry.name, "b.txt");
        assert_eq!(entry.size, 5);
        assert!(!entry.is_dir);
        assert!(entry.mode_default);
        assert_eq!(entry.mode, S_IFREG);
        assert_eq!(entry.crtime.timestamp(), 1);
        assert_eq!(entry.mtime.timestamp(), 2);
    }

    #[test]
    fn test_directory_marker_entry() {
        let entry =
            DirectoryEntry::from_properties("a/dir".into(), &props("a/dir", 0, &[("Hdi_IsFolder", "TRUE")]));
        assert!(entry.is_dir);
        assert_eq!(entry.size, DIRECTORY_SIZE);
        assert_eq!(entry.mode & S_IFDIR, S_IFDIR);
    }

    #[test]
    fn test_symlink_and_permissions() {
        let entry = DirectoryEntry::from_properties(
            "ln".into(),
            &props("ln", 3, &[("is_symlink", "true"), ("permissions", "0750")]),
        );
        assert!(entry.is_symlink);
        assert!(!entry.mode_default);
        assert_eq!(entry.permissions(), 0o750);
        assert_eq!(entry.mode, S_IFLNK | 0o750);
    }

    #[test]
    fn test_virtual_dir() {
        let entry = DirectoryEntry::virtual_dir("x/y".into());
        assert_eq!(entry.name, "y");
        assert!(entry.is_dir);
        assert!(entry.metadata_retrieved);
        assert!(entry.mode_default);
        assert_eq!(entry.size, 4096);
    }
}
