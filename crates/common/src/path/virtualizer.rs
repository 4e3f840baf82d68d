/// Maps mount paths onto flat object names.
///
/// A mount may be rooted at a sub-prefix of the container (`prefix_path`);
/// that prefix is applied to every name sent to the backend and stripped
/// from every name coming back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVirtualizer {
    prefix_path: String,
}

impl PathVirtualizer {
    pub fn new(prefix_path: &str) -> Self {
        Self {
            prefix_path: normalize(prefix_path),
        }
    }

    pub fn prefix_path(&self) -> &str {
        &self.prefix_path
    }

    /// Object name of a mount path.
    pub fn object_name(&self, path: &str) -> String {
        let path = normalize(path);
        match (self.prefix_path.is_empty(), path.is_empty()) {
            (true, _) => path,
            (false, true) => self.prefix_path.clone(),
            (false, false) => format!("{}/{}", self.prefix_path, path),
        }
    }

    /// Listing prefix of a directory: empty for the container root,
    /// otherwise the object name with a trailing separator.
    pub fn list_prefix(&self, path: &str) -> String {
        let name = self.object_name(path);
        if name.is_empty() {
            name
        } else {
            format!("{}/", name)
        }
    }

    /// Mount path of an object name.
    pub fn mount_path<'a>(&self, name: &'a str) -> &'a str {
        if self.prefix_path.is_empty() {
            return name;
        }
        name.strip_prefix(self.prefix_path.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(name)
    }
}

/// Canonical form of a mount path: no leading, trailing or repeated
/// separators and no `.` components.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent of a normalized path; `None` for the root.
pub fn parent(path: &str) -> Option<String> {
    let path = normalize(path);
    if path.is_empty() {
        return None;
    }
    Some(match path.rfind('/') {
        Some(pos) => path[..pos].to_string(),
        None => String::new(),
    })
}

/// Every proper ancestor of a path, outermost first, excluding the root.
pub fn ancestors(path: &str) -> Vec<String> {
    let path = normalize(path);
    let parts: Vec<&str> = path.split('/').collect();
    (1..parts.len()).map(|n| parts[..n].join("/")).collect()
}
