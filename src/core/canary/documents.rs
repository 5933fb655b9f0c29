//! Decoy document table and the robots.txt lure that advertises it.

/// One decoy document served at a fixed path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanaryDocumentSpec {
    pub path: &'static str,
    pub description: &'static str,
    pub content_type: &'static str,
}

const HTML: &str = "text/html; charset=utf-8";

/// Every decoy the dispenser knows about
pub const CANARY_DOCUMENTS: &[CanaryDocumentSpec] = &[
    CanaryDocumentSpec {
        path: "/admin/backup/db-export.html",
        description: "Database Export - Production Backup",
        content_type: HTML,
    },
    CanaryDocumentSpec {
        path: "/internal/api-keys.html",
        description: "Internal API Key Registry",
        content_type: HTML,
    },
    CanaryDocumentSpec {
        path: "/backup/credentials-2024.html",
        description: "Service Credentials Archive 2024",
        content_type: HTML,
    },
    CanaryDocumentSpec {
        path: "/.private/aws-config.html",
        description: "AWS Access Configuration",
        content_type: HTML,
    },
    CanaryDocumentSpec {
        path: "/admin/backup/users-export.html",
        description: "User Account Export",
        content_type: HTML,
    },
];

/// Look up the decoy served at `path`, ignoring a trailing slash.
pub fn find_canary_document(path: &str) -> Option<&'static CanaryDocumentSpec> {
    let trimmed = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    CANARY_DOCUMENTS.iter().find(|doc| doc.path == trimmed)
}

/// Directories that contain decoys, e.g. `/admin/backup/`
pub fn decoy_directories() -> Vec<&'static str> {
    let mut dirs: Vec<&'static str> = CANARY_DOCUMENTS
        .iter()
        .filter_map(|doc| doc.path.rfind('/').map(|idx| &doc.path[..=idx]))
        .filter(|dir| *dir != "/")
        .collect();
    dirs.sort_unstable();
    dirs.dedup();
    dirs
}

/// True for paths inside a decoy directory that are not themselves decoys.
/// Only crawlers following the robots.txt lure end up here.
pub fn is_robots_violation(path: &str) -> bool {
    find_canary_document(path).is_none()
        && decoy_directories()
            .iter()
            .any(|dir| path.starts_with(dir) || path == dir.trim_end_matches('/'))
}

/// robots.txt advertising every decoy as off-limits
pub fn render_robots_txt() -> String {
    let mut out = String::from("User-agent: *\n");
    for dir in decoy_directories() {
        out.push_str(&format!("Disallow: {dir}\n"));
    }
    for doc in CANARY_DOCUMENTS {
        out.push_str(&format!("Disallow: {}\n", doc.path));
    }
    out
}
