//! Storage layout for snapshot chunks and manifests.
//!
//! ```text
//! snapshots/{snapshot_id}/{entity_key}/manifest.json
//! snapshots/{snapshot_id}/{entity_key}/chunk-{index:08}.json
//! ```
//!
//! `entity_key` is the ledger template id with path-hostile characters
//! folded to `_`; the manifest body keeps the original template id.

pub const MANIFEST_FILE: &str = "manifest.json";

/// Fold a ledger template id into a path-safe key.
pub fn entity_key(template_id: &str) -> String {
    template_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

pub fn snapshot_root(snapshot_id: &str) -> String {
    format!("snapshots/{snapshot_id}")
}

pub fn manifest_path(snapshot_id: &str, template_id: &str) -> String {
    format!(
        "{}/{}/{MANIFEST_FILE}",
        snapshot_root(snapshot_id),
        entity_key(template_id)
    )
}

pub fn chunk_path(snapshot_id: &str, template_id: &str, index: u64) -> String {
    format!(
        "{}/{}/chunk-{index:08}.json",
        snapshot_root(snapshot_id),
        entity_key(template_id)
    )
}

/// Directory portion of an object path ("" when at the root).
pub fn parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve a manifest chunk reference against the manifest's directory.
///
/// Entries written by this pipeline are store-rooted already; references
/// without a directory component are treated as siblings of the manifest.
pub fn resolve_chunk_path(manifest_dir: &str, reference: &str) -> String {
    let trimmed = reference.trim_start_matches('/');
    if trimmed.contains('/') || manifest_dir.is_empty() {
        trimmed.to_string()
    } else {
        format!("{manifest_dir}/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_key_folds_separators() {
        assert_eq!(entity_key("acme.ledger:Token:Holding"), "acme.ledger_Token_Holding");
    }

    #[test]
    fn layout_is_stable() {
        assert_eq!(
            manifest_path("snap-1", "a:B:C"),
            "snapshots/snap-1/a_B_C/manifest.json"
        );
        assert_eq!(
            chunk_path("snap-1", "a:B:C", 3),
            "snapshots/snap-1/a_B_C/chunk-00000003.json"
        );
    }

    #[test]
    fn relative_chunk_refs_resolve_against_manifest_dir() {
        let dir = parent("snapshots/s/holding/manifest.json");
        assert_eq!(
            resolve_chunk_path(dir, "chunk-00000001.json"),
            "snapshots/s/holding/chunk-00000001.json"
        );
        assert_eq!(
            resolve_chunk_path(dir, "snapshots/s/holding/chunk-00000002.json"),
            "snapshots/s/holding/chunk-00000002.json"
        );
        assert_eq!(
            resolve_chunk_path(dir, "/snapshots/s/holding/chunk-00000003.json"),
            "snapshots/s/holding/chunk-00000003.json"
        );
    }
}
