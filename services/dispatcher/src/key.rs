//! Cache-key derivation.
//!
//! `key = queue_name + "/" + base58(SHA384(path ++ query))`.  The host is
//! excluded from the digest on purpose: aliasing is canonicalized through
//! the queue name, so two aliases of the same host collide.  The digest is
//! over the raw concatenation with no separator, so callers must pass path
//! and query exactly as received.

use sha2::{Digest, Sha384};

pub fn cache_key(queue_name: &str, path: &str, query: Option<&str>) -> String {
    let mut hasher = Sha384::new();
    hasher.update(path.as_bytes());
    if let Some(query) = query {
        hasher.update(query.as_bytes());
    }
    format!(
        "{}/{}",
        queue_name,
        bs58::encode(hasher.finalize()).into_string()
    )
}
