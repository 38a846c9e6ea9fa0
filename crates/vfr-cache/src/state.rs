//! The runtime's persistent state cache.
//!
//! The Lifecycle Controller persists exactly three keys so it can auto-boot
//! on the next page load without a network round trip: the app slug, the
//! last loaded bundle's bytes, and the server url the bundle was fetched
//! from. `StateCache` wraps any [`Cache`] with typed accessors for those
//! three keys so callers never spell out the key strings themselves.

use crate::{Cache, CacheBucket, CacheBucketExt};

const BUCKET: &str = "vfr-state";
const ENTRY_ETAG: &str = "v1";
const KEY_APP_SLUG: &str = "appSlug";
const KEY_BUNDLE_BYTES: &str = "bundleBytes";
const KEY_SERVER_URL: &str = "serverUrl";

/// Typed view over the runtime's three fixed persistence keys.
pub struct StateCache {
    bucket: Box<dyn CacheBucket>,
}

impl StateCache {
    /// Open the state bucket on `cache`.
    #[must_use]
    pub fn new(cache: &dyn Cache) -> Self {
        Self {
            bucket: cache.bucket(BUCKET),
        }
    }

    /// The last persisted app slug, if any.
    #[must_use]
    pub fn app_slug(&self) -> Option<String> {
        self.bucket.get_string(KEY_APP_SLUG, ENTRY_ETAG)
    }

    /// Persist the app slug.
    pub fn set_app_slug(&self, slug: &str) {
        self.bucket.set_string(KEY_APP_SLUG, ENTRY_ETAG, slug);
    }

    /// The last persisted bundle bytes, if any.
    #[must_use]
    pub fn bundle_bytes(&self) -> Option<Vec<u8>> {
        self.bucket.get(KEY_BUNDLE_BYTES, ENTRY_ETAG)
    }

    /// Persist bundle bytes.
    pub fn set_bundle_bytes(&self, bytes: &[u8]) {
        self.bucket.set(KEY_BUNDLE_BYTES, ENTRY_ETAG, bytes);
    }

    /// The last persisted server url, if any.
    #[must_use]
    pub fn server_url(&self) -> Option<String> {
        self.bucket.get_string(KEY_SERVER_URL, ENTRY_ETAG)
    }

    /// Persist the server url.
    pub fn set_server_url(&self, url: &str) {
        self.bucket.set_string(KEY_SERVER_URL, ENTRY_ETAG, url);
    }

    /// Clear all three keys, e.g. when the app scope is explicitly reset.
    pub fn clear(&self) {
        self.bucket.remove(KEY_APP_SLUG);
        self.bucket.remove(KEY_BUNDLE_BYTES);
        self.bucket.remove(KEY_SERVER_URL);
    }
}
