use std::time::Duration;

/// Format version written to new documents. Versions 0 through
/// [`FORMAT_VERSION`] are all accepted on read.
pub const FORMAT_VERSION: u32 = 4;

/// Separator used when building storage keys.
pub const WRITE_KEY_SEPARATOR: char = '/';

/// Separator found in keys written by old deployments. Recognized when
/// splitting, never written.
pub const LEGACY_KEY_SEPARATOR: char = '.';

pub(crate) const CACHE_TTL_ENV: &str = "VANTAGE_CACHE_TTL_SECS";

const DEFAULT_CACHE_TTL_SECS: u64 = 30;

pub(crate) fn catalog_cache_ttl() -> Duration {
    Duration::from_secs(read_env_u64(CACHE_TTL_ENV).unwrap_or(DEFAULT_CACHE_TTL_SECS))
}

fn read_env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_ttl_defaults_to_thirty_seconds() {
        assert_eq!(
            Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            Duration::from_secs(30)
        );
        assert!(catalog_cache_ttl() >= Duration::from_secs(1));
    }
}
