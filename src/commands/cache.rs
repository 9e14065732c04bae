//! `cache` command: OCR cache maintenance

use super::{cache_path, cache_ttl};
use crate::cli::CacheCommand;
use crate::config::Config;
use crate::error::Result;
use crate::ocr::OcrCache;

/// Handle a `cache` subcommand
///
/// # Errors
///
/// Returns error if the cache database cannot be opened
pub fn run(config: &Config, command: CacheCommand) -> Result<()> {
    let cache = OcrCache::new(cache_path(config)?)?;
    println!("{}", apply(&cache, config, &command));
    Ok(())
}

fn apply(cache: &OcrCache, config: &Config, command: &CacheCommand) -> String {
    match command {
        CacheCommand::Cleanup => {
            let removed = cache.cleanup(cache_ttl(config));
            format!(
                "Removed {} entries older than {} days ({} remaining)",
                removed,
                config.ocr.cache_ttl_days,
                cache.len()
            )
        }
        CacheCommand::Clear => format!("Removed {} entries", cache.clear()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrResult;
    use crate::test_utils::temp_dir;

    #[test]
    fn test_clear_empties_cache() {
        let dir = temp_dir();
        let cache = OcrCache::new(dir.path().join("ocr_cache")).unwrap();
        cache.set("a", &[OcrResult::pending("u")]);
        cache.set("b", &[]);

        let message = apply(&cache, &Config::default(), &CacheCommand::Clear);
        assert_eq!(message, "Removed 2 entries");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_keeps_fresh_entries() {
        let dir = temp_dir();
        let cache = OcrCache::new(dir.path().join("ocr_cache")).unwrap();
        cache.set("fresh", &[]);

        let message = apply(&cache, &Config::default(), &CacheCommand::Cleanup);
        assert_eq!(message, "Removed 0 entries older than 7 days (1 remaining)");
        assert_eq!(cache.len(), 1);
    }
}
