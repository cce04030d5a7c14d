//! Built-in plugins, in declaration order

pub mod torrent;
pub mod ytsam;

use crate::config::Config;
use crate::error::Result;
use crate::plugin::PluginDescriptor;
use crate::store::StorageGateway;
use std::sync::Arc;

/// The plugins shipped with the dashboard, movie catalog first
pub fn builtin_plugins(gateway: Arc<StorageGateway>, config: &Config) -> Result<Vec<PluginDescriptor>> {
    let catalog = ytsam::YtsCatalog::new(&config.yts_base_url, config.yts_page_limit)?;

    Ok(vec![
        ytsam::plugin(gateway.clone(), Arc::new(catalog), config.yts_max_pages),
        torrent::plugin(gateway, &config.data_dir),
    ])
}

/// Human readable byte count using decimal units, e.g. `1.5 kB`
pub fn byte_count_decimal(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    let prefix = ['k', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_count_decimal() {
        assert_eq!(byte_count_decimal(999), "999 B");
        assert_eq!(byte_count_decimal(1000), "1.0 kB");
        assert_eq!(byte_count_decimal(1_500_000), "1.5 MB");
        assert_eq!(byte_count_decimal(3_000_000_000), "3.0 GB");
    }
}
