//! # Memory Configuration
//!
//! The fixed memory budget of the process, loaded once at startup.
//!
//! ```toml
//! # kiln.toml
//! linear_capacity = 16777216   # per-frame scratch
//! stack_capacity = 4194304     # scoped scratch
//! pool_capacity = 67108864     # persistent blocks
//!
//! handle_table_capacity = 256
//! name_index_buckets = 128
//! name_index_bucket_size = 4
//! name_index_max_probes = 8
//! handle_cache_slots = 32
//! ```
//!
//! Every field is optional; missing fields take the defaults above.

use std::path::Path;

use kiln_resources::{ManagerLayout, MAX_CACHE_SLOTS, MAX_INDEX_SLOTS};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Largest arena capacity: views store offsets as `u32`.
const MAX_ARENA_CAPACITY: usize = u32::MAX as usize - 16;

/// Arena sizes and handle-table layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Linear (per-frame) arena size in bytes.
    pub linear_capacity: usize,
    /// Stack (scoped) arena size in bytes.
    pub stack_capacity: usize,
    /// Pool (persistent) arena size in bytes.
    pub pool_capacity: usize,
    /// Objects per resource table.
    pub handle_table_capacity: usize,
    /// Buckets in each table's name index.
    pub name_index_buckets: usize,
    /// Slots per name-index bucket.
    pub name_index_bucket_size: usize,
    /// Buckets probed per name.
    pub name_index_max_probes: usize,
    /// Handle cache slots per table (power of two).
    pub handle_cache_slots: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        let layout = ManagerLayout::default();
        Self {
            linear_capacity: 16 * 1024 * 1024, // 16 MiB
            stack_capacity: 4 * 1024 * 1024,   // 4 MiB
            pool_capacity: 64 * 1024 * 1024,   // 64 MiB
            handle_table_capacity: layout.capacity,
            name_index_buckets: layout.index_buckets,
            name_index_bucket_size: layout.index_bucket_size,
            name_index_max_probes: layout.index_max_probes,
            handle_cache_slots: layout.cache_slots,
        }
    }
}

impl MemoryConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `Parse` for malformed TOML or unknown fields, `Invalid` for values
    /// rejected by [`MemoryConfig::validate`].
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, otherwise as
    /// [`MemoryConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), ?config, "memory config loaded");
        Ok(config)
    }

    /// Checks that the engine can run with this budget.
    ///
    /// # Errors
    ///
    /// `Invalid` naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, capacity) in [
            ("linear_capacity", self.linear_capacity),
            ("stack_capacity", self.stack_capacity),
            ("pool_capacity", self.pool_capacity),
        ] {
            if capacity == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "arena capacity must be non-zero",
                });
            }
            if capacity > MAX_ARENA_CAPACITY {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "arena capacity must fit in a u32",
                });
            }
        }
        for (field, value) in [
            ("handle_table_capacity", self.handle_table_capacity),
            ("name_index_buckets", self.name_index_buckets),
            ("name_index_bucket_size", self.name_index_bucket_size),
            ("name_index_max_probes", self.name_index_max_probes),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be non-zero",
                });
            }
        }
        if self.handle_table_capacity >= u32::MAX as usize {
            return Err(ConfigError::Invalid {
                field: "handle_table_capacity",
                reason: "handles are 32-bit",
            });
        }
        match self.manager_layout().index_slots() {
            None => {
                return Err(ConfigError::Invalid {
                    field: "name_index_buckets",
                    reason: "name index slot count overflows",
                });
            }
            Some(slots) if slots > MAX_INDEX_SLOTS => {
                return Err(ConfigError::Invalid {
                    field: "name_index_buckets",
                    reason: "name index exceeds the maximum slot count",
                });
            }
            Some(slots) if slots / 2 < self.handle_table_capacity => {
                return Err(ConfigError::Invalid {
                    field: "name_index_buckets",
                    reason: "name index must hold at least twice handle_table_capacity",
                });
            }
            Some(_) => {}
        }
        if !self.handle_cache_slots.is_power_of_two() {
            return Err(ConfigError::Invalid {
                field: "handle_cache_slots",
                reason: "must be a non-zero power of two",
            });
        }
        if self.handle_cache_slots > MAX_CACHE_SLOTS {
            return Err(ConfigError::Invalid {
                field: "handle_cache_slots",
                reason: "exceeds the maximum cache size",
            });
        }
        Ok(())
    }

    /// Layout for every resource table built from this config.
    #[must_use]
    pub fn manager_layout(&self) -> ManagerLayout {
        ManagerLayout {
            capacity: self.handle_table_capacity,
            index_buckets: self.name_index_buckets,
            index_bucket_size: self.name_index_bucket_size,
            index_max_probes: self.name_index_max_probes,
            cache_slots: self.handle_cache_slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget() {
        let config = MemoryConfig::default();
        assert_eq!(config.linear_capacity, 16 * 1024 * 1024);
        assert_eq!(config.stack_capacity, 4 * 1024 * 1024);
        assert_eq!(config.pool_capacity, 64 * 1024 * 1024);
        assert_eq!(config.handle_table_capacity, 256);
        assert_eq!(config.handle_cache_slots, 32);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MemoryConfig::from_toml_str("stack_capacity = 65536\n").unwrap();
        assert_eq!(config.stack_capacity, 65536);
        assert_eq!(config.linear_capacity, MemoryConfig::default().linear_capacity);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(MemoryConfig::from_toml_str("").unwrap(), MemoryConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            MemoryConfig::from_toml_str("linear_capacty = 1024\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            MemoryConfig::from_toml_str("pool_capacity = 0\n"),
            Err(ConfigError::Invalid { field: "pool_capacity", .. })
        ));
    }

    #[test]
    fn test_cache_slots_must_be_power_of_two() {
        assert!(matches!(
            MemoryConfig::from_toml_str("handle_cache_slots = 24\n"),
            Err(ConfigError::Invalid { field: "handle_cache_slots", .. })
        ));
    }

    #[test]
    fn test_index_must_outsize_table() {
        assert!(matches!(
            MemoryConfig::from_toml_str("handle_table_capacity = 300\n"),
            Err(ConfigError::Invalid { field: "name_index_buckets", .. })
        ));
        assert!(MemoryConfig::from_toml_str("handle_table_capacity = 256\n").is_ok());
    }

    #[test]
    fn test_huge_index_rejected() {
        let overflowing = MemoryConfig {
            name_index_buckets: usize::MAX,
            name_index_bucket_size: 2,
            ..MemoryConfig::default()
        };
        assert!(matches!(
            overflowing.validate(),
            Err(ConfigError::Invalid { field: "name_index_buckets", .. })
        ));
        assert!(matches!(
            MemoryConfig::from_toml_str("name_index_buckets = 1073741824\n"),
            Err(ConfigError::Invalid { field: "name_index_buckets", .. })
        ));
        assert!(matches!(
            MemoryConfig::from_toml_str("handle_cache_slots = 2147483648\n"),
            Err(ConfigError::Invalid { field: "handle_cache_slots", .. })
        ));
    }

    #[test]
    fn test_default_layout_builds_a_table() {
        let layout = MemoryConfig::default().manager_layout();
        assert!(layout.validate("models").is_ok());
    }

    #[test]
    fn test_manager_layout_mirrors_fields() {
        let config = MemoryConfig {
            handle_table_capacity: 8,
            handle_cache_slots: 4,
            ..MemoryConfig::default()
        };
        let layout = config.manager_layout();
        assert_eq!(layout.capacity, 8);
        assert_eq!(layout.cache_slots, 4);
        assert_eq!(layout.index_buckets, config.name_index_buckets);
    }
}
