//! Configuration Provider Trait

use std::str::FromStr;

use super::{ConfigError, ConfigResult};

/// Source of flat string configuration values.
pub trait ConfigProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Get a raw configuration value
    fn get_raw(&self, key: &str) -> ConfigResult<Option<String>>;
}

/// Extension methods for typed configuration access
pub trait ConfigProviderExt: ConfigProvider {
    /// Get a value parsed with [`FromStr`].
    fn get_parsed<T>(&self, key: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_raw(key)? {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("{} ({:?})", e, raw),
                }),
            None => Ok(None),
        }
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProviderExt for P {}
