//! Mapper configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;

/// Tunables for compilation, binding and cache eviction.
///
/// Every field has a default, so a partial JSON document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperOptions {
    /// Let `user_name` match a member named `UserName`.
    pub match_names_with_underscores: bool,
    /// Strings up to this many characters get a fixed parameter size of
    /// exactly this value; longer ones are unbounded.
    pub string_size_threshold: usize,
    /// Cache publishes between eviction sweeps.
    pub sweep_every_insertions: usize,
    /// Slots with at most this many hits are evicted by a sweep.
    pub eviction_hit_floor: u64,
    /// Skip members whose name is not a placeholder in text commands.
    pub filter_parameters_by_sql: bool,
    /// Find existing parameters by name before creating new ones.
    pub check_existing_parameters: bool,
}

impl Default for MapperOptions {
    fn default() -> Self {
        MapperOptions {
            match_names_with_underscores: false,
            string_size_threshold: 4000,
            sweep_every_insertions: 1000,
            eviction_hit_floor: 0,
            filter_parameters_by_sql: true,
            check_existing_parameters: false,
        }
    }
}

impl MapperOptions {
    pub fn from_json_str(json: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let options = MapperOptions::from_json_str(r#"{"match_names_with_underscores": true}"#)
            .unwrap();
        assert!(options.match_names_with_underscores);
        assert_eq!(options.string_size_threshold, 4000);
        assert_eq!(options.sweep_every_insertions, 1000);
        assert!(options.filter_parameters_by_sql);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            MapperOptions::from_json_str("{"),
            Err(OptionsError::Json(_))
        ));
        assert!(matches!(
            MapperOptions::from_json_file("/definitely/not/here.json"),
            Err(OptionsError::Io { .. })
        ));
    }

    #[test]
    fn default_rendering() {
        insta::assert_json_snapshot!(MapperOptions::default(), @r###"
        {
          "match_names_with_underscores": false,
          "string_size_threshold": 4000,
          "sweep_every_insertions": 1000,
          "eviction_hit_floor": 0,
          "filter_parameters_by_sql": true,
          "check_existing_parameters": false
        }
        "###);
    }
}
