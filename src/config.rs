use std::{fs, path::Path};

use anyhow::{bail, Context};
use serde::{Deserialize, Deserializer};

use crate::dot11::MAX_ESSID_LEN;

/// Settings for a conversion run. Every field can also be given on the command line, which takes
/// precedence over the file.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Only keep handshakes of the network with exactly this name. Compared byte for byte.
    #[serde(default, deserialize_with = "essid_bytes")]
    pub essid: Option<Vec<u8>>,
    /// Stop after this many records have been written.
    pub max_networks: Option<usize>,
}

impl Config {
    /// Reads a configuration file to a [Config] object.
    pub fn read(p: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conf = fs::read_to_string(p).context("cannot read configuration file")?;
        let config: Self = toml::from_str(&conf)?;
        config.validate()?;
        Ok(config)
    }

    /// Replaces the values of this configuration with the ones set in `other`.
    pub fn merge(self, other: Config) -> Self {
        Self {
            essid: other.essid.or(self.essid),
            max_networks: other.max_networks.or(self.max_networks),
        }
    }

    /// Validate the configuration for any disallowed values.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_networks == Some(0) {
            bail!("`max-networks` must be at least 1");
        }

        if let Some(essid) = &self.essid {
            // Captured names hold at most 32 bytes.
            if essid.is_empty() || essid.len() > MAX_ESSID_LEN {
                bail!(
                    "ESSID `{}` must be between 1 and {MAX_ESSID_LEN} bytes long",
                    String::from_utf8_lossy(essid)
                );
            }
        }

        Ok(())
    }

    /// The ESSID filter as raw bytes.
    pub fn essid_filter(&self) -> Option<&[u8]> {
        self.essid.as_deref()
    }
}

fn essid_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.map(String::into_bytes))
}
