use crate::{AnimationStateData, Error};
use serde::Deserialize;

/// Mix durations loaded from JSON:
///
/// ```json
/// { "defaultMix": 0.2, "mixes": [{ "from": "walk", "to": "run", "duration": 0.4 }] }
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MixConfig {
    #[serde(default)]
    pub default_mix: f32,
    #[serde(default)]
    pub mixes: Vec<MixEntry>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MixEntry {
    pub from: String,
    pub to: String,
    pub duration: f32,
}

impl MixConfig {
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        serde_json::from_str(input).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
        })
    }
}

impl AnimationStateData {
    /// Sets the default mix and every pair of `config`. Stops at the first pair naming an
    /// unknown animation or carrying an invalid duration.
    pub fn apply_config(&mut self, config: &MixConfig) -> Result<(), Error> {
        self.set_default_mix(config.default_mix)?;
        for mix in &config.mixes {
            self.set_mix(&mix.from, &mix.to, mix.duration)?;
        }
        log::debug!("applied mix config with {} pairs", config.mixes.len());
        Ok(())
    }
}
