//! JSON configuration file matching the recognised keys: block size, sample
//! rate, thread count, and the per-renderer parameters each backend reads
//! when no CLI flag overrides it. Validated once, at load time, rather than
//! threaded through every call site as loose arguments.

use std::path::Path;

use serde::Deserialize;

use ssr_core::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub block_size: usize,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_threads")]
    pub threads: usize,
    pub reproduction_setup: Option<String>,
    pub xml_schema: Option<String>,
    pub system_output_prefix: Option<String>,
    pub hrir_file: Option<String>,
    pub hrir_size: Option<usize>,
    pub prefilter_file: Option<String>,
    pub delayline_size: Option<usize>,
    pub initial_delay: Option<usize>,
    pub ambisonics_order: Option<u32>,
    #[serde(default)]
    pub in_phase: bool,
    pub vbap_max_angle: Option<f32>,
    pub vbap_overhang_angle: Option<f32>,
    #[serde(default = "default_decay_exponent")]
    pub decay_exponent: f32,
    #[serde(default = "default_reference_distance")]
    pub amplitude_reference_distance: f32,
    #[serde(default)]
    pub master_volume_correction: f32,
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn default_decay_exponent() -> f32 {
    1.0
}

fn default_reference_distance() -> f32 {
    1.0
}

impl Config {
    pub fn load(path: &Path) -> ssr_core::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ssr_core::Result<()> {
        if self.block_size == 0 || self.block_size % 8 != 0 {
            return Err(Error::Configuration(format!(
                "block_size {} must be a nonzero multiple of 8",
                self.block_size
            )));
        }
        if self.threads == 0 {
            return Err(Error::Configuration("threads must be at least 1 (the realtime thread itself counts)".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_block_size_not_a_multiple_of_eight() {
        let config = Config {
            block_size: 100,
            sample_rate: 44_100,
            threads: 1,
            reproduction_setup: None,
            xml_schema: None,
            system_output_prefix: None,
            hrir_file: None,
            hrir_size: None,
            prefilter_file: None,
            delayline_size: None,
            initial_delay: None,
            ambisonics_order: None,
            in_phase: false,
            vbap_max_angle: None,
            vbap_overhang_angle: None,
            decay_exponent: 1.0,
            amplitude_reference_distance: 1.0,
            master_volume_correction: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_a_well_formed_config() {
        let json = r#"{"block_size": 64, "reproduction_setup": "setup.xml"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.threads, default_threads());
    }
}
