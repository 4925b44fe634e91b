//! Persisted speaker setup.
//!
//! The JSON layout uses camelCase keys so files written by existing sender
//! tools load unchanged.

use crate::error::{Result, VirtualAudioError};
use crate::math::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for ConfigVec3 {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<ConfigVec3> for Vec3 {
    fn from(v: ConfigVec3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerConfig {
    pub position: ConfigVec3,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl SpeakerConfig {
    pub fn new(position: Vec3, volume: f32) -> Self {
        Self {
            position: position.into(),
            volume,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OscSetting {
    #[serde(default)]
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_near_distance")]
    pub near_distance: f32,
    #[serde(default = "default_far_distance")]
    pub far_distance: f32,
}

impl Default for OscSetting {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".into(),
            port: 9000,
            near_distance: default_near_distance(),
            far_distance: default_far_distance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscCommand {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscCommandInts {
    pub command: String,
    #[serde(default)]
    pub parameters: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscCommandFloats {
    pub command: String,
    #[serde(default)]
    pub parameters: Vec<f32>,
}

/// Speaker layout and mode flags for a mixer context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualAudioSetupConfig {
    #[serde(default)]
    pub object_based_audio: bool,
    #[serde(default = "default_max_object_based_channels")]
    pub max_object_based_channels: usize,
    #[serde(default)]
    pub centered_audio_on_all_speakers: bool,
    #[serde(default)]
    pub use_audio_origin_position_for_virtual_attenuation: bool,
    #[serde(default)]
    pub speakers: Vec<SpeakerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osc_setting: Option<OscSetting>,
    #[serde(default)]
    pub osc_init_commands: Vec<OscCommand>,
    #[serde(default)]
    pub osc_init_commands_ints: Vec<OscCommandInts>,
    #[serde(default)]
    pub osc_init_commands_floats: Vec<OscCommandFloats>,
}

impl Default for VirtualAudioSetupConfig {
    fn default() -> Self {
        Self {
            object_based_audio: false,
            max_object_based_channels: default_max_object_based_channels(),
            centered_audio_on_all_speakers: false,
            use_audio_origin_position_for_virtual_attenuation: false,
            speakers: Vec::new(),
            osc_setting: None,
            osc_init_commands: Vec::new(),
            osc_init_commands_ints: Vec::new(),
            osc_init_commands_floats: Vec::new(),
        }
    }
}

fn default_volume() -> f32 {
    1.0
}

fn default_max_object_based_channels() -> usize {
    16
}

fn default_near_distance() -> f32 {
    0.1
}

fn default_far_distance() -> f32 {
    10.0
}

impl VirtualAudioSetupConfig {
    /// Parses and validates a config. Nothing is applied on failure.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading virtual audio setup from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        log::info!(
            "Saved virtual audio setup with {} speakers to {}",
            self.speakers.len(),
            path.display()
        );
        Ok(())
    }

    /// Copy of this config without OSC connection details, for sharing.
    pub fn without_osc(&self) -> Self {
        Self {
            osc_setting: None,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_object_based_channels == 0 {
            return Err(VirtualAudioError::Configuration(
                "maxObjectBasedChannels must be greater than zero".into(),
            ));
        }

        for (i, speaker) in self.speakers.iter().enumerate() {
            let p = speaker.position;
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                return Err(VirtualAudioError::Configuration(format!(
                    "Speaker {} has a non-finite position",
                    i
                )));
            }
            if !(0.0..=1.0).contains(&speaker.volume) {
                return Err(VirtualAudioError::Configuration(format!(
                    "Speaker {} volume {} is outside [0, 1]",
                    i, speaker.volume
                )));
            }
        }

        if let Some(osc) = &self.osc_setting {
            if osc.enabled && (osc.host.is_empty() || osc.port == 0) {
                return Err(VirtualAudioError::Configuration(format!(
                    "Invalid OSC target {}:{}",
                    osc.host, osc.port
                )));
            }
            if osc.far_distance <= osc.near_distance {
                return Err(VirtualAudioError::Configuration(format!(
                    "OSC far distance {} must exceed near distance {}",
                    osc.far_distance, osc.near_distance
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "objectBasedAudio": false,
        "maxObjectBasedChannels": 8,
        "centeredAudioOnAllSpeakers": true,
        "useAudioOriginPositionForVirtualAttenuation": false,
        "speakers": [
            { "position": { "x": -1.0, "y": 0.0, "z": 1.0 }, "volume": 1.0 },
            { "position": { "x": 1.0, "y": 0.0, "z": 1.0 }, "volume": 0.5 }
        ],
        "oscSetting": {
            "enabled": true,
            "host": "192.168.0.20",
            "port": 4001,
            "nearDistance": 0.5,
            "farDistance": 20.0
        },
        "oscInitCommandsInts": [ { "command": "/adm/config/obj/count", "parameters": [8] } ]
    }"#;

    #[test]
    fn test_parse_sample_config() {
        let config = VirtualAudioSetupConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.max_object_based_channels, 8);
        assert!(config.centered_audio_on_all_speakers);
        assert_eq!(config.speakers.len(), 2);
        assert_eq!(config.speakers[1].volume, 0.5);
        let osc = config.osc_setting.as_ref().unwrap();
        assert_eq!(osc.port, 4001);
        assert_eq!(config.osc_init_commands_ints[0].parameters, vec![8]);
        assert!(config.osc_init_commands.is_empty());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = VirtualAudioSetupConfig::from_json("{}").unwrap();
        assert_eq!(config, VirtualAudioSetupConfig::default());
        assert_eq!(config.max_object_based_channels, 16);
    }

    #[test]
    fn test_json_round_trip() {
        let config = VirtualAudioSetupConfig::from_json(SAMPLE).unwrap();
        let json = config.to_json().unwrap();
        assert!(json.contains("\"maxObjectBasedChannels\""));
        let again = VirtualAudioSetupConfig::from_json(&json).unwrap();
        assert_eq!(config, again);
    }

    #[test]
    fn test_without_osc_is_not_serialized() {
        let config = VirtualAudioSetupConfig::from_json(SAMPLE).unwrap();
        let json = config.without_osc().to_json().unwrap();
        assert!(!json.contains("oscSetting"));
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(VirtualAudioSetupConfig::from_json("{ not json").is_err());
        assert!(VirtualAudioSetupConfig::from_json(r#"{"maxObjectBasedChannels": 0}"#).is_err());
        let bad_volume = r#"{"speakers": [{"position": {"x":0,"y":0,"z":1}, "volume": 3.0}]}"#;
        assert!(VirtualAudioSetupConfig::from_json(bad_volume).is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.json");

        let mut config = VirtualAudioSetupConfig::default();
        config.speakers.push(SpeakerConfig::new(Vec3::new(0.0, 1.0, 2.0), 0.25));
        config.save(&path).unwrap();

        let loaded = VirtualAudioSetupConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
