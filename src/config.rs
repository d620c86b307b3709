use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use rs_ws281x;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/ledgend.json";

const NETWORK_NAME_VAR: &str = "LEDGEND_NETWORK_NAME";
const NETWORK_KEY_VAR: &str = "LEDGEND_NETWORK_KEY";

fn default_allow_interrupts() -> u8 {
    0
}

// if wifi bursts in lots of packets very fast, three slots of slack keeps
// frame data from being overridden before it reaches the strips
fn default_buffer_depth() -> usize {
    3
}

fn default_subnet() -> [u8; 4] {
    [0, 0, 0, 0]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub name: String,
    pub port: u16,
    pub setup_port: u16,
    pub dma: i32,
    pub freq: u32,
    /// 0: a render pass runs to completion before more packets are taken.
    /// 1: packet intake keeps draining the socket while a render is in
    /// flight. Usually ~900-1000 packets/second are fine without this.
    #[serde(default = "default_allow_interrupts")]
    pub allow_interrupts: u8,
    /// Depth of the incoming-frame ring between intake and render.
    #[serde(default = "default_buffer_depth")]
    pub buffer_depth: usize,
    #[serde(default = "default_subnet")]
    pub subnet: [u8; 4],
    #[serde(default = "default_subnet")]
    pub netmask: [u8; 4],
    pub channels: Vec<ChannelConfig>,
    pub strips: Vec<StripConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub num: usize,
    pub pin: i32,
    pub count: i32,
    pub invert: bool,
    pub brightness: u8,
    pub strip_type: rs_ws281x::StripType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripConfig {
    pub name: String,
    pub start_addr: usize,
    pub end_addr: usize,
    pub channel: usize,
}

impl ControllerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ControllerConfig> {
        let raw = fs::read_to_string(path)?;
        let config: ControllerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn num_addrs(&self) -> i32 {
        self.channels.iter().map(|c| c.count).sum()
    }

    pub fn interrupts_allowed(&self) -> bool {
        self.allow_interrupts == 1
    }

    /// Rejects configurations the render and intake paths cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_depth == 0 {
            return Err(Error::Invalid(
                "buffer_depth must be at least 1".to_string(),
            ));
        }
        if self.allow_interrupts > 1 {
            return Err(Error::Invalid(format!(
                "allow_interrupts must be 0 or 1, got {}",
                self.allow_interrupts
            )));
        }
        if self.channels.is_empty() {
            return Err(Error::Invalid("no channels configured".to_string()));
        }
        for channel in &self.channels {
            if channel.count <= 0 {
                return Err(Error::Invalid(format!(
                    "channel {} has non-positive led count {}",
                    channel.num, channel.count
                )));
            }
        }
        for strip in &self.strips {
            if strip.start_addr > strip.end_addr {
                return Err(Error::Invalid(format!(
                    "strip '{}' has start_addr {} past end_addr {}",
                    strip.name, strip.start_addr, strip.end_addr
                )));
            }
            if !self.channels.iter().any(|c| c.num == strip.channel) {
                return Err(Error::Invalid(format!(
                    "strip '{}' references unknown channel {}",
                    strip.name, strip.channel
                )));
            }
        }
        Ok(())
    }
}

/// Wireless network identity, injected through the environment so the
/// credential never lives in a config file or in source control.
#[derive(Clone)]
pub struct NetworkAuth {
    pub name: String,
    key: String,
}

impl NetworkAuth {
    /// Reads `LEDGEND_NETWORK_NAME` / `LEDGEND_NETWORK_KEY`, honoring a
    /// `.env` file. `None` means the host network is already provisioned
    /// and no join attempt should be made.
    pub fn from_env() -> Option<NetworkAuth> {
        dotenvy::dotenv().ok();
        let name = env::var(NETWORK_NAME_VAR).ok()?;
        let key = env::var(NETWORK_KEY_VAR).unwrap_or_default();
        Some(NetworkAuth { name, key })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for NetworkAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkAuth")
            .field("name", &self.name)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

pub fn build_controller(config: &ControllerConfig) -> Result<rs_ws281x::Controller> {
    let builder = &mut rs_ws281x::ControllerBuilder::new();
    builder.freq(config.freq).dma(config.dma);
    for channel_config in config.channels.iter() {
        builder.channel(
            channel_config.num,
            rs_ws281x::ChannelBuilder::new()
                .pin(channel_config.pin)
                .count(channel_config.count)
                .invert(channel_config.invert)
                .brightness(channel_config.brightness)
                .strip_type(channel_config.strip_type)
                .build(),
        );
    }
    builder
        .build()
        .map_err(|e| Error::Led(format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ControllerConfig {
        serde_json::from_str(
            r#"{
                "name": "workbench",
                "port": 8080,
                "setup_port": 37322,
                "dma": 10,
                "freq": 800000,
                "channels": [
                    {"num": 0, "pin": 18, "count": 150, "invert": false,
                     "brightness": 255, "strip_type": "Ws2812"},
                    {"num": 1, "pin": 13, "count": 150, "invert": false,
                     "brightness": 255, "strip_type": "Ws2812"}
                ],
                "strips": [
                    {"name": "left", "start_addr": 0, "end_addr": 149, "channel": 0},
                    {"name": "right", "start_addr": 150, "end_addr": 299, "channel": 1}
                ]
            }"#,
        )
        .expect("fixture should parse")
    }

    #[test]
    fn omitted_tunables_take_defaults() {
        let config = base_config();
        assert_eq!(config.allow_interrupts, 0);
        assert_eq!(config.buffer_depth, 3);
        assert!(!config.interrupts_allowed());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn buffer_depth_zero_is_rejected() {
        let mut config = base_config();
        config.buffer_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn allow_interrupts_is_restricted_to_zero_or_one() {
        let mut config = base_config();
        config.allow_interrupts = 1;
        assert!(config.validate().is_ok());
        assert!(config.interrupts_allowed());
        config.allow_interrupts = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn strip_referencing_missing_channel_is_rejected() {
        let mut config = base_config();
        config.strips[0].channel = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_strip_range_is_rejected() {
        let mut config = base_config();
        config.strips[1].start_addr = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn num_addrs_sums_channel_counts() {
        assert_eq!(base_config().num_addrs(), 300);
    }

    #[test]
    fn load_reads_and_validates_a_config_file() {
        let path = std::env::temp_dir().join("ledgend-load-test.json");
        fs::write(
            &path,
            r#"{
                "name": "hallway",
                "port": 8080,
                "setup_port": 37322,
                "dma": 10,
                "freq": 800000,
                "allow_interrupts": 1,
                "buffer_depth": 4,
                "channels": [
                    {"num": 0, "pin": 18, "count": 60, "invert": false,
                     "brightness": 128, "strip_type": "Ws2812"}
                ],
                "strips": [
                    {"name": "hall", "start_addr": 0, "end_addr": 59, "channel": 0}
                ]
            }"#,
        )
        .expect("fixture write should succeed");
        let config = ControllerConfig::load(&path).expect("config should load");
        fs::remove_file(&path).ok();
        assert_eq!(config.buffer_depth, 4);
        assert!(config.interrupts_allowed());
        assert_eq!(config.num_addrs(), 60);
    }

    #[test]
    fn load_rejects_a_zero_depth_config_file() {
        let path = std::env::temp_dir().join("ledgend-load-reject-test.json");
        fs::write(
            &path,
            r#"{
                "name": "bad",
                "port": 8080,
                "setup_port": 37322,
                "dma": 10,
                "freq": 800000,
                "buffer_depth": 0,
                "channels": [
                    {"num": 0, "pin": 18, "count": 60, "invert": false,
                     "brightness": 128, "strip_type": "Ws2812"}
                ],
                "strips": []
            }"#,
        )
        .expect("fixture write should succeed");
        let result = ControllerConfig::load(&path);
        fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn network_key_never_appears_in_debug_output() {
        let auth = NetworkAuth {
            name: "stagenet".to_string(),
            key: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", auth);
        assert!(rendered.contains("stagenet"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn credentials_are_opaque_text() {
        // no structure is enforced at this layer
        let auth = NetworkAuth {
            name: "  spaces and ünicode ".to_string(),
            key: String::new(),
        };
        assert_eq!(auth.key(), "");
        assert_eq!(auth.name, "  spaces and ünicode ");
    }
}
