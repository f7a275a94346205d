use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// 48-bit hardware address of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The all-zero address used to target every device
    pub const BROADCAST: MacAddr = MacAddr([0; 6]);

    /// Returns whether this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Returns the raw address bytes
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| Error::invalid_field("mac_addr", format!("too few octets in {s:?}")))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|e| Error::invalid_field("mac_addr", format!("{part:?}: {e}")))?;
        }
        if parts.next().is_some() {
            return Err(Error::invalid_field("mac_addr", format!("too many octets in {s:?}")));
        }
        Ok(MacAddr(octets))
    }
}

/// Client-chosen identifier stamped on every outgoing frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub u32);

impl SourceId {
    /// Generates a new random, non-zero source identifier
    ///
    /// Zero asks devices to broadcast their replies, so it is never chosen.
    pub fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        SourceId(rng.gen_range(1..=u32::MAX))
    }
}

/// Hue, saturation, brightness and kelvin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

impl Color {
    pub const MIN_KELVIN: u16 = 2500;
    pub const MAX_KELVIN: u16 = 9000;

    pub const fn new(hue: u16, saturation: u16, brightness: u16, kelvin: u16) -> Self {
        Color {
            hue,
            saturation,
            brightness,
            kelvin,
        }
    }

    /// Checks the value can be sent to a device
    pub fn validate(&self) -> Result<()> {
        if !(Self::MIN_KELVIN..=Self::MAX_KELVIN).contains(&self.kelvin) {
            return Err(Error::invalid_field(
                "kelvin",
                format!(
                    "{} outside {}..={}",
                    self.kelvin,
                    Self::MIN_KELVIN,
                    Self::MAX_KELVIN
                ),
            ));
        }
        Ok(())
    }
}

impl From<(u16, u16, u16, u16)> for Color {
    fn from((hue, saturation, brightness, kelvin): (u16, u16, u16, u16)) -> Self {
        Color::new(hue, saturation, brightness, kelvin)
    }
}

/// On/off power state as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Power {
    Off,
    On,
}

impl Power {
    /// Wire level for this state
    pub fn level(self) -> u16 {
        match self {
            Power::Off => 0,
            Power::On => u16::MAX,
        }
    }

    /// Interprets a reported level; any non-zero level counts as on
    pub fn from_reported(level: u16) -> Self {
        if level == 0 {
            Power::Off
        } else {
            Power::On
        }
    }
}

impl From<bool> for Power {
    fn from(on: bool) -> Self {
        if on {
            Power::On
        } else {
            Power::Off
        }
    }
}

impl TryFrom<u16> for Power {
    type Error = Error;

    fn try_from(level: u16) -> Result<Self> {
        match level {
            0 => Ok(Power::Off),
            u16::MAX => Ok(Power::On),
            other => Err(Error::invalid_field(
                "power_level",
                format!("{other} is neither 0 nor 65535"),
            )),
        }
    }
}

/// Service advertised in a StateService reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    Udp,
    Reserved(u8),
}

impl From<u8> for Service {
    fn from(code: u8) -> Self {
        match code {
            1 => Service::Udp,
            other => Service::Reserved(other),
        }
    }
}

/// Handle for one physical device
///
/// The hardware address never changes; `addr` is the last address the device
/// was heard from and is refreshed by the client's device table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// The device's hardware address
    pub mac: MacAddr,
    /// Last known socket address
    pub addr: SocketAddr,
    /// Service reported during discovery
    pub service: Service,
}

impl Device {
    /// Creates a handle for a device at a known address
    pub fn new(mac: MacAddr, addr: SocketAddr) -> Self {
        Device {
            mac,
            addr,
            service: Service::Udp,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.mac, self.addr)
    }
}

/// Configuration for the LAN client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Local address each workflow socket binds to
    pub bind_addr: SocketAddr,
    /// Port devices listen on
    pub device_port: u16,
    /// Broadcast addresses used for discovery and broadcast workflows
    pub broadcast_addrs: Vec<IpAddr>,
    /// Receive window of one attempt
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub timeout: Duration,
    /// Maximum attempts of an acknowledged or response workflow
    pub max_attempts: u32,
    /// Receive window of one discovery attempt
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub discovery_timeout: Duration,
    /// Number of discovery broadcasts
    pub discovery_attempts: u32,
    /// Copies sent by a fire-and-forget workflow
    pub num_repeats: u32,
    /// Delay between fire-and-forget copies
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub repeat_interval: Duration,
    /// Number of devices expected on the network, if known
    pub expected_devices: Option<usize>,
    /// Maximum in-flight sub-requests of a fan-out
    pub max_concurrency: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            device_port: super::DEFAULT_PORT,
            broadcast_addrs: vec![IpAddr::V4(Ipv4Addr::BROADCAST)],
            timeout: Duration::from_millis(500),
            max_attempts: 5,
            discovery_timeout: Duration::from_millis(300),
            discovery_attempts: 3,
            num_repeats: 5,
            repeat_interval: Duration::from_millis(10),
            expected_devices: None,
            max_concurrency: 8,
        }
    }
}

impl ClientConfig {
    /// Checks the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 || self.discovery_attempts == 0 {
            return Err(Error::config("attempt counts must be at least 1"));
        }
        if self.num_repeats == 0 {
            return Err(Error::config("num_repeats must be at least 1"));
        }
        if self.max_concurrency == 0 {
            return Err(Error::config("max_concurrency must be at least 1"));
        }
        if self.broadcast_addrs.is_empty() {
            return Err(Error::config("at least one broadcast address is required"));
        }
        Ok(())
    }

    /// Delay between fire-and-forget copies for a given repeat count
    ///
    /// Devices accept roughly 20 messages per second, so long bursts are paced.
    pub fn repeat_interval_for(&self, repeats: u32) -> Duration {
        if repeats > 20 {
            self.repeat_interval.max(Duration::from_millis(50))
        } else {
            self.repeat_interval
        }
    }

    /// Socket addresses a broadcast is sent to
    pub fn broadcast_targets(&self) -> Vec<SocketAddr> {
        self.broadcast_addrs
            .iter()
            .map(|ip| SocketAddr::new(*ip, self.device_port))
            .collect()
    }
}
