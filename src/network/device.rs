use std::time::Duration;

use chrono::{DateTime, Utc};

use super::client::LanClient;
use super::transport::Binder;
use crate::core::{Color, Device, Error, Power, Result};
use crate::protocol::{Label, Message, MessageKind, Waveform};
use crate::util::{duration_to_millis, nanos_to_datetime, nanos_to_duration};

/// Hardware identity reported by StateVersion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub vendor: u32,
    pub product: u32,
    pub version: u32,
}

/// Firmware build time and version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firmware {
    pub build: DateTime<Utc>,
    pub major: u16,
    pub minor: u16,
}

impl Firmware {
    fn from_wire(build: u64, version: u32) -> Self {
        Firmware {
            build: nanos_to_datetime(build),
            major: (version >> 16) as u16,
            minor: (version & 0xffff) as u16,
        }
    }
}

/// Radio statistics from StateHostInfo or StateWifiInfo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalInfo {
    /// Signal strength in milliwatts
    pub signal: f32,
    pub tx: u32,
    pub rx: u32,
}

/// Device clock and power history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub time: DateTime<Utc>,
    pub uptime: Duration,
    pub downtime: Duration,
}

/// Group or location membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub id: [u8; 16],
    pub label: String,
    pub updated_at: DateTime<Utc>,
}

/// Light colour state from LightState
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightStatus {
    pub color: Color,
    pub power: Power,
    pub label: String,
}

/// A LightSetWaveform effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformEffect {
    /// Return to the original colour when the effect ends
    pub transient: bool,
    pub color: Color,
    pub period: Duration,
    pub cycles: f32,
    /// Duty cycle skew, -32768..=32767
    pub skew_ratio: i16,
    pub waveform: Waveform,
}

impl WaveformEffect {
    /// Checks the effect can be sent
    pub fn validate(&self) -> Result<()> {
        if !self.cycles.is_finite() || self.cycles <= 0.0 {
            return Err(Error::invalid_field(
                "cycles",
                format!("{} is not a positive count", self.cycles),
            ));
        }
        self.color.validate()
    }

    fn message(&self) -> Message {
        Message::LightSetWaveform {
            reserved: 0,
            transient: u8::from(self.transient),
            color: self.color,
            period: duration_to_millis(self.period),
            cycles: self.cycles,
            skew_ratio: self.skew_ratio,
            waveform: self.waveform,
        }
    }
}

/// Point-in-time view of one device, read by [`LanClient::refresh`]
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub device: Device,
    pub label: String,
    pub power: Power,
    pub version: Version,
    pub host_firmware: Firmware,
    pub wifi_firmware: Firmware,
    pub group: Membership,
    pub location: Membership,
}

fn unexpected(message: Message) -> Error {
    Error::protocol(format!("unexpected {} reply", message.name()))
}

impl<B: Binder> LanClient<B> {
    async fn query(&self, device: &Device, message: Message, expected: MessageKind) -> Result<Message> {
        self.send_with_response(device, message, &[expected]).await
    }

    pub async fn get_label(&self, device: &Device) -> Result<String> {
        match self.query(device, Message::GetLabel {}, MessageKind::StateLabel).await? {
            Message::StateLabel { label } => Ok(label.into_string()),
            other => Err(unexpected(other)),
        }
    }

    /// Renames a device; labels longer than 32 bytes are rejected before sending
    pub async fn set_label(&self, device: &Device, label: &str) -> Result<()> {
        let label = Label::new(label)?;
        self.send_with_ack(device, Message::SetLabel { label }).await
    }

    pub async fn get_power(&self, device: &Device) -> Result<Power> {
        match self.query(device, Message::GetPower {}, MessageKind::StatePower).await? {
            Message::StatePower { power_level } => Ok(Power::from_reported(power_level)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn set_power(&self, device: &Device, power: Power, rapid: bool) -> Result<()> {
        let message = Message::SetPower {
            power_level: power.level(),
        };
        self.apply(device, message, rapid).await
    }

    /// Light power, which unlike device power supports a transition
    pub async fn get_light_power(&self, device: &Device) -> Result<Power> {
        match self
            .query(device, Message::LightGetPower {}, MessageKind::LightStatePower)
            .await?
        {
            Message::LightStatePower { power_level } => Ok(Power::from_reported(power_level)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn set_light_power(
        &self,
        device: &Device,
        power: Power,
        duration: Duration,
        rapid: bool,
    ) -> Result<()> {
        let message = Message::LightSetPower {
            power_level: power.level(),
            duration: duration_to_millis(duration),
        };
        self.apply(device, message, rapid).await
    }

    /// Colour, power and label in one round trip
    pub async fn get_color(&self, device: &Device) -> Result<LightStatus> {
        match self.query(device, Message::LightGet {}, MessageKind::LightState).await? {
            Message::LightState {
                color,
                power_level,
                label,
                ..
            } => Ok(LightStatus {
                color,
                power: Power::from_reported(power_level),
                label: label.into_string(),
            }),
            other => Err(unexpected(other)),
        }
    }

    pub async fn set_color(
        &self,
        device: &Device,
        color: Color,
        duration: Duration,
        rapid: bool,
    ) -> Result<()> {
        let message = Message::LightSetColor {
            reserved: 0,
            color,
            duration: duration_to_millis(duration),
        };
        self.apply(device, message, rapid).await
    }

    pub async fn set_waveform(&self, device: &Device, effect: WaveformEffect, rapid: bool) -> Result<()> {
        effect.validate()?;
        self.apply(device, effect.message(), rapid).await
    }

    pub async fn get_infrared(&self, device: &Device) -> Result<u16> {
        match self
            .query(device, Message::LightGetInfrared {}, MessageKind::LightStateInfrared)
            .await?
        {
            Message::LightStateInfrared { brightness } => Ok(brightness),
            other => Err(unexpected(other)),
        }
    }

    pub async fn set_infrared(&self, device: &Device, brightness: u16, rapid: bool) -> Result<()> {
        self.apply(device, Message::LightSetInfrared { brightness }, rapid)
            .await
    }

    pub async fn get_version(&self, device: &Device) -> Result<Version> {
        match self.query(device, Message::GetVersion {}, MessageKind::StateVersion).await? {
            Message::StateVersion {
                vendor,
                product,
                version,
            } => Ok(Version {
                vendor,
                product,
                version,
            }),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_host_firmware(&self, device: &Device) -> Result<Firmware> {
        match self
            .query(device, Message::GetHostFirmware {}, MessageKind::StateHostFirmware)
            .await?
        {
            Message::StateHostFirmware { build, version, .. } => Ok(Firmware::from_wire(build, version)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_wifi_firmware(&self, device: &Device) -> Result<Firmware> {
        match self
            .query(device, Message::GetWifiFirmware {}, MessageKind::StateWifiFirmware)
            .await?
        {
            Message::StateWifiFirmware { build, version, .. } => Ok(Firmware::from_wire(build, version)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_host_info(&self, device: &Device) -> Result<SignalInfo> {
        match self.query(device, Message::GetHostInfo {}, MessageKind::StateHostInfo).await? {
            Message::StateHostInfo { signal, tx, rx, .. } => Ok(SignalInfo { signal, tx, rx }),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_wifi_info(&self, device: &Device) -> Result<SignalInfo> {
        match self.query(device, Message::GetWifiInfo {}, MessageKind::StateWifiInfo).await? {
            Message::StateWifiInfo { signal, tx, rx, .. } => Ok(SignalInfo { signal, tx, rx }),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_info(&self, device: &Device) -> Result<RuntimeInfo> {
        match self.query(device, Message::GetInfo {}, MessageKind::StateInfo).await? {
            Message::StateInfo {
                time,
                uptime,
                downtime,
            } => Ok(RuntimeInfo {
                time: nanos_to_datetime(time),
                uptime: nanos_to_duration(uptime),
                downtime: nanos_to_duration(downtime),
            }),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_group(&self, device: &Device) -> Result<Membership> {
        match self.query(device, Message::GetGroup {}, MessageKind::StateGroup).await? {
            Message::StateGroup {
                group,
                label,
                updated_at,
            } => Ok(Membership {
                id: group,
                label: label.into_string(),
                updated_at: nanos_to_datetime(updated_at),
            }),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_location(&self, device: &Device) -> Result<Membership> {
        match self.query(device, Message::GetLocation {}, MessageKind::StateLocation).await? {
            Message::StateLocation {
                location,
                label,
                updated_at,
            } => Ok(Membership {
                id: location,
                label: label.into_string(),
                updated_at: nanos_to_datetime(updated_at),
            }),
            other => Err(unexpected(other)),
        }
    }

    /// Round-trips up to 64 bytes through the device
    pub async fn echo(&self, device: &Device, data: &[u8]) -> Result<Vec<u8>> {
        let mut payload = [0u8; 64];
        if data.len() > payload.len() {
            return Err(Error::PayloadTooLong {
                field: "data",
                len: data.len(),
                max: payload.len(),
            });
        }
        payload[..data.len()].copy_from_slice(data);

        match self
            .query(device, Message::EchoRequest { data: payload }, MessageKind::EchoResponse)
            .await?
        {
            Message::EchoResponse { data: echoed } => Ok(echoed[..data.len()].to_vec()),
            other => Err(unexpected(other)),
        }
    }

    /// Reads a fresh snapshot of the device's identity and state
    ///
    /// The reads run concurrently and all of them settle, so every transport
    /// is closed, before the first failure in field order is returned.
    pub async fn refresh(&self, device: &Device) -> Result<DeviceSnapshot> {
        let (label, power, version, host_firmware, wifi_firmware, group, location) = tokio::join!(
            self.get_label(device),
            self.get_power(device),
            self.get_version(device),
            self.get_host_firmware(device),
            self.get_wifi_firmware(device),
            self.get_group(device),
            self.get_location(device),
        );

        Ok(DeviceSnapshot {
            label: label?,
            power: power?,
            version: version?,
            host_firmware: host_firmware?,
            wifi_firmware: wifi_firmware?,
            group: group?,
            location: location?,
            device: self.device(device.mac).await.unwrap_or(*device),
        })
    }

    /// Power state of every device that answers a broadcast
    pub async fn get_power_all(&self) -> Result<Vec<(Device, Power)>> {
        let replies = self
            .broadcast_with_response(Message::GetPower {}, &[MessageKind::StatePower])
            .await?;
        replies
            .into_iter()
            .map(|(device, message)| match message {
                Message::StatePower { power_level } => Ok((device, Power::from_reported(power_level))),
                other => Err(unexpected(other)),
            })
            .collect()
    }

    /// Switches every device; acknowledged unless `rapid`
    pub async fn set_power_all(&self, power: Power, rapid: bool) -> Result<()> {
        let message = Message::SetPower {
            power_level: power.level(),
        };
        if rapid {
            self.broadcast_fire_and_forget(message).await
        } else {
            self.broadcast_with_ack(message).await.map(|_| ())
        }
    }

    /// Colour state of every device that answers a broadcast
    pub async fn get_color_all(&self) -> Result<Vec<(Device, LightStatus)>> {
        let replies = self
            .broadcast_with_response(Message::LightGet {}, &[MessageKind::LightState])
            .await?;
        replies
            .into_iter()
            .map(|(device, message)| match message {
                Message::LightState {
                    color,
                    power_level,
                    label,
                    ..
                } => Ok((
                    device,
                    LightStatus {
                        color,
                        power: Power::from_reported(power_level),
                        label: label.into_string(),
                    },
                )),
                other => Err(unexpected(other)),
            })
            .collect()
    }

    /// Runs one waveform effect on every device; acknowledged unless `rapid`
    pub async fn set_waveform_all(&self, effect: WaveformEffect, rapid: bool) -> Result<()> {
        effect.validate()?;
        if rapid {
            self.broadcast_fire_and_forget(effect.message()).await
        } else {
            self.broadcast_with_ack(effect.message()).await.map(|_| ())
        }
    }

    /// Sets every device to one colour; acknowledged unless `rapid`
    pub async fn set_color_all(&self, color: Color, duration: Duration, rapid: bool) -> Result<()> {
        let message = Message::LightSetColor {
            reserved: 0,
            color,
            duration: duration_to_millis(duration),
        };
        if rapid {
            self.broadcast_fire_and_forget(message).await
        } else {
            self.broadcast_with_ack(message).await.map(|_| ())
        }
    }
}
