use std::future::Future;
use std::ops::RangeInclusive;
use std::time::Duration;

use tracing::debug;

use super::client::LanClient;
use super::device::WaveformEffect;
use super::fanout::fan_out;
use super::transport::{Binder, UdpBinder};
use crate::core::{Color, Device, MacAddr, Power, Result};
use crate::protocol::ApplyRequest;

/// An explicit set of devices driven together
///
/// Every operation runs once per member through the client's bounded
/// fan-out and waits for all members. A failure names the member's index in
/// [`DeviceGroup::devices`].
pub struct DeviceGroup<B = UdpBinder> {
    client: LanClient<B>,
    devices: Vec<Device>,
}

impl<B> Clone for DeviceGroup<B> {
    fn clone(&self) -> Self {
        DeviceGroup {
            client: self.client.clone(),
            devices: self.devices.clone(),
        }
    }
}

impl<B: Binder> LanClient<B> {
    /// Groups devices for collective control
    pub fn group(&self, devices: impl IntoIterator<Item = Device>) -> DeviceGroup<B> {
        DeviceGroup {
            client: self.clone(),
            devices: devices.into_iter().collect(),
        }
    }
}

impl<B: Binder> DeviceGroup<B> {
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn add_device(&mut self, device: Device) {
        self.devices.push(device);
    }

    /// Drops every member with the given hardware address
    pub fn remove_device(&mut self, mac: MacAddr) {
        self.devices.retain(|device| device.mac != mac);
    }

    async fn each<F, Fut>(&self, op: F) -> Result<()>
    where
        F: Fn(Device) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        debug!(members = self.devices.len(), "group write");
        fan_out(0..self.devices.len(), self.client.config().max_concurrency, |index| {
            op(self.devices[index])
        })
        .await?;
        Ok(())
    }

    /// Switches every member; a non-zero `duration` fades light power
    pub async fn set_power(&self, power: Power, duration: Duration, rapid: bool) -> Result<()> {
        let client = &self.client;
        self.each(move |device| async move {
            if duration.is_zero() {
                client.set_power(&device, power, rapid).await
            } else {
                client.set_light_power(&device, power, duration, rapid).await
            }
        })
        .await
    }

    pub async fn set_color(&self, color: Color, duration: Duration, rapid: bool) -> Result<()> {
        color.validate()?;
        let client = &self.client;
        self.each(move |device| async move { client.set_color(&device, color, duration, rapid).await })
            .await
    }

    pub async fn set_hue(&self, hue: u16, duration: Duration, rapid: bool) -> Result<()> {
        self.adjust(duration, rapid, |color| Color { hue, ..color }).await
    }

    pub async fn set_saturation(&self, saturation: u16, duration: Duration, rapid: bool) -> Result<()> {
        self.adjust(duration, rapid, |color| Color { saturation, ..color }).await
    }

    pub async fn set_brightness(&self, brightness: u16, duration: Duration, rapid: bool) -> Result<()> {
        self.adjust(duration, rapid, |color| Color { brightness, ..color })
            .await
    }

    pub async fn set_kelvin(&self, kelvin: u16, duration: Duration, rapid: bool) -> Result<()> {
        Color::new(0, 0, 0, kelvin).validate()?;
        self.adjust(duration, rapid, |color| Color { kelvin, ..color }).await
    }

    /// Changes one colour component on every member, keeping the others
    ///
    /// Current colours are all read before any member is written, so the
    /// writes land close together.
    async fn adjust<F>(&self, duration: Duration, rapid: bool, change: F) -> Result<()>
    where
        F: Fn(Color) -> Color,
    {
        let client = &self.client;
        let limit = client.config().max_concurrency;
        let current = fan_out(0..self.devices.len(), limit, |index| {
            let device = self.devices[index];
            async move { client.get_color(&device).await }
        })
        .await?;

        let targets: Vec<Color> = current
            .into_iter()
            .map(|(_, status)| change(status.color))
            .collect();
        targets.iter().try_for_each(Color::validate)?;
        let targets = &targets;

        fan_out(0..self.devices.len(), limit, |index| {
            let device = self.devices[index];
            let color = targets[index];
            async move { client.set_color(&device, color, duration, rapid).await }
        })
        .await?;
        Ok(())
    }

    pub async fn set_infrared(&self, brightness: u16, rapid: bool) -> Result<()> {
        let client = &self.client;
        self.each(move |device| async move { client.set_infrared(&device, brightness, rapid).await })
            .await
    }

    pub async fn set_waveform(&self, effect: WaveformEffect, rapid: bool) -> Result<()> {
        effect.validate()?;
        let client = &self.client;
        self.each(move |device| async move { client.set_waveform(&device, effect, rapid).await })
            .await
    }

    /// Sets the same zone range on every multi-zone member
    pub async fn set_zone_color(
        &self,
        zones: RangeInclusive<u8>,
        color: Color,
        duration: Duration,
        apply: ApplyRequest,
        rapid: bool,
    ) -> Result<()> {
        color.validate()?;
        let client = &self.client;
        let zones = &zones;
        self.each(move |device| async move {
            client
                .set_zone_color(&device, zones.clone(), color, duration, apply, rapid)
                .await
        })
        .await
    }

    /// Writes the same zone colours to every multi-zone member
    pub async fn set_zone_colors(&self, colors: &[Color], duration: Duration, rapid: bool) -> Result<()> {
        colors.iter().try_for_each(Color::validate)?;
        let client = &self.client;
        self.each(move |device| async move {
            client.set_zone_colors(&device, colors, duration, rapid).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ClientConfig, Error};
    use crate::network::mock::{device_addr, device_mac, reply, MockBinder};
    use crate::protocol::{Frame, Message, MessageKind};
    use bytes::Bytes;
    use std::net::SocketAddr;

    fn config() -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }

    fn members() -> Vec<Device> {
        (1..=4).map(|n| Device::new(device_mac(n), device_addr(n))).collect()
    }

    /// Bulbs 2 and 4 never answer; the rest report a colour and ack writes
    fn partly_offline(request: &Frame) -> Vec<(Bytes, SocketAddr)> {
        let mac = request.target();
        let n = mac.0[5];
        if n == 2 || n == 4 {
            return Vec::new();
        }
        let message = match request.message {
            Message::LightGet {} => Message::LightState {
                color: Color::new(u16::from(n) * 100, 1000, 2000, 4000),
                reserved: 0,
                power_level: 65535,
                label: Default::default(),
                reserved2: 0,
            },
            _ => Message::Acknowledgement {},
        };
        vec![(reply(request, mac, message), device_addr(n))]
    }

    fn all_online(request: &Frame) -> Vec<(Bytes, SocketAddr)> {
        let mac = request.target();
        let message = match request.message {
            Message::LightGet {} => Message::LightState {
                color: Color::new(u16::from(mac.0[5]) * 100, 1000, 2000, 4000),
                reserved: 0,
                power_level: 0,
                label: Default::default(),
                reserved2: 0,
            },
            _ => Message::Acknowledgement {},
        };
        vec![(reply(request, mac, message), device_addr(mac.0[5]))]
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_keyed_by_member_index() {
        let binder = MockBinder::new(|_, request| partly_offline(request));
        let client = LanClient::with_binder(config(), binder.clone()).unwrap();
        let group = client.group(members());

        let err = group
            .set_power(Power::On, Duration::ZERO, false)
            .await
            .unwrap_err();
        assert_eq!(err.failed_indices(), vec![1, 3]);

        // every member was attempted; offline ones until their retries ran out
        let writes = binder.sent_of_type(MessageKind::SetPower.code());
        assert_eq!(writes.len(), 1 + 5 + 1 + 5);
        assert_eq!(binder.closes(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_with_duration_fades_light() {
        let binder = MockBinder::new(|_, request| all_online(request));
        let client = LanClient::with_binder(config(), binder.clone()).unwrap();

        client
            .group(members())
            .set_power(Power::Off, Duration::from_millis(750), false)
            .await
            .unwrap();
        let writes = binder.sent_of_type(MessageKind::LightSetPower.code());
        assert_eq!(writes.len(), 4);
        assert!(matches!(
            writes[0].message,
            Message::LightSetPower { power_level: 0, duration: 750 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_brightness_keeps_other_components() {
        let binder = MockBinder::new(|_, request| all_online(request));
        let client = LanClient::with_binder(config(), binder.clone()).unwrap();

        client
            .group(members())
            .set_brightness(65535, Duration::ZERO, false)
            .await
            .unwrap();

        let mut written: Vec<_> = binder
            .sent_of_type(MessageKind::LightSetColor.code())
            .into_iter()
            .map(|frame| match frame.message {
                Message::LightSetColor { color, .. } => (frame.target(), color),
                _ => unreachable!(),
            })
            .collect();
        written.sort_by_key(|(mac, _)| *mac);
        assert_eq!(written.len(), 4);
        for (n, (mac, color)) in (1..=4).zip(written) {
            assert_eq!(mac, device_mac(n));
            assert_eq!(color, Color::new(u16::from(n) * 100, 1000, 65535, 4000));
        }
        // colours are read before anything is written
        let sent = binder.sent();
        assert!(sent[..4].iter().all(|s| s.frame.message == Message::LightGet {}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjust_read_failure_writes_nothing() {
        let binder = MockBinder::new(|_, request| partly_offline(request));
        let client = LanClient::with_binder(config(), binder.clone()).unwrap();

        let err = client
            .group(members())
            .set_hue(0, Duration::ZERO, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AggregateFanOutFailure { .. }));
        assert_eq!(err.failed_indices(), vec![1, 3]);
        assert!(binder.sent_of_type(MessageKind::LightSetColor.code()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_values_rejected_before_io() {
        let binder = MockBinder::silent();
        let client = LanClient::with_binder(config(), binder.clone()).unwrap();
        let group = client.group(members());

        assert!(group.set_kelvin(12000, Duration::ZERO, false).await.is_err());
        assert!(group
            .set_color(Color::new(0, 0, 0, 100), Duration::ZERO, true)
            .await
            .is_err());
        assert!(group
            .set_zone_colors(&[Color::new(0, 0, 0, 100)], Duration::ZERO, false)
            .await
            .is_err());
        assert_eq!(binder.binds(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_membership() {
        let client = LanClient::with_binder(config(), MockBinder::silent()).unwrap();
        let mut group = client.group(members());
        group.remove_device(device_mac(2));
        group.add_device(Device::new(device_mac(9), device_addr(9)));

        let macs: Vec<_> = group.devices().iter().map(|d| d.mac).collect();
        assert_eq!(macs, vec![device_mac(1), device_mac(3), device_mac(4), device_mac(9)]);
        assert_eq!(group.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_infrared_reaches_every_member() {
        let binder = MockBinder::silent();
        let client = LanClient::with_binder(config(), binder.clone()).unwrap();

        client.group(members()).set_infrared(32768, true).await.unwrap();
        let writes = binder.sent_of_type(MessageKind::LightSetInfrared.code());
        assert_eq!(writes.len(), 4 * 5);
        assert!(writes.iter().all(|f| !f.header.ack_required));
    }
}
