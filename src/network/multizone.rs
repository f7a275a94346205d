use std::ops::{Range, RangeInclusive};
use std::time::Duration;

use tracing::debug;

use super::client::LanClient;
use super::fanout::fan_out;
use super::transport::Binder;
use crate::core::{Color, Device, Error, Result};
use crate::protocol::{ApplyRequest, Message, MessageKind, ZONES_PER_REPLY};
use crate::util::duration_to_millis;

const ZONE_REPLIES: &[MessageKind] = &[MessageKind::StateZone, MessageKind::StateMultiZone];

impl<B: Binder> LanClient<B> {
    /// Number of zones on a multi-zone strip
    pub async fn get_zone_count(&self, device: &Device) -> Result<usize> {
        match self.first_zone_reply(device).await? {
            Message::StateZone { count, .. } | Message::StateMultiZone { count, .. } => {
                Ok(usize::from(count))
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Colour of every zone, in zone order
    ///
    /// The shape of the first reply picks the strategy: a StateMultiZone
    /// summary is followed by one request per 8 zones, a single StateZone by
    /// one request per zone.
    pub async fn get_zone_colors(&self, device: &Device) -> Result<Vec<Color>> {
        match self.first_zone_reply(device).await? {
            Message::StateMultiZone { count, .. } => {
                self.read_zone_chunks(device, usize::from(count)).await
            }
            Message::StateZone { count, .. } => {
                debug!(%device, "multi-zone summary unsupported, reading zones one by one");
                self.read_single_zones(device, usize::from(count)).await
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Colours of the zones in `zones`
    ///
    /// An end past the strip is truncated to the zone count.
    pub async fn get_zone_colors_in(&self, device: &Device, zones: Range<usize>) -> Result<Vec<Color>> {
        if zones.end <= zones.start {
            return Err(Error::invalid_field(
                "zones",
                format!("end {} must be greater than start {}", zones.end, zones.start),
            ));
        }

        let colors = self.get_zone_colors(device).await?;
        if zones.start >= colors.len() {
            return Err(Error::invalid_field(
                "zones",
                format!("start {} is past the {} zones of {}", zones.start, colors.len(), device),
            ));
        }
        let end = zones.end.min(colors.len());
        Ok(colors[zones.start..end].to_vec())
    }

    async fn first_zone_reply(&self, device: &Device) -> Result<Message> {
        self.send_with_response(
            device,
            Message::GetColorZones { start_index: 0, end_index: 255 },
            ZONE_REPLIES,
        )
        .await
    }

    async fn read_zone_chunks(&self, device: &Device, total: usize) -> Result<Vec<Color>> {
        let chunks = (total + ZONES_PER_REPLY - 1) / ZONES_PER_REPLY;
        debug!(%device, total, chunks, "reading zones");

        let replies = fan_out(0..chunks, self.config().max_concurrency, |chunk| {
            let start = chunk * ZONES_PER_REPLY;
            let end = (start + ZONES_PER_REPLY - 1).min(usize::from(u8::MAX));
            self.send_with_response(
                device,
                Message::GetColorZones {
                    start_index: start as u8,
                    end_index: end as u8,
                },
                ZONE_REPLIES,
            )
        })
        .await?;

        let mut zones = vec![None; total];
        for (_, message) in replies {
            match message {
                Message::StateMultiZone { index, colors, .. } => {
                    for (offset, color) in colors.into_iter().enumerate() {
                        if let Some(slot) = zones.get_mut(usize::from(index) + offset) {
                            *slot = Some(color);
                        }
                    }
                }
                Message::StateZone { index, color, .. } => {
                    if let Some(slot) = zones.get_mut(usize::from(index)) {
                        *slot = Some(color);
                    }
                }
                other => return Err(unexpected(&other)),
            }
        }

        zones
            .into_iter()
            .enumerate()
            .map(|(zone, color)| {
                color.ok_or_else(|| Error::protocol(format!("zone {zone} of {device} missing from replies")))
            })
            .collect()
    }

    async fn read_single_zones(&self, device: &Device, total: usize) -> Result<Vec<Color>> {
        let replies = fan_out(0..total, self.config().max_concurrency, |zone| {
            self.send_with_response(
                device,
                Message::GetColorZones {
                    start_index: zone as u8,
                    end_index: zone as u8,
                },
                &[MessageKind::StateZone],
            )
        })
        .await?;

        replies
            .into_iter()
            .map(|(_, message)| match message {
                Message::StateZone { color, .. } => Ok(color),
                other => Err(unexpected(&other)),
            })
            .collect()
    }

    /// Sets the zones in `zones` to one colour
    ///
    /// `rapid` sends a single unacknowledged copy.
    pub async fn set_zone_color(
        &self,
        device: &Device,
        zones: RangeInclusive<u8>,
        color: Color,
        duration: Duration,
        apply: ApplyRequest,
        rapid: bool,
    ) -> Result<()> {
        let message = Message::SetColorZones {
            start_index: *zones.start(),
            end_index: *zones.end(),
            color,
            duration: duration_to_millis(duration),
            apply,
        };
        if rapid {
            self.fire_and_forget_repeated(device, message, 1).await
        } else {
            self.send_with_ack(device, message).await
        }
    }

    /// Sets every zone from `colors`, zone `i` taking `colors[i]`
    ///
    /// Zones are buffered with `NoApply` through the bounded fan-out, then
    /// shown together by one `ApplyOnly` write. With `rapid` the unacknowledged
    /// writes go out one at a time, paced to the device message rate.
    pub async fn set_zone_colors(
        &self,
        device: &Device,
        colors: &[Color],
        duration: Duration,
        rapid: bool,
    ) -> Result<()> {
        if colors.len() > usize::from(u8::MAX) + 1 {
            return Err(Error::PayloadTooLong {
                field: "colors",
                len: colors.len(),
                max: usize::from(u8::MAX) + 1,
            });
        }
        colors.iter().try_for_each(Color::validate)?;
        let Some(last) = colors.len().checked_sub(1) else {
            return Ok(());
        };

        if rapid {
            let interval = self.config().repeat_interval_for(colors.len() as u32 + 1);
            for (zone, color) in colors.iter().enumerate() {
                let index = zone as u8;
                self.set_zone_color(device, index..=index, *color, duration, ApplyRequest::NoApply, true)
                    .await?;
                tokio::time::sleep(interval).await;
            }
            return self
                .set_zone_color(device, 0..=last as u8, colors[last], duration, ApplyRequest::ApplyOnly, true)
                .await;
        }

        fan_out(0..colors.len(), self.config().max_concurrency, |zone| {
            let index = zone as u8;
            self.set_zone_color(
                device,
                index..=index,
                colors[zone],
                duration,
                ApplyRequest::NoApply,
                false,
            )
        })
        .await?;

        self.set_zone_color(
            device,
            0..=last as u8,
            colors[last],
            duration,
            ApplyRequest::ApplyOnly,
            false,
        )
        .await
    }
}

fn unexpected(message: &Message) -> Error {
    Error::protocol(format!("unexpected {} reply", message.name()))
}
