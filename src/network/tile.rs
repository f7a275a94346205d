use std::time::Duration;

use tracing::debug;

use super::client::LanClient;
use super::fanout::fan_out;
use super::transport::Binder;
use crate::core::{Color, Device, Error, Result};
use crate::protocol::{Message, MessageKind, TileDevice, PIXELS_PER_TILE, TILES_PER_CHAIN};
use crate::util::duration_to_millis;

/// Pixel written where a caller supplies fewer than 64 colours
const BLANK: Color = Color::new(0, 0, 0, 3500);

/// Tiles reported by a StateDeviceChain reply
#[derive(Debug, Clone, PartialEq)]
pub struct TileChain {
    /// Index of the first tile described
    pub start_index: u8,
    /// One descriptor per physical tile, `total_count` at most
    pub tiles: Vec<TileDevice>,
}

impl TileChain {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Rectangle of a tile addressed by one state request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileWindow {
    pub x: u8,
    pub y: u8,
    pub width: u8,
}

impl Default for TileWindow {
    fn default() -> Self {
        TileWindow { x: 0, y: 0, width: 8 }
    }
}

/// Pads or rejects caller colours for one tile message
fn tile_pixels(colors: &[Color]) -> Result<[Color; PIXELS_PER_TILE]> {
    if colors.len() > PIXELS_PER_TILE {
        return Err(Error::PayloadTooLong {
            field: "colors",
            len: colors.len(),
            max: PIXELS_PER_TILE,
        });
    }
    colors.iter().try_for_each(Color::validate)?;

    let mut pixels = [BLANK; PIXELS_PER_TILE];
    pixels[..colors.len()].copy_from_slice(colors);
    Ok(pixels)
}

impl<B: Binder> LanClient<B> {
    /// Reads the descriptors of every tile in the chain
    pub async fn get_device_chain(&self, device: &Device) -> Result<TileChain> {
        let reply = self
            .send_with_response(device, Message::GetDeviceChain {}, &[MessageKind::StateDeviceChain])
            .await?;
        match reply {
            Message::StateDeviceChain {
                start_index,
                tile_devices,
                total_count,
            } => {
                let count = usize::from(total_count).min(TILES_PER_CHAIN);
                Ok(TileChain {
                    start_index,
                    tiles: tile_devices[..count].to_vec(),
                })
            }
            other => Err(Error::protocol(format!("unexpected {} reply", other.name()))),
        }
    }

    /// Reads the 64 pixels of one tile
    pub async fn get_tile_colors(
        &self,
        device: &Device,
        tile_index: u8,
        window: TileWindow,
    ) -> Result<Vec<Color>> {
        let reply = self
            .send_with_response(
                device,
                Message::GetTileState64 {
                    tile_index,
                    length: 1,
                    reserved: 0,
                    x: window.x,
                    y: window.y,
                    width: window.width,
                },
                &[MessageKind::StateTileState64],
            )
            .await?;
        match reply {
            Message::StateTileState64 { colors, .. } => Ok(colors.to_vec()),
            other => Err(Error::protocol(format!("unexpected {} reply", other.name()))),
        }
    }

    /// Writes up to 64 pixels of one tile; missing pixels are blank
    pub async fn set_tile_colors(
        &self,
        device: &Device,
        tile_index: u8,
        colors: &[Color],
        duration: Duration,
        window: TileWindow,
        rapid: bool,
    ) -> Result<()> {
        let message = Message::SetTileState64 {
            tile_index,
            length: 1,
            reserved: 0,
            x: window.x,
            y: window.y,
            width: window.width,
            duration: duration_to_millis(duration),
            colors: tile_pixels(colors)?,
        };
        self.apply(device, message, rapid).await
    }

    /// Reads every tile of the chain, one request per tile in parallel
    pub async fn get_canvas(&self, device: &Device) -> Result<Vec<Vec<Color>>> {
        let chain = self.get_device_chain(device).await?;
        let first = usize::from(chain.start_index);
        debug!(%device, tiles = chain.len(), "reading canvas");

        let tiles = fan_out(0..chain.len(), self.config().max_concurrency, |offset| {
            self.get_tile_colors(device, (first + offset) as u8, TileWindow::default())
        })
        .await?;
        Ok(tiles.into_iter().map(|(_, colors)| colors).collect())
    }

    /// Writes one frame to every tile, `tiles[i]` going to tile `i`
    ///
    /// All tile writes are issued in parallel and joined; a failed tile does
    /// not stop the others and every failed index is reported together.
    pub async fn set_canvas(
        &self,
        device: &Device,
        tiles: &[Vec<Color>],
        duration: Duration,
        rapid: bool,
    ) -> Result<()> {
        if tiles.len() > TILES_PER_CHAIN {
            return Err(Error::PayloadTooLong {
                field: "tiles",
                len: tiles.len(),
                max: TILES_PER_CHAIN,
            });
        }
        let frames = tiles
            .iter()
            .map(|colors| tile_pixels(colors))
            .collect::<Result<Vec<_>>>()?;
        let millis = duration_to_millis(duration);

        fan_out(0..frames.len(), self.config().max_concurrency, |tile| {
            let message = Message::SetTileState64 {
                tile_index: tile as u8,
                length: 1,
                reserved: 0,
                x: 0,
                y: 0,
                width: 8,
                duration: millis,
                colors: frames[tile],
            };
            self.apply(device, message, rapid)
        })
        .await?;
        Ok(())
    }

    /// Moves a tile's position in the user's layout
    pub async fn set_tile_position(
        &self,
        device: &Device,
        tile_index: u8,
        user_x: f32,
        user_y: f32,
    ) -> Result<()> {
        if !user_x.is_finite() || !user_y.is_finite() {
            return Err(Error::invalid_field("user_position", "coordinates must be finite"));
        }
        self.send_with_ack(
            device,
            Message::SetUserPosition {
                tile_index,
                reserved: 0,
                user_x,
                user_y,
            },
        )
        .await
    }
}
