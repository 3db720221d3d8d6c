use std::collections::HashMap;

use crate::net::protocol::{MapInfo, TileLight};

/// One cell of the map: the objects standing in it, bottom to top, and its
/// light.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicMapTile {
    pub objects: Vec<u32>,
    pub brightness: f64,
    pub hue: f64,
    pub sky: f64,
    pub final_brightness: f64,
    pub final_hue: f64,
    stale: bool,
}

/// The current level: a sparse `height × width × depth` grid.
#[derive(Debug, Clone, Default)]
pub struct DynamicMap {
    pub id: u32,
    height: u32,
    width: u32,
    depth: u32,
    pub outdoor: bool,
    pub outdoor_brightness: f64,
    pub ambient_brightness: f64,
    pub ambient_hue: f64,
    tiles: HashMap<usize, DynamicMapTile>,
}

impl DynamicMap {
    pub fn new(height: u32, width: u32, depth: u32) -> Self {
        Self {
            height,
            width,
            depth,
            ..Default::default()
        }
    }

    pub fn from_info(info: &MapInfo) -> Self {
        Self {
            id: info.map_id,
            outdoor: info.outdoor,
            outdoor_brightness: info.outdoor_brightness,
            ambient_brightness: info.brightness,
            ambient_hue: info.hue,
            ..Self::new(info.height, info.width, info.depth)
        }
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// `z·H·W + y·W + x`, or None outside the map.
    pub fn index(&self, y: u32, x: u32, z: u32) -> Option<usize> {
        if y >= self.height || x >= self.width || z >= self.depth {
            return None;
        }
        let (h, w) = (self.height as usize, self.width as usize);
        Some(z as usize * h * w + y as usize * w + x as usize)
    }

    pub fn tile(&self, y: u32, x: u32, z: u32) -> Option<&DynamicMapTile> {
        self.tiles.get(&self.index(y, x, z)?)
    }

    /// The tile at a position, created empty on first use.
    pub fn tile_mut(&mut self, y: u32, x: u32, z: u32) -> Option<&mut DynamicMapTile> {
        let i = self.index(y, x, z)?;
        Some(self.tiles.entry(i).or_insert_with(|| DynamicMapTile {
            stale: true,
            ..Default::default()
        }))
    }

    pub fn tiles(&self) -> impl Iterator<Item = &DynamicMapTile> {
        self.tiles.values()
    }

    pub fn set_light(&mut self, y: u32, x: u32, z: u32, light: TileLight) {
        if let Some(tile) = self.tile_mut(y, x, z) {
            tile.brightness = light.brightness;
            tile.hue = light.hue;
            tile.sky = light.sky;
            tile.stale = true;
        }
    }

    /// Change map-wide lighting; every cached tile value goes stale.
    pub fn set_ambient(&mut self, brightness: f64, hue: f64, outdoor: bool, outdoor_brightness: f64) {
        self.ambient_brightness = brightness;
        self.ambient_hue = hue;
        self.outdoor = outdoor;
        self.outdoor_brightness = outdoor_brightness;
        for tile in self.tiles.values_mut() {
            tile.stale = true;
        }
    }

    fn compute(&self, tile: &DynamicMapTile) -> (f64, f64) {
        let outdoor = if self.outdoor {
            self.outdoor_brightness * tile.sky
        } else {
            0.0
        };
        let brightness = (self.ambient_brightness + outdoor + tile.brightness).clamp(0.0, 1.0);
        (brightness, self.ambient_hue + tile.hue)
    }

    /// Brightness in `[0, 1]`, cached in the tile. Cells never sent use the
    /// ambient values alone.
    pub fn brightness_at(&mut self, y: u32, x: u32, z: u32) -> f64 {
        self.light_at(y, x, z).0
    }

    pub fn hue_at(&mut self, y: u32, x: u32, z: u32) -> f64 {
        self.light_at(y, x, z).1
    }

    /// Brightness and hue together.
    pub fn light_at(&mut self, y: u32, x: u32, z: u32) -> (f64, f64) {
        let Some(i) = self.index(y, x, z) else {
            return self.compute(&DynamicMapTile::default());
        };
        let Some(tile) = self.tiles.get(&i) else {
            return self.compute(&DynamicMapTile::default());
        };
        if !tile.stale {
            return (tile.final_brightness, tile.final_hue);
        }
        let (b, h) = self.compute(tile);
        if let Some(tile) = self.tiles.get_mut(&i) {
            tile.final_brightness = b;
            tile.final_hue = h;
            tile.stale = false;
        }
        (b, h)
    }
}
