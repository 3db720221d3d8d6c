//! Shared cache of server-provided assets.
//!
//! Graphics arrive as encoded PNG bytes and are decoded once into RGBA plus a
//! grayscale twin. Missing images are requested through a load queue that
//! the game worker drains; replaced or dropped images go onto a cleared
//! queue the GPU backend drains to free stale textures.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::{ClientError, Result};
use crate::net::protocol::{Animation, AnimationFrame, Features};
use crate::ui::ImageSource;

/// Wait before asking again for an image the server could not supply.
pub const RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub gray: Vec<u8>,
}

impl ImageData {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self::from_rgba(width, height, rgba.into_raw()))
    }

    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        let gray = rgba
            .chunks_exact(4)
            .flat_map(|px| {
                let l = (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32)
                    .round()
                    .clamp(0.0, 255.0) as u8;
                [l, l, l, px[3]]
            })
            .collect();
        Self {
            width,
            height,
            rgba,
            gray,
        }
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4 + 3;
        self.rgba.get(i).copied()
    }
}

pub struct DataManager {
    images: RwLock<HashMap<u32, Arc<ImageData>>>,
    animations: RwLock<HashMap<u32, Arc<Animation>>>,
    sounds: RwLock<HashMap<u32, Arc<Vec<u8>>>>,
    audio: RwLock<HashMap<u32, Arc<Vec<u8>>>>,
    features: RwLock<Features>,
    requested: Mutex<HashSet<u32>>,
    failed: Mutex<HashMap<u32, Instant>>,
    load_tx: Sender<u32>,
    load_rx: Receiver<u32>,
    cleared: Mutex<Vec<u32>>,
    loaded: Mutex<Vec<u32>>,
}

impl Default for DataManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DataManager {
    pub fn new() -> Self {
        let (load_tx, load_rx) = unbounded();
        Self {
            images: RwLock::default(),
            animations: RwLock::default(),
            sounds: RwLock::default(),
            audio: RwLock::default(),
            features: RwLock::default(),
            requested: Mutex::default(),
            failed: Mutex::default(),
            load_tx,
            load_rx,
            cleared: Mutex::default(),
            loaded: Mutex::default(),
        }
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    pub fn image(&self, id: u32) -> Option<Arc<ImageData>> {
        self.images.read().ok()?.get(&id).cloned()
    }

    pub fn has_image(&self, id: u32) -> bool {
        self.images.read().is_ok_and(|m| m.contains_key(&id))
    }

    /// Store graphics received from the server. Empty data means the server
    /// has no such image; the id is retried after [`RETRY_AFTER`].
    pub fn set_graphics(&self, id: u32, bytes: &[u8]) -> Result<()> {
        self.forget_request(id);
        if bytes.is_empty() {
            log::warn!("server has no graphics for image {id}");
            if let Ok(mut failed) = self.failed.lock() {
                failed.insert(id, Instant::now());
            }
            return Ok(());
        }
        let image = match ImageData::decode(bytes) {
            Ok(image) => image,
            Err(e) => {
                if let Ok(mut failed) = self.failed.lock() {
                    failed.insert(id, Instant::now());
                }
                return Err(e);
            }
        };
        self.insert_image(id, image)
    }

    pub fn insert_image(&self, id: u32, image: ImageData) -> Result<()> {
        let replaced = self
            .images
            .write()
            .map_err(|_| ClientError::Protocol("image cache poisoned".into()))?
            .insert(id, Arc::new(image))
            .is_some();
        if replaced {
            push(&self.cleared, id);
        }
        push(&self.loaded, id);
        if let Ok(mut failed) = self.failed.lock() {
            failed.remove(&id);
        }
        Ok(())
    }

    /// Drop an image. Its textures are released on the next frame.
    pub fn clear_image(&self, id: u32) {
        let removed = self
            .images
            .write()
            .is_ok_and(|mut m| m.remove(&id).is_some());
        if removed {
            push(&self.cleared, id);
        }
    }

    /// Queue a load for an image that is not cached. Repeated requests for
    /// the same id are coalesced until it arrives.
    pub fn request_image(&self, id: u32) {
        if self.has_image(id) {
            return;
        }
        if let Ok(mut failed) = self.failed.lock()
            && let Some(at) = failed.get(&id)
        {
            if at.elapsed() < RETRY_AFTER {
                return;
            }
            failed.remove(&id);
        }
        let fresh = self.requested.lock().is_ok_and(|mut r| r.insert(id));
        if fresh && self.load_tx.send(id).is_err() {
            log::debug!("image load queue closed");
        }
    }

    fn forget_request(&self, id: u32) {
        if let Ok(mut r) = self.requested.lock() {
            r.remove(&id);
        }
    }

    /// Receiver side of the load queue.
    pub fn load_requests(&self) -> Receiver<u32> {
        self.load_rx.clone()
    }

    /// Ids whose textures must be dropped.
    pub fn take_cleared(&self) -> Vec<u32> {
        take(&self.cleared)
    }

    /// Ids decoded since the last call.
    pub fn take_loaded(&self) -> Vec<u32> {
        take(&self.loaded)
    }

    // ------------------------------------------------------------------
    // Animations, sounds, features
    // ------------------------------------------------------------------

    pub fn set_animation(&self, animation: Animation) {
        if let Ok(mut m) = self.animations.write() {
            m.insert(animation.id, Arc::new(animation));
        }
    }

    pub fn animation(&self, id: u32) -> Option<Arc<Animation>> {
        self.animations.read().ok()?.get(&id).cloned()
    }

    /// Frame `index` of a face, wrapping around.
    pub fn frame(&self, animation_id: u32, face_id: u32, index: usize) -> Option<AnimationFrame> {
        let animation = self.animation(animation_id)?;
        let frames = &animation.face(face_id)?.frames;
        if frames.is_empty() {
            return None;
        }
        frames.get(index % frames.len()).cloned()
    }

    pub fn set_sound(&self, id: u32, data: Vec<u8>) {
        if let Ok(mut m) = self.sounds.write() {
            m.insert(id, Arc::new(data));
        }
    }

    pub fn sound(&self, id: u32) -> Option<Arc<Vec<u8>>> {
        self.sounds.read().ok()?.get(&id).cloned()
    }

    pub fn set_audio(&self, id: u32, data: Vec<u8>) {
        if let Ok(mut m) = self.audio.write() {
            m.insert(id, Arc::new(data));
        }
    }

    pub fn audio(&self, id: u32) -> Option<Arc<Vec<u8>>> {
        self.audio.read().ok()?.get(&id).cloned()
    }

    pub fn set_features(&self, features: Features) {
        if let Ok(mut f) = self.features.write() {
            *f = features;
        }
    }

    pub fn features(&self) -> Features {
        self.features.read().map(|f| f.clone()).unwrap_or_default()
    }

    /// Forget everything received from a server.
    pub fn reset(&self) {
        let ids: Vec<u32> = self
            .images
            .write()
            .map(|mut m| m.drain().map(|(id, _)| id).collect())
            .unwrap_or_default();
        for id in ids {
            push(&self.cleared, id);
        }
        if let Ok(mut m) = self.animations.write() {
            m.clear();
        }
        if let Ok(mut m) = self.sounds.write() {
            m.clear();
        }
        if let Ok(mut m) = self.audio.write() {
            m.clear();
        }
        if let Ok(mut r) = self.requested.lock() {
            r.clear();
        }
        if let Ok(mut f) = self.failed.lock() {
            f.clear();
        }
        while self.load_rx.try_recv().is_ok() {}
        self.set_features(Features::default());
    }
}

fn push(queue: &Mutex<Vec<u32>>, id: u32) {
    if let Ok(mut q) = queue.lock() {
        q.push(id);
    }
}

fn take(queue: &Mutex<Vec<u32>>) -> Vec<u32> {
    queue.lock().map(|mut q| std::mem::take(&mut *q)).unwrap_or_default()
}

impl ImageSource for DataManager {
    fn image_size(&self, id: u32) -> Option<(u32, u32)> {
        self.image(id).map(|i| (i.width, i.height))
    }

    fn alpha_at(&self, id: u32, x: u32, y: u32) -> Option<u8> {
        self.image(id)?.alpha_at(x, y)
    }

    fn request(&self, id: u32) {
        self.request_image(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::AnimationFace;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut img = image::RgbaImage::new(width, height);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = image::Rgba([200, 100, 50, if x == 0 { 0 } else { 255 }]);
        }
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    #[test]
    fn decodes_with_grayscale_twin() {
        let data = DataManager::new();
        data.set_graphics(3, &png(2, 2)).expect("decode");
        let img = data.image(3).expect("cached");
        assert_eq!((img.width, img.height), (2, 2));
        assert_eq!(&img.gray[4..8], &[124, 124, 124, 255]);
        assert_eq!(data.alpha_at(3, 0, 0), Some(0));
        assert_eq!(data.alpha_at(3, 1, 0), Some(255));
        assert_eq!(data.alpha_at(3, 2, 0), None);
        assert_eq!(data.take_loaded(), vec![3]);
    }

    #[test]
    fn requests_are_coalesced() {
        let data = DataManager::new();
        let rx = data.load_requests();
        data.request_image(1);
        data.request_image(1);
        data.request_image(2);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2]);
        data.set_graphics(1, &png(1, 1)).expect("decode");
        data.request_image(1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn missing_graphics_back_off() {
        let data = DataManager::new();
        let rx = data.load_requests();
        data.request_image(7);
        assert_eq!(rx.try_recv().ok(), Some(7));
        data.set_graphics(7, &[]).expect("empty is not an error");
        data.request_image(7);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn replacing_an_image_clears_its_texture() {
        let data = DataManager::new();
        data.set_graphics(1, &png(1, 1)).expect("first");
        assert!(data.take_cleared().is_empty());
        data.set_graphics(1, &png(2, 1)).expect("second");
        assert_eq!(data.take_cleared(), vec![1]);
        data.clear_image(1);
        assert_eq!(data.take_cleared(), vec![1]);
        assert!(!data.has_image(1));
    }

    #[test]
    fn bad_bytes_are_an_image_error() {
        let data = DataManager::new();
        assert!(matches!(
            data.set_graphics(1, b"not a png"),
            Err(ClientError::Image(_))
        ));
    }

    #[test]
    fn frames_wrap() {
        let data = DataManager::new();
        data.set_animation(Animation {
            id: 4,
            name: "idle".into(),
            faces: vec![AnimationFace {
                id: 0,
                frames: vec![
                    AnimationFrame {
                        image_id: 10,
                        time: 100,
                        ..Default::default()
                    },
                    AnimationFrame {
                        image_id: 11,
                        time: 100,
                        ..Default::default()
                    },
                ],
            }],
        });
        assert_eq!(data.frame(4, 0, 3).map(|f| f.image_id), Some(11));
        assert!(data.frame(5, 0, 0).is_none());
        data.reset();
        assert!(data.animation(4).is_none());
    }
}
