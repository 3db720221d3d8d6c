//! Messages other threads post to the UI thread.
//!
//! Workers never touch elements. They push `Batch` messages onto one bounded
//! queue that the UI thread drains at the start of every frame, in FIFO
//! order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use super::ElementId;
use super::element::ElementSpec;
use super::style::{Number, Rgba};

/// Bound of the single queue every element shares. Larger than a
/// per-element bound of 1000 because one queue carries all of them.
pub const QUEUE_CAPACITY: usize = 16_384;

/// Field update for a single element.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Value(String),
    X(Number),
    Y(Number),
    W(Number),
    H(Number),
    Dimensions {
        x: Number,
        y: Number,
        w: Number,
        h: Number,
    },
    Scroll {
        left: Number,
        top: Number,
    },
    ScrollLeft(Number),
    ScrollTop(Number),
    ZIndex(Number),
    OutlineColor(Rgba),
    BackgroundColor(Rgba),
    ForegroundColor(Rgba),
    ImageId(u32),
    HideImage(bool),
    ParseStyle(String),
    Focus,
    Hidden(bool),
    Alpha(f64),
    ColorMod(Rgba),
    Grayscale(bool),
    Dirt(bool),
}

/// Worker-side name for an element spawned through a [`UiSender`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

/// Either a live id or a handle that resolves to one on the UI thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementRef {
    Id(ElementId),
    Handle(Handle),
}

impl From<ElementId> for ElementRef {
    fn from(id: ElementId) -> Self {
        ElementRef::Id(id)
    }
}

impl From<Handle> for ElementRef {
    fn from(h: Handle) -> Self {
        ElementRef::Handle(h)
    }
}

#[derive(Debug)]
pub enum Batch {
    Spawn {
        handle: Handle,
        parent: Option<ElementRef>,
        spec: ElementSpec,
    },
    Adopt {
        parent: ElementRef,
        child: ElementRef,
    },
    Disown {
        parent: ElementRef,
        child: ElementRef,
    },
    Destroy(ElementRef),
    Update(ElementRef, Update),
}

/// Cloneable producer side of the UI queue.
#[derive(Clone)]
pub struct UiSender {
    tx: Sender<Batch>,
    next_handle: Arc<AtomicU64>,
}

impl UiSender {
    pub fn new(capacity: usize) -> (Self, Receiver<Batch>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                next_handle: Arc::new(AtomicU64::new(1)),
            },
            rx,
        )
    }

    fn post(&self, batch: Batch) {
        match self.tx.try_send(batch) {
            Ok(()) => {}
            Err(TrySendError::Full(b)) => log::warn!("ui queue full, dropping {b:?}"),
            Err(TrySendError::Disconnected(_)) => log::debug!("ui queue closed"),
        }
    }

    /// Queue creation of `spec` under `parent` and return its handle.
    pub fn spawn(&self, parent: Option<ElementRef>, spec: ElementSpec) -> Handle {
        let handle = Handle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.post(Batch::Spawn {
            handle,
            parent,
            spec,
        });
        handle
    }

    pub fn adopt(&self, parent: impl Into<ElementRef>, child: impl Into<ElementRef>) {
        self.post(Batch::Adopt {
            parent: parent.into(),
            child: child.into(),
        });
    }

    pub fn disown(&self, parent: impl Into<ElementRef>, child: impl Into<ElementRef>) {
        self.post(Batch::Disown {
            parent: parent.into(),
            child: child.into(),
        });
    }

    pub fn destroy(&self, target: impl Into<ElementRef>) {
        self.post(Batch::Destroy(target.into()));
    }

    pub fn update(&self, target: impl Into<ElementRef>, update: Update) {
        self.post(Batch::Update(target.into(), update));
    }
}
