//! The value carried on every connection.
//!
//! A `Datum` is immutable once produced. Payloads that can be large (images,
//! structured data) sit behind an `Arc`, so handing a datum to several
//! downstream consumers is a reference-count bump. A node that wants a
//! modified copy must build a new value rather than mutate one it received,
//! because the same `Arc` may also be cached as another node's output.

use crate::graph::conn_type::ConnType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Accumulated record of which upstream sources contributed to a value.
///
/// Order-independent: merging is set union. Only used for captions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSet(BTreeSet<String>);

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(source: impl Into<String>) -> Self {
        let mut set = BTreeSet::new();
        set.insert(source.into());
        Self(set)
    }

    pub fn insert(&mut self, source: impl Into<String>) {
        self.0.insert(source.into());
    }

    pub fn merge(&mut self, other: &SourceSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn union<'a>(sets: impl IntoIterator<Item = &'a SourceSet>) -> SourceSet {
        let mut out = SourceSet::new();
        for s in sets {
            out.merge(s);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    /// User-facing caption, e.g. `gen0&gen1`.
    pub fn caption(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join("&")
    }
}

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

impl Rect {
    pub fn new(x: usize, y: usize, w: usize, h: usize) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// A band-interleaved floating point image cube.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCube {
    width: usize,
    height: usize,
    bands: usize,
    data: Vec<f32>,
}

impl ImageCube {
    /// Largest cube the engine will allocate, in samples.
    pub const MAX_SAMPLES: usize = 1 << 26;

    /// `width * height * bands`, or `None` on overflow.
    pub fn sample_count(width: usize, height: usize, bands: usize) -> Option<usize> {
        width.checked_mul(height)?.checked_mul(bands)
    }

    /// A cube of `value`. `None` if the size overflows or exceeds
    /// [`ImageCube::MAX_SAMPLES`].
    pub fn filled(width: usize, height: usize, bands: usize, value: f32) -> Option<Self> {
        let len = Self::sample_count(width, height, bands).filter(|&n| n <= Self::MAX_SAMPLES)?;
        Some(Self {
            width,
            height,
            bands,
            data: vec![value; len],
        })
    }

    /// Build from raw interleaved samples. Returns `None` if the length is wrong.
    pub fn from_raw(width: usize, height: usize, bands: usize, data: Vec<f32>) -> Option<Self> {
        (Self::sample_count(width, height, bands) == Some(data.len())).then_some(Self {
            width,
            height,
            bands,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    fn offset(&self, x: usize, y: usize, band: usize) -> usize {
        (y * self.width + x) * self.bands + band
    }

    pub fn get(&self, x: usize, y: usize, band: usize) -> Option<f32> {
        if x < self.width && y < self.height && band < self.bands {
            Some(self.data[self.offset(x, y, band)])
        } else {
            None
        }
    }

    pub fn set(&mut self, x: usize, y: usize, band: usize, value: f32) {
        if x < self.width && y < self.height && band < self.bands {
            let off = self.offset(x, y, band);
            self.data[off] = value;
        }
    }

    /// Conn type matching this cube's band count.
    pub fn conn_type(&self) -> ConnType {
        ConnType::image_for_bands(self.bands)
    }

    pub fn min_max(&self) -> Option<(f32, f32)> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    pub fn mean(&self) -> Option<f64> {
        if self.data.is_empty() {
            return None;
        }
        let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
        Some(sum / self.data.len() as f64)
    }

    /// New cube with `f` applied to every sample.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> ImageCube {
        ImageCube {
            width: self.width,
            height: self.height,
            bands: self.bands,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Sub-image clipped to the cube's bounds. `None` if the result is empty.
    pub fn crop(&self, rect: Rect) -> Option<ImageCube> {
        let x0 = rect.x.min(self.width);
        let y0 = rect.y.min(self.height);
        let x1 = rect.x.saturating_add(rect.w).min(self.width);
        let y1 = rect.y.saturating_add(rect.h).min(self.height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        let (w, h) = (x1 - x0, y1 - y0);
        let mut data = Vec::with_capacity(w * h * self.bands);
        for y in y0..y1 {
            let start = self.offset(x0, y, 0);
            data.extend_from_slice(&self.data[start..start + w * self.bands]);
        }
        Some(ImageCube {
            width: w,
            height: h,
            bands: self.bands,
            data,
        })
    }

    /// Single-band cube holding the per-pixel mean across bands.
    pub fn band_mean(&self) -> ImageCube {
        let n = self.bands.max(1) as f32;
        let data = self
            .data
            .chunks(self.bands.max(1))
            .map(|px| px.iter().sum::<f32>() / n)
            .collect();
        ImageCube {
            width: self.width,
            height: self.height,
            bands: 1,
            data,
        }
    }

    /// Interleave single-band cubes into one multi-band cube.
    ///
    /// Returns `None` if any input is not single-band or the sizes differ.
    pub fn interleave(planes: &[&ImageCube]) -> Option<ImageCube> {
        let first = planes.first()?;
        let (w, h) = (first.width, first.height);
        if planes
            .iter()
            .any(|p| p.bands != 1 || p.width != w || p.height != h)
        {
            return None;
        }
        let mut data = Vec::with_capacity(w * h * planes.len());
        for i in 0..w * h {
            for p in planes {
                data.push(p.data[i]);
            }
        }
        Some(ImageCube {
            width: w,
            height: h,
            bands: planes.len(),
            data,
        })
    }
}

/// Concrete value promised by a datum's type tag.
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    Number(f64),
    Rect(Rect),
    Image(Arc<ImageCube>),
    Data(Arc<serde_json::Value>),
}

/// Tagged value flowing over a connection.
#[derive(Debug, Clone)]
pub struct Datum {
    conn_type: ConnType,
    payload: Payload,
    sources: SourceSet,
}

impl Datum {
    /// The null datum: "no value yet".
    pub fn null() -> Self {
        Self {
            conn_type: ConnType::None,
            payload: Payload::None,
            sources: SourceSet::new(),
        }
    }

    pub fn number(value: f64, sources: SourceSet) -> Self {
        Self {
            conn_type: ConnType::Number,
            payload: Payload::Number(value),
            sources,
        }
    }

    pub fn rect(rect: Rect, sources: SourceSet) -> Self {
        Self {
            conn_type: ConnType::Rect,
            payload: Payload::Rect(rect),
            sources,
        }
    }

    /// Wrap an image; the type tag follows the band count.
    pub fn image(image: ImageCube, sources: SourceSet) -> Self {
        Self {
            conn_type: image.conn_type(),
            payload: Payload::Image(Arc::new(image)),
            sources,
        }
    }

    pub fn data(value: serde_json::Value, sources: SourceSet) -> Self {
        Self {
            conn_type: ConnType::Data,
            payload: Payload::Data(Arc::new(value)),
            sources,
        }
    }

    pub fn conn_type(&self) -> ConnType {
        self.conn_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn is_null(&self) -> bool {
        matches!(self.payload, Payload::None)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.payload {
            Payload::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_rect(&self) -> Option<Rect> {
        match self.payload {
            Payload::Rect(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageCube> {
        match &self.payload {
            Payload::Image(img) => Some(img),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match &self.payload {
            Payload::Data(v) => Some(v),
            _ => None,
        }
    }

    /// Do two datums share the same image allocation?
    pub fn shares_image_with(&self, other: &Datum) -> bool {
        match (&self.payload, &other.payload) {
            (Payload::Image(a), Payload::Image(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Default for Datum {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::None => write!(f, "none")?,
            Payload::Number(n) => write!(f, "{}", n)?,
            Payload::Rect(r) => write!(f, "rect({},{},{},{})", r.x, r.y, r.w, r.h)?,
            Payload::Image(img) => write!(
                f,
                "{} {}x{}x{}",
                self.conn_type,
                img.width(),
                img.height(),
                img.bands()
            )?,
            Payload::Data(_) => write!(f, "data")?,
        }
        if !self.sources.is_empty() {
            write!(f, " <{}>", self.sources.caption())?;
        }
        Ok(())
    }
}
