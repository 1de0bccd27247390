use crate::store::RegionSource;

/// Axis-aligned bounding box in degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BBox {
    pub const fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Inclusive on every edge.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.xmin <= lon && lon <= self.xmax && self.ymin <= lat && lat <= self.ymax
    }
}

/// Cheap geographic reject for points nowhere near a region of interest.
///
/// An empty set passes everything: the store still performs exact membership
/// labeling, so a missing prefilter only costs extra inserts.
#[derive(Debug, Clone, Default)]
pub struct SpatialPrefilter {
    boxes: Vec<BBox>,
}

impl SpatialPrefilter {
    pub fn new(boxes: Vec<BBox>) -> Self {
        Self { boxes }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Replaces the box set from `source`. Load failures leave the filter
    /// empty (fail-open) and are logged rather than surfaced.
    pub async fn reload(&mut self, source: &dyn RegionSource, buffer_deg: f64) -> usize {
        match source.load_bboxes(buffer_deg).await {
            Ok(boxes) => {
                tracing::info!(boxes = boxes.len(), buffer_deg, "prefilter loaded buffered bboxes");
                self.boxes = boxes;
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "prefilter failed to load bboxes; passing all points"
                );
                self.boxes.clear();
            }
        }
        self.boxes.len()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn admits(&self, lon: f64, lat: f64) -> bool {
        self.boxes.is_empty() || self.boxes.iter().any(|bbox| bbox.contains(lon, lat))
    }
}
