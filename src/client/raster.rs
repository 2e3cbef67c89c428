//! Single-band numeric rasters.
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult};

/// Row-major grid of samples; non-finite values are "no data".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RasterGrid {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
}

impl RasterGrid {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(width: usize, height: usize, values: Vec<f32>) -> Result<Self> {
        if values.len() != width * height {
            return Err(anyhow!(
                "raster has {} samples for {width}x{height}",
                values.len()
            ));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().copied().filter(|v| v.is_finite())
    }

    /// `{"width": w, "height": h, "values": [..]}`; `null` samples are no data.
    pub fn from_json(value: &Value) -> Result<Self> {
        let dimension = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| anyhow!("raster JSON missing {key}"))
        };
        let width = dimension("width")?;
        let height = dimension("height")?;
        let values = value
            .get("values")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("raster JSON missing values"))?
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32).unwrap_or(f32::NAN))
            .collect();
        Self::new(width, height, values)
    }
}

/// Decode the first band of a TIFF image.
pub fn decode_tiff(bytes: &[u8]) -> Result<RasterGrid> {
    let mut decoder = Decoder::new(Cursor::new(bytes)).context("open TIFF")?;
    let (width, height) = decoder.dimensions().context("read TIFF dimensions")?;
    let (width, height) = (width as usize, height as usize);
    let samples: Vec<f32> = match decoder.read_image().context("decode TIFF image")? {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|s| s as f32).collect(),
        #[allow(unreachable_patterns)]
        _ => return Err(anyhow!("unsupported TIFF sample format")),
    };
    let pixels = width * height;
    if pixels == 0 || samples.len() < pixels || samples.len() % pixels != 0 {
        return Err(anyhow!(
            "TIFF sample count {} does not fit {width}x{height}",
            samples.len()
        ));
    }
    let bands = samples.len() / pixels;
    let first_band = samples.into_iter().step_by(bands).collect();
    RasterGrid::new(width, height, first_band)
}
