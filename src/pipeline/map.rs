//! Static overview map.
//!
//! A plain raster sketch: buildable area filled, then parcel, hazards, and
//! the best layout's lots, driveways, and envelopes drawn as outlines.
use crate::context::AnalysisContext;
use anyhow::{Context, Result};
use geo::{BoundingRect, Contains, Coord, LineString, MultiPolygon, Point, Rect};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

pub const MAP_WIDTH: u32 = 900;
pub const MAP_HEIGHT: u32 = 700;
const PADDING_PX: f64 = 20.0;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const BUILDABLE_FILL: Rgb<u8> = Rgb([200, 235, 200]);
const PARCEL: Rgb<u8> = Rgb([0, 0, 0]);
const HAZARD: Rgb<u8> = Rgb([210, 40, 40]);
const LOT: Rgb<u8> = Rgb([40, 80, 220]);
const DRIVEWAY: Rgb<u8> = Rgb([240, 140, 20]);
const ENVELOPE: Rgb<u8> = Rgb([120, 120, 120]);

/// World-to-pixel mapping that keeps the aspect ratio.
struct Viewport {
    origin: Coord<f64>,
    scale: f64,
    offset: (f64, f64),
}

impl Viewport {
    fn fit(bounds: Rect<f64>) -> Self {
        let usable_w = f64::from(MAP_WIDTH) - 2.0 * PADDING_PX;
        let usable_h = f64::from(MAP_HEIGHT) - 2.0 * PADDING_PX;
        let width = bounds.width().max(1.0);
        let height = bounds.height().max(1.0);
        let scale = (usable_w / width).min(usable_h / height);
        Self {
            origin: bounds.min(),
            scale,
            offset: (
                PADDING_PX + (usable_w - width * scale) / 2.0,
                PADDING_PX + (usable_h - height * scale) / 2.0,
            ),
        }
    }

    fn to_pixel(&self, c: Coord<f64>) -> (i64, i64) {
        let x = self.offset.0 + (c.x - self.origin.x) * self.scale;
        let y = f64::from(MAP_HEIGHT) - (self.offset.1 + (c.y - self.origin.y) * self.scale);
        (x.round() as i64, y.round() as i64)
    }

    fn to_world(&self, px: u32, py: u32) -> Point<f64> {
        let x = (f64::from(px) - self.offset.0) / self.scale + self.origin.x;
        let y = (f64::from(MAP_HEIGHT) - f64::from(py) - self.offset.1) / self.scale + self.origin.y;
        Point::new(x, y)
    }
}

fn put(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if (0..i64::from(image.width())).contains(&x) && (0..i64::from(image.height())).contains(&y) {
        image.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham segment.
fn draw_segment(image: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(image, x, y, color);
        if (x, y) == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_line(image: &mut RgbImage, view: &Viewport, line: &LineString<f64>, color: Rgb<u8>) {
    for segment in line.lines() {
        draw_segment(image, view.to_pixel(segment.start), view.to_pixel(segment.end), color);
    }
}

fn draw_outline(image: &mut RgbImage, view: &Viewport, area: &MultiPolygon<f64>, color: Rgb<u8>) {
    for polygon in &area.0 {
        draw_line(image, view, polygon.exterior(), color);
        for hole in polygon.interiors() {
            draw_line(image, view, hole, color);
        }
    }
}

fn fill(image: &mut RgbImage, view: &Viewport, area: &MultiPolygon<f64>, color: Rgb<u8>) {
    let Some(bounds) = area.bounding_rect() else {
        return;
    };
    let (x0, y1) = view.to_pixel(bounds.min());
    let (x1, y0) = view.to_pixel(bounds.max());
    let clamp_x = |v: i64| v.clamp(0, i64::from(MAP_WIDTH) - 1) as u32;
    let clamp_y = |v: i64| v.clamp(0, i64::from(MAP_HEIGHT) - 1) as u32;
    for py in clamp_y(y0)..=clamp_y(y1) {
        for px in clamp_x(x0)..=clamp_x(x1) {
            if area.contains(&view.to_world(px, py)) {
                image.put_pixel(px, py, color);
            }
        }
    }
}

/// Render the context; a context without a parcel renders blank.
pub fn render_map(ctx: &AnalysisContext) -> RgbImage {
    let mut image = RgbImage::from_pixel(MAP_WIDTH, MAP_HEIGHT, BACKGROUND);
    let Some(parcel) = ctx.parcel_geometry() else {
        return image;
    };
    let Some(bounds) = parcel.bounding_rect() else {
        return image;
    };
    let view = Viewport::fit(bounds);

    if let Some(buildable) = &ctx.buildable {
        fill(&mut image, &view, buildable, BUILDABLE_FILL);
    }
    draw_outline(&mut image, &view, parcel, PARCEL);
    for hazard in ctx.excluded_footprints() {
        draw_outline(&mut image, &view, &hazard, HAZARD);
    }
    if let Some(layout) = ctx.best_layout().or_else(|| ctx.layouts.first()) {
        for lot in &layout.lots {
            draw_outline(&mut image, &view, lot, LOT);
        }
        for driveway in &layout.driveways {
            draw_line(&mut image, &view, &driveway.path, DRIVEWAY);
        }
        for envelope in &layout.envelopes {
            draw_outline(&mut image, &view, &envelope.footprint, ENVELOPE);
        }
    }
    image
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("encode map PNG")?;
    Ok(bytes)
}
