//! Viewport focus / re-center state machine.
//!
//! The controller never talks to a renderer. It owns the logical viewport
//! (`ViewportState`) and returns a `ViewportCommand` whenever the rendered
//! view should move. Extents are computed with Web-Mercator math on
//! 256-px tiles so the decisions match what a slippy map actually shows.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::ViewportConfig;
use common::{Clock, Coordinate};
use serde::Serialize;
use tracing::debug;

use crate::distance::{distance_km, BoundingBox};

const TILE_SIZE_PX: f64 = 256.0;
/// Mercator cannot represent the poles.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;
/// Hard cap on re-center animations.
const MAX_ANIMATION_MS: u64 = 2_000;

/// Rendered container size in pixels. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerSize {
    pub width_px: u32,
    pub height_px: u32,
}

impl ContainerSize {
    pub fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px: width_px.max(1),
            height_px: height_px.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocusState {
    Idle,
    Focused(Coordinate),
}

/// The logical viewport. Only `ViewportController` mutates it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportState {
    pub center: Coordinate,
    pub zoom: f64,
    pub last_focus: Option<Coordinate>,
    pub last_move_at: Option<DateTime<Utc>>,
}

/// Instruction for the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewportCommand {
    SetView {
        center: Coordinate,
        zoom: f64,
        /// Zero means jump without animating.
        animation: Duration,
    },
}

#[derive(Debug)]
pub struct ViewportController {
    config: ViewportConfig,
    bounds: BoundingBox,
    container: ContainerSize,
    state: ViewportState,
    focus: FocusState,
    clock: Arc<dyn Clock>,
}

impl ViewportController {
    pub fn new(config: ViewportConfig, clock: Arc<dyn Clock>) -> Self {
        let bounds = BoundingBox::from(config.bounds);
        let container = ContainerSize::new(config.container_width_px, config.container_height_px);
        let mut controller = Self {
            state: ViewportState {
                center: config.default_center,
                zoom: config.default_zoom,
                last_focus: None,
                last_move_at: None,
            },
            config,
            bounds,
            container,
            focus: FocusState::Idle,
            clock,
        };
        let (center, zoom) = controller.constrain(controller.state.center, controller.state.zoom);
        controller.state.center = center;
        controller.state.zoom = zoom;
        controller
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn focus(&self) -> FocusState {
        self.focus
    }

    pub fn container(&self) -> ContainerSize {
        self.container
    }

    /// Geographic extent currently on screen.
    pub fn visible_bounds(&self) -> BoundingBox {
        let world = world_size_px(self.state.zoom);
        let cx = lon_to_x(self.state.center.lon, world);
        let cy = lat_to_y(self.state.center.lat, world);
        let half_w = f64::from(self.container.width_px) / 2.0;
        let half_h = f64::from(self.container.height_px) / 2.0;
        BoundingBox::new(
            y_to_lat(cy + half_h, world),
            x_to_lon(cx - half_w, world),
            y_to_lat(cy - half_h, world),
            x_to_lon(cx + half_w, world),
        )
    }

    /// Focus a point. Re-centers only when the point is off screen or in
    /// the edge band; selections near the middle leave the view alone.
    ///
    /// The edge band is symmetric: a point is "near the edge" when its
    /// offset from the center exceeds `(0.5 - edge_margin)` of the visible
    /// extent on either axis.
    pub fn select_point(&mut self, point: Coordinate) -> Option<ViewportCommand> {
        if !point.is_valid() {
            debug!("Ignoring selection of invalid coordinate {}", point);
            return None;
        }
        self.focus = FocusState::Focused(point);
        self.state.last_focus = Some(point);

        let view = self.visible_bounds();
        let keep = 0.5 - self.config.edge_margin.clamp(0.0, 0.5);
        let near_edge = (self.state.center.lat - point.lat).abs() > keep * view.lat_extent()
            || (self.state.center.lon - point.lon).abs() > keep * view.lon_extent();

        if view.contains(point) && !near_edge {
            debug!("Selection {} inside the comfort zone; not moving", point);
            return None;
        }
        self.move_to(point, self.state.zoom, self.animation())
    }

    /// Drop focus (detail view dismissed). Snaps home only when the idle
    /// view has drifted beyond `reset_distance_km` of the default center.
    pub fn clear_focus(&mut self) -> Option<ViewportCommand> {
        self.focus = FocusState::Idle;
        self.state.last_focus = None;

        let drift = distance_km(self.state.center, self.config.default_center);
        if drift > self.config.reset_distance_km {
            debug!("Idle view {:.0} km from home; resetting", drift);
            return self.move_to(
                self.config.default_center,
                self.config.default_zoom,
                self.animation(),
            );
        }
        None
    }

    /// Revalidate center and zoom for a new container size. Focus is kept.
    pub fn on_resize(&mut self, width_px: u32, height_px: u32) -> Option<ViewportCommand> {
        self.container = ContainerSize::new(width_px, height_px);
        self.move_to(self.state.center, self.state.zoom, Duration::ZERO)
    }

    /// Record a pan/zoom made by the user. No command is emitted; the
    /// renderer already shows it.
    pub fn on_user_move(&mut self, center: Coordinate, zoom: f64) {
        if !center.is_valid() {
            return;
        }
        let (center, zoom) = self.constrain(center, zoom);
        self.state.center = center;
        self.state.zoom = zoom;
        self.state.last_move_at = Some(self.clock.now());
    }

    fn animation(&self) -> Duration {
        Duration::from_millis(self.config.animation_ms.min(MAX_ANIMATION_MS))
    }

    fn move_to(
        &mut self,
        target: Coordinate,
        zoom: f64,
        animation: Duration,
    ) -> Option<ViewportCommand> {
        let (center, zoom) = self.constrain(target, zoom);
        if same_view(center, zoom, self.state.center, self.state.zoom) {
            return None;
        }
        self.state.center = center;
        self.state.zoom = zoom;
        self.state.last_move_at = Some(self.clock.now());
        Some(ViewportCommand::SetView {
            center,
            zoom,
            animation,
        })
    }

    /// Clamp zoom to the configured range and keep the visible area inside
    /// the bounding box. On an axis where the view is larger than the box,
    /// the center sits on the box's middle.
    fn constrain(&self, center: Coordinate, zoom: f64) -> (Coordinate, f64) {
        let (min_zoom, max_zoom) = (
            self.config.min_zoom.min(self.config.max_zoom),
            self.config.max_zoom.max(self.config.min_zoom),
        );
        let zoom = if zoom.is_finite() {
            zoom.clamp(min_zoom, max_zoom)
        } else {
            self.config.default_zoom.clamp(min_zoom, max_zoom)
        };

        let world = world_size_px(zoom);
        let west = lon_to_x(self.bounds.west, world);
        let east = lon_to_x(self.bounds.east, world);
        let north = lat_to_y(self.bounds.north, world);
        let south = lat_to_y(self.bounds.south, world);
        let half_w = f64::from(self.container.width_px) / 2.0;
        let half_h = f64::from(self.container.height_px) / 2.0;

        let cx = clamp_axis(lon_to_x(center.lon, world), west, east, half_w);
        let cy = clamp_axis(lat_to_y(center.lat, world), north, south, half_h);

        (Coordinate::new(y_to_lat(cy, world), x_to_lon(cx, world)), zoom)
    }
}

fn clamp_axis(value: f64, low: f64, high: f64, half_extent: f64) -> f64 {
    if high - low >= 2.0 * half_extent {
        value.clamp(low + half_extent, high - half_extent)
    } else {
        (low + high) / 2.0
    }
}

fn same_view(a: Coordinate, a_zoom: f64, b: Coordinate, b_zoom: f64) -> bool {
    const EPS: f64 = 1e-9;
    (a.lat - b.lat).abs() < EPS && (a.lon - b.lon).abs() < EPS && (a_zoom - b_zoom).abs() < EPS
}

// ── Web Mercator ──────────────────────────────────────────────────────

fn world_size_px(zoom: f64) -> f64 {
    TILE_SIZE_PX * 2f64.powf(zoom)
}

fn lon_to_x(lon: f64, world: f64) -> f64 {
    (lon + 180.0) / 360.0 * world
}

fn x_to_lon(x: f64, world: f64) -> f64 {
    x / world * 360.0 - 180.0
}

fn lat_to_y(lat: f64, world: f64) -> f64 {
    let phi = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let merc = (PI / 4.0 + phi / 2.0).tan().ln();
    (1.0 - merc / PI) / 2.0 * world
}

fn y_to_lat(y: f64, world: f64) -> f64 {
    let merc = PI * (1.0 - 2.0 * y / world);
    merc.sinh().atan().to_degrees()
}
