//! Pageflow Core Library
//!
//! Shared building blocks for the virtualized document viewer: page
//! geometry and rotation transforms, the scroll axis abstraction, the page
//! model, event publication with throttling, and viewer configuration.

pub mod axis;
pub mod config;
pub mod event;
pub mod geometry;
pub mod page;

pub use axis::ScrollAxis;
pub use config::{ConfigError, ScrollConfig, TilingConfig, ViewerConfig};
pub use event::{Emitter, EventControl, EventControlOptions, ListenerId, ThrottleMode};
pub use geometry::{
    restore_rect, rotate_position, rotate_rect, transform_position, transform_rect,
    transform_size, Point, Rect, Rotation, Size,
};
pub use page::{group_spreads, pages_with_rotated_size, PageObject, RotatedPage, SpreadMode};
