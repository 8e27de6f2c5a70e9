//! Place-and-route generators for hybrid quarter-rate SerDes receiver columns.
//!
//! Layouts are produced by [`Generator`](template::Generator)s drawing into a
//! [`TemplateBuilder`](template::TemplateBuilder) on a shared
//! [`RoutingGrid`](routing::RoutingGrid). Generated templates are cached in a
//! [`LayoutContext`](context::LayoutContext) and placed into parents with the
//! relational placer.
#![warn(missing_docs)]

pub mod analog;
pub mod config;
pub mod context;
pub mod divider;
pub mod error;
pub mod laygo;
pub mod placer;
pub mod qdr;
pub mod tech;
pub mod template;

mod cache;

#[cfg(test)]
mod tests;

#[doc(inline)]
pub use geometry;
#[doc(inline)]
pub use routing;

pub use context::LayoutContext;
pub use error::{Error, Result};
