//! Touch grid: a surface split into fixed-size blocks, each highlighted in the
//! color of the pointer currently over it.
//!
//! Input arrives on the host's callback thread and updates a shared [`grid::Grid`];
//! a background [`render::RenderLoop`] draws it onto the host surface. The
//! [`view::TouchGridView`] ties both together and follows the surface lifecycle.

pub mod color;
pub mod compositor;
pub mod config;
pub mod grid;
pub mod input;
pub mod orientation;
pub mod render;
pub mod replay;
pub mod surface;
pub mod view;
