//! Services module
//!
//! Business logic that coordinates owner rows with image storage.

pub mod games;
pub mod images;

pub use games::GamesService;
pub use images::ImageBinder;
