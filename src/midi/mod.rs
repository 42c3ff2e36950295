pub mod cursor;
pub mod display;
pub mod loader;
pub mod player;
pub mod timing;
pub mod track;
pub mod utils;
