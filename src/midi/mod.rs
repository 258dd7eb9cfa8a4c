pub mod analyzer;
pub mod cursor;
pub mod gm;
pub mod loader;
pub mod player;
pub mod song;
pub mod tempo;
pub mod timeline;
pub mod utils;
