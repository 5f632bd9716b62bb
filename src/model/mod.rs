pub mod locator;
pub mod descriptor;
pub mod playback;
