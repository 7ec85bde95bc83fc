// Graphics context layer: Vulkan and OpenGL backends behind one init/shutdown
// contract, plus the config they are built from.

pub mod backend;
pub mod config;
pub mod logging;
pub mod window;
