pub mod assets;
pub mod device;
pub mod framework;
pub mod mesh;
pub mod renderer;
pub mod shaders;
pub mod sim;
pub mod skybox;
pub mod texture;
pub mod timer;
pub mod ui;
