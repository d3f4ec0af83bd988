mod input;
mod renderer;

pub use input::handle_key;
pub use renderer::Renderer;
