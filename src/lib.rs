// Morning poster editor: a 720x1280 logical canvas of draggable, resizable
// elements over a generated background, exported as one PNG.

pub mod api;
pub mod assets;
pub mod config;
pub mod draw;
pub mod error;
pub mod export;
pub mod font;
pub mod hit;
pub mod inpaint;
pub mod interaction;
pub mod layout;
pub mod persist;
pub mod quote;
pub mod render;
pub mod session;
pub mod types;
pub mod viewport;
pub mod vision;

pub use error::Error;
pub use interaction::{BoundsPolicy, InteractionController, InteractionState};
pub use layout::{Element, ElementId, LayoutModel};
pub use session::EditorSession;
pub use viewport::ViewportScaler;
