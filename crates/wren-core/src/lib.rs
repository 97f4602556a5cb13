mod account;
mod bridge;
mod chat;
mod engine;
mod ids;
mod protocol;
mod sync;

pub use account::*;
pub use bridge::*;
pub use chat::*;
pub use engine::*;
pub use ids::*;
pub use protocol::*;
pub use sync::*;
