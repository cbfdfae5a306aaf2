pub mod admin;
pub mod engine;
pub mod events;
pub mod handler;
pub mod identity;
pub mod logger;
pub mod registry;
pub mod room;
pub mod server;

pub use handler::EventHandler;
pub use server::ThoughtSwapServer;
