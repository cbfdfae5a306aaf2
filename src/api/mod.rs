pub mod swap_routes;
pub mod swap_websocket;
