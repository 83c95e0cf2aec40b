pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that builds the web server router.
pub use middleware::require_auth;
pub use rest::{
    delete_session_handler, online_friends_handler, stats_handler, stop_session_handler,
    update_goal_handler,
};
pub use ws_handler::ws_handler;
