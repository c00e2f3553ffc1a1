pub mod protocol;
pub mod rest;
pub mod state;
pub mod sweeper;

// Re-export the handlers to make them easily accessible
// to the binary that will build the web server router.
pub use rest::{
    get_session_handler, health_handler, list_rows_handler, post_event_handler,
    search_rows_handler,
};
pub use sweeper::spawn_session_sweeper;
