// The api module is the HTTP boundary over the core services.
// Route handlers live per feature; server.rs owns state and wiring.

#[path = "confession_routes.rs"]
pub mod confession_routes;

#[path = "poll_routes.rs"]
pub mod poll_routes;

#[path = "server.rs"]
pub mod server;
