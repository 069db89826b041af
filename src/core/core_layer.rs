// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "confession/mod.rs"]
pub mod confession;

#[path = "moderation/moderation_service.rs"]
pub mod moderation;

#[path = "poll/poll_service.rs"]
pub mod poll;

#[path = "publishing/publishing_service.rs"]
pub mod publishing;
