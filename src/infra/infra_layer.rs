// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "confession/mod.rs"]
pub mod confession;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "telegram/mod.rs"]
pub mod telegram;
