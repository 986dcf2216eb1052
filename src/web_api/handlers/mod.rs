//! Route handler modules for the buddylink REST API.

pub mod buddies;
pub mod conversations;
pub mod health;
pub mod messages;
pub mod profiles;
pub mod requests;
pub mod websocket;
