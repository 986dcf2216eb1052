pub mod connections;
pub mod conversations;
pub mod errors;
pub mod identity;
pub mod live;
pub mod logging;
pub mod messages;
pub mod profiles;
pub mod storage;
pub mod web_api;
