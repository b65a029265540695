pub mod access_log;
pub mod dispatch;
pub mod enrich;
pub mod entity;
pub mod export;
pub mod record;
pub mod search;
pub mod shared;
