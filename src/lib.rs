pub mod attachment;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod http;
pub mod humanize;
pub mod observability;
pub mod plugins;
pub mod url;
