pub mod alerting;
pub mod db;
pub mod monitoring;
pub mod notifications;
pub mod realtime;
pub mod server;
pub mod web;
