pub mod alert_routes;
