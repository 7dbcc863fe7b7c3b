pub mod emergency;
pub mod traffic_light_controller;
