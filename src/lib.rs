pub mod audio;
pub mod config;
pub mod controller;
pub mod model;
pub mod player;
pub mod playlist;
