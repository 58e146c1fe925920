pub mod db;
pub mod migrations;
pub mod sample;
