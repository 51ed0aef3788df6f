pub mod board;
pub mod bridge;
pub mod controller;
pub mod gpio;
pub mod handshake;
pub mod io;
pub mod link;
pub mod mainboard;
pub mod port;
pub mod protocol;
pub mod settings;
pub mod state;
