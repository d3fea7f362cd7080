//! CLI subcommands.

pub mod cart;
pub mod mock_server;
