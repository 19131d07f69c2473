pub mod connstring;
pub mod mock_server;
pub mod wire_protocol;
