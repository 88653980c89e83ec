pub use tcp_message::TcpMessage;
mod tcp_message;
