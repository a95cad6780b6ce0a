// Chitline Infrastructure - HTTP Transport Adapter
// Implements: PrinterTransport against the remote print proxy service

mod transport;

pub use transport::HttpPrinterTransport;
