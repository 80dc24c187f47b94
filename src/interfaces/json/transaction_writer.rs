use crate::domain::transaction::Transaction;
use serde::Serialize;
use std::io::Write;

/// Writes transactions as JSON lines for audit export.
///
/// Each line carries the coordinator's view of the transaction together with
/// the raw payload the backend delivered.
pub struct TransactionWriter<W: Write> {
    writer: W,
}

impl<W: Write> TransactionWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_transactions<I>(&mut self, transactions: I) -> serde_json::Result<()>
    where
        I: IntoIterator<Item = Transaction>,
    {
        for tx in transactions {
            self.write_line(&tx)?;
        }
        self.writer.flush().map_err(serde_json::Error::io)
    }

    /// Writes any serializable value as a single line.
    pub fn write_line<T: Serialize>(&mut self, value: &T) -> serde_json::Result<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n").map_err(serde_json::Error::io)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
