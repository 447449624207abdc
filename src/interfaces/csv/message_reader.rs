use super::reader_builder;
use crate::domain::message::Message;
use crate::error::{Result, TransferError};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct MessageRecord {
    queue: String,
    amount: i64,
}

/// Reads messages to produce (`queue,amount`) from a CSV source.
///
/// Each record becomes a fresh `Message` paired with the queue it should be
/// enqueued on.
pub struct MessageReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> MessageReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: reader_builder().from_reader(source),
        }
    }

    /// Lazily reads records, so large files are streamed.
    pub fn messages(self) -> impl Iterator<Item = Result<(String, Message)>> {
        self.reader.into_deserialize().map(|result| {
            let record: MessageRecord = result.map_err(TransferError::from)?;
            Ok((record.queue, Message::new(record.amount)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = "queue, amount\ntransaction.incoming.one, 100\ntransaction.incoming.two, 5";
        let messages: Vec<(String, Message)> = MessageReader::new(data.as_bytes())
            .messages()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, "transaction.incoming.one");
        assert_eq!(messages[0].1.payload, 100);
        assert_ne!(messages[0].1.id, messages[1].1.id);
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "queue, amount\nin, not_a_number\nin, 3";
        let results: Vec<Result<(String, Message)>> =
            MessageReader::new(data.as_bytes()).messages().collect();
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}
