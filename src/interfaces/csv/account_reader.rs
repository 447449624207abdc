use super::reader_builder;
use crate::domain::account::Account;
use crate::error::{Result, TransferError};
use std::io::Read;

/// Reads seed accounts (`name,balance`) from a CSV source.
pub struct AccountReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AccountReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: reader_builder().from_reader(source),
        }
    }

    pub fn accounts(self) -> impl Iterator<Item = Result<Account>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(TransferError::from))
    }
}
