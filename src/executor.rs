//! Routes decoded commands to store operations

use crate::error::{Result, SeriesVaultError, WRONG_COMMAND};
use crate::protocol::Command;
use crate::store::{QueryResult, Store};

/// Result of running one command
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A `put` was applied; contributes no rows to the response
    Stored,
    Found(QueryResult),
}

/// Executes commands against a store it borrows exclusively
pub struct Executor<'a, S: Store + ?Sized> {
    store: &'a mut S,
}

impl<'a, S: Store + ?Sized> Executor<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    pub fn run(&mut self, command: Command) -> Result<Outcome> {
        match command {
            Command::Put {
                key,
                value,
                timestamp,
            } => {
                self.store.put(&key, value, timestamp).map_err(dispatch_error)?;
                Ok(Outcome::Stored)
            }
            Command::Get { key } => self
                .store
                .get(&key)
                .map(Outcome::Found)
                .map_err(dispatch_error),
        }
    }

    /// Run commands in order, stopping at the first failure.
    ///
    /// Commands that ran before a failure stay applied.
    pub fn run_batch(&mut self, commands: Vec<Command>) -> Result<Vec<Outcome>> {
        commands.into_iter().map(|command| self.run(command)).collect()
    }
}

/// Store failures surface to the session as executor errors
fn dispatch_error(err: SeriesVaultError) -> SeriesVaultError {
    match err {
        SeriesVaultError::Executor(_) => err,
        SeriesVaultError::Parse(_) => SeriesVaultError::Executor(WRONG_COMMAND.to_string()),
        other => SeriesVaultError::Executor(other.to_string()),
    }
}
