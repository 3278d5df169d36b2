//! Per-connection request framing
//!
//! Bytes are buffered until they form valid UTF-8 ending in `\n`; that text
//! is one request. Decoding and execution happen under a single write lock
//! on the store, so a batch never interleaves with another connection's.

use crate::error::{Result, SeriesVaultError};
use crate::executor::Executor;
use crate::protocol::{decode, encode, Response};
use crate::store::{MemoryStore, SharedStore, Store};
use bytes::BytesMut;
use tracing::{debug, trace};

/// Result of feeding bytes into a session's buffer
#[derive(Debug, PartialEq)]
pub enum Frame {
    /// More bytes are needed
    Incomplete,
    /// A complete request; the buffer has been cleared
    Request(String),
    /// The buffer outgrew the size limit and was discarded
    Oversized,
}

/// Framing and dispatch state for one client connection
pub struct Session<S: Store = MemoryStore> {
    buffer: BytesMut,
    max_request_size: usize,
    /// Set after an oversized request until that request's terminating
    /// chunk has been dropped
    discarding: bool,
    store: SharedStore<S>,
}

impl<S: Store> Session<S> {
    pub fn new(store: SharedStore<S>, max_request_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_request_size,
            discarding: false,
            store,
        }
    }

    /// Bytes received but not yet part of a complete request
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk and check whether the buffer now holds a full request
    pub fn receive(&mut self, chunk: &[u8]) -> Frame {
        let ends_request = chunk.last() == Some(&b'\n');

        // the tail of a rejected request ends with the first chunk that
        // completes it under the newline convention
        if self.discarding {
            if ends_request {
                self.discarding = false;
            }
            trace!("Discarded {} bytes of an oversized request", chunk.len());
            return Frame::Incomplete;
        }

        self.buffer.extend_from_slice(chunk);

        // a split multi-byte character fails here until its tail arrives
        let complete = if ends_request {
            std::str::from_utf8(&self.buffer).ok().map(str::to_string)
        } else {
            None
        };

        match complete {
            Some(text) => {
                self.buffer.clear();
                Frame::Request(text)
            }
            None if self.buffer.len() > self.max_request_size => {
                self.buffer.clear();
                self.discarding = !ends_request;
                Frame::Oversized
            }
            None => Frame::Incomplete,
        }
    }

    /// Decode and run one request, returning the encoded success response
    pub async fn process(&self, request: &str) -> Result<String> {
        let commands = decode(request)?;
        trace!("Decoded {} command(s)", commands.len());

        let mut store = self.store.write().await;
        let outcomes = Executor::new(&mut *store).run_batch(commands)?;
        drop(store);

        Ok(encode(&outcomes))
    }

    /// Feed a chunk and produce the bytes to write back, if a request
    /// completed. Parse, dispatch and size errors all become `error`
    /// responses.
    pub async fn handle(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        let result = match self.receive(chunk) {
            Frame::Incomplete => return None,
            Frame::Request(request) => self.process(&request).await,
            Frame::Oversized => Err(SeriesVaultError::RequestTooLarge(self.max_request_size)),
        };

        match result {
            Ok(response) => Some(response.into_bytes()),
            Err(err) => {
                debug!("Rejected request: {}", err);
                Some(Response::Error(err.to_string()).to_bytes())
            }
        }
    }
}
