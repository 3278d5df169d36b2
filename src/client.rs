//! Client library for connecting to a SeriesVault server
//!
//! Formats requests and turns response frames back into query results

use crate::error::{Result, SeriesVaultError};
use crate::protocol::{Command, Response};
use crate::store::QueryResult;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Client for connecting to a SeriesVault server
pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    timeout: Option<Duration>,
    /// An unread reply may still be on the wire; set after a request was
    /// abandoned mid-flight
    desynced: bool,
}

impl Client {
    /// Connect to a SeriesVault server
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream, None))
    }

    /// Connect with a deadline that also bounds every later request
    pub async fn connect_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SeriesVaultError::Client(format!("connecting to {} timed out", addr)))??;
        Ok(Self::from_stream(stream, Some(timeout)))
    }

    fn from_stream(stream: TcpStream, timeout: Option<Duration>) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            timeout,
            desynced: false,
        }
    }

    /// Send one request made of `commands` and read its response frame
    async fn send_request(&mut self, commands: &[Command]) -> Result<Response> {
        // nothing would be sent, so no reply would ever come
        if commands.is_empty() {
            return Err(SeriesVaultError::Client("empty request".to_string()));
        }
        if self.desynced {
            return Err(SeriesVaultError::Client(
                "connection out of sync after an interrupted request, reconnect".to_string(),
            ));
        }

        let timeout = self.timeout;
        let round_trip = self.round_trip(commands);
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, round_trip).await {
                Ok(result) => result,
                Err(_) => {
                    self.desynced = true;
                    return Err(SeriesVaultError::Client("request timed out".to_string()));
                }
            },
            None => round_trip.await,
        };

        if let Err(SeriesVaultError::Io(_)) = result {
            self.desynced = true;
        }
        result
    }

    async fn round_trip(&mut self, commands: &[Command]) -> Result<Response> {
        let mut request = String::new();
        for command in commands {
            request.push_str(&command.to_string());
            request.push('\n');
        }

        self.writer.write_all(request.as_bytes()).await?;
        self.writer.flush().await?;

        // frames end with an empty line
        let mut frame = String::new();
        loop {
            let read = self.reader.read_line(&mut frame).await?;
            if read == 0 {
                return Err(SeriesVaultError::Protocol(
                    "connection closed mid-response".to_string(),
                ));
            }
            if frame.ends_with("\n\n") {
                break;
            }
        }

        Response::parse(&frame)
    }

    /// Submit several commands as one request; rows from every `get` are
    /// merged into one result
    pub async fn execute(&mut self, commands: &[Command]) -> Result<QueryResult> {
        self.send_request(commands).await?.into_result()
    }

    /// Record a sample
    pub async fn put(&mut self, key: &str, value: f64, timestamp: i64) -> Result<()> {
        let command = Command::Put {
            key: key.to_string(),
            value,
            timestamp,
        };
        self.execute(&[command]).await.map(|_| ())
    }

    /// Record a sample stamped with the current Unix time in seconds
    pub async fn put_now(&mut self, key: &str, value: f64) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SeriesVaultError::Client(e.to_string()))?;
        self.put(key, value, now.as_secs() as i64).await
    }

    /// Fetch samples for a key, or `*` for every key
    pub async fn get(&mut self, key: &str) -> Result<QueryResult> {
        let command = Command::Get {
            key: key.to_string(),
        };
        self.execute(&[command]).await
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
