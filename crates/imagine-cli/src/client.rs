use std::io::{BufRead, BufReader};

use imagine_core::record::{ErrorRecord, ImageRecord, RecordStatus, StreamRecord};
use imagine_core::request::GenerationRequest;
use serde::Deserialize;
use thiserror::Error;

/// Client-side failures, kept distinct so each gets its own report:
/// could-not-connect, HTTP-level rejection, and in-band error records
/// are three different things to a user.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Could not connect to the server at {address}. Is it running? Error: {source}")]
    Connect {
        address: String,
        source: reqwest::Error,
    },

    #[error("Request failed: {0}")]
    Http(reqwest::Error),

    #[error("Request failed while reading the stream: {0}")]
    Read(#[from] std::io::Error),

    /// The server reported a failure in a well-formed error record.
    #[error("Server error: {error}")]
    Server {
        error: String,
        details: Option<String>,
    },

    #[error("Malformed record from server: {0}")]
    Record(#[from] serde_json::Error),

    #[error("the stream ended without a final image")]
    MissingFinal,

    #[error(transparent)]
    Output(anyhow::Error),
}

#[derive(Deserialize)]
struct ModelsResponse {
    models: Vec<String>,
}

pub struct Client {
    address: String,
    http: reqwest::blocking::Client,
}

impl Client {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.address)
    }

    /// Submit a generation request and hand every image record to
    /// `on_record` as it arrives (one record total in buffered mode).
    /// Returns the final record. In-band error records become
    /// [`ClientError::Server`].
    pub fn generate(
        &self,
        request: &GenerationRequest,
        on_record: &mut dyn FnMut(&ImageRecord) -> anyhow::Result<()>,
    ) -> Result<ImageRecord, ClientError> {
        let response = self
            .http
            .post(self.url("/generate"))
            .json(request)
            .send()
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            return Err(self.status_error(response));
        }

        let mut failure: Option<ErrorRecord> = None;
        let mut last_final: Option<ImageRecord> = None;

        for line in BufReader::new(response).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<StreamRecord>(&line)? {
                StreamRecord::Image(record) => {
                    on_record(&record).map_err(ClientError::Output)?;
                    if record.status == RecordStatus::Final {
                        last_final = Some(record);
                    }
                }
                StreamRecord::Error(record) => {
                    log::warn!("server reported an error record: {}", record.error);
                    failure = Some(record);
                }
            }
        }

        match (last_final, failure) {
            (Some(record), _) => Ok(record),
            (None, Some(err)) => Err(ClientError::Server {
                error: err.error,
                details: err.details,
            }),
            (None, None) => Err(ClientError::MissingFinal),
        }
    }

    pub fn list_models(&self) -> Result<Vec<String>, ClientError> {
        let response = self
            .http
            .get(self.url("/models"))
            .send()
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            return Err(self.status_error(response));
        }

        let parsed: ModelsResponse = response.json().map_err(ClientError::Http)?;
        Ok(parsed.models)
    }

    fn classify(&self, err: reqwest::Error) -> ClientError {
        if err.is_connect() {
            ClientError::Connect {
                address: self.address.clone(),
                source: err,
            }
        } else {
            ClientError::Http(err)
        }
    }

    /// Prefer the server's own error body over a bare status code.
    fn status_error(&self, response: reqwest::blocking::Response) -> ClientError {
        let status = response.status();
        match response.json::<ErrorRecord>() {
            Ok(record) => ClientError::Server {
                error: record.error,
                details: record.details,
            },
            Err(err) => {
                log::debug!("error body for HTTP {status} was not a record: {err}");
                ClientError::Server {
                    error: format!("HTTP {status}"),
                    details: None,
                }
            }
        }
    }
}
