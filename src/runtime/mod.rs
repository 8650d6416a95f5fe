//! Runtime adapters built on top of the oracle.

pub mod web_service;

pub use web_service::{
    Headers, HttpFailure, HttpMethod, HttpRequest, HttpResponse, HttpTransport, OracleWebService,
    WebServiceCommand,
};
