//! arl-core: Core library for authenticated resource locators
//!
//! This crate provides the core functionality for arl, including:
//! - Locator parsing and validation
//! - Fetch options and configuration file management
//! - Content multiplexing of tar, gzip-tar and zip payloads
//! - Bounded parallel execution of downloads
//! - Transport drivers for HTTP, cloud object stores and repository trees
//!
//! The drivers reach the network only through the collaborator traits in
//! [`traits`], so this crate is independent of any HTTP client or cloud SDK.

pub mod config;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod locator;
pub mod multiplex;
pub mod resolve;
pub mod spool;
pub mod traits;

pub use config::{Config, ConfigManager, FetchOptions};
pub use error::{Error, Result};
pub use locator::{AuthKind, Descriptor, Method, parse_locator};
pub use resolve::{EntryStream, Locator, Transports, fuse_on_error};
pub use traits::{
    ByteStream, Entry, HttpFetch, HttpRequest, ObjectInfo, ObjectStore, ObjectStoreConnector,
    RepositoryTree, ServiceAccount, TreeEntry, TreeEntryKind,
};
