//! Asset Storage Service
//!
//! Accepts a text prompt or an uploaded file, optionally renders a placeholder
//! image, stores the bytes in an S3-compatible bucket and answers with a public
//! or presigned URL.
//!
//! ## Features
//!
//! - **Path-safe object keys**: `{prefix}/{uuid}-{sanitized-name}`, unique per upload
//! - **Two URL modes**: deterministic public URLs or time-limited presigned URLs,
//!   chosen per deployment
//! - **Placeholder generation**: prompt text drawn onto a PNG canvas, written to a
//!   temporary file that is removed on every exit path
//! - **Pluggable backend**: the gateway talks to an [`ObjectStore`]; [`S3Backend`]
//!   is the production implementation
//!
//! ## Architecture
//!
//! ```text
//!  POST /generate          POST /upload
//! ┌──────────────┐        ┌──────────────┐
//! │ Placeholder  │        │ Multipart    │
//! │ Generator    │        │ file part    │
//! └──────────────┘        └──────────────┘
//!        │ temp PNG              │ bytes
//!        ▼                       ▼
//! ┌──────────────────────────────────────┐      ┌──────────────┐
//! │ Storage Gateway                      │─────▶│ S3 Bucket    │
//! │  key builder · put · URL issuance    │      │ uploads/     │
//! └──────────────────────────────────────┘      │ generated-   │
//!                    │                          │   images/    │
//!                    ▼                          └──────────────┘
//!             { "url": ... }
//! ```

pub mod api;
pub mod config;
pub mod font;
pub mod gateway;
pub mod object_key;
pub mod placeholder;
pub mod s3_backend;
pub mod store;

pub use api::{create_router, AppState};
pub use config::{Config, UrlMode};
pub use gateway::{AccessUrl, StorageError, StorageGateway};
pub use object_key::{sanitize_filename, KeyPrefix, ObjectKey};
pub use placeholder::{GeneratedImage, GenerationError, PlaceholderGenerator};
pub use s3_backend::S3Backend;
pub use store::{ObjectStore, PutObjectRequest};
