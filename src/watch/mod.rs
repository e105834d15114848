//! Watch sources: resumable per-resource change streams
//!
//! - `stream` - the change-stream contract and the resume cursor
//! - `kube_client` - HTTP implementation against the cluster API
//! - `decode` - watch frame → [`crate::types::ChangeItem`]
//! - `source` - reconnect loop feeding the intake queue
//! - `backoff` - retry delays for connection failures

pub mod backoff;
pub mod decode;
pub mod kube_client;
pub mod source;
pub mod stream;

pub use kube_client::KubeClient;
pub use source::{WatchError, WatchSource};
pub use stream::{ChangeStream, StreamError, WatchConnection, WatchFrame, WatcherCursor};
