//! Bot plumbing: update model, routing, reply templates, delivery and workers.

pub mod dispatcher;
pub mod errors;
pub mod router;
pub mod sink;
pub mod templates;
pub mod update;
pub mod workers;

pub use dispatcher::Dispatcher;
pub use errors::{DispatchError, DispatchResult};
pub use router::{Command, Query, Route};
pub use sink::{MemorySink, NotificationSink, SentMessage, SinkError};
pub use templates::{Button, Markup, ReplyContent, ReplyTemplates};
pub use update::{Sender, Update, UpdateKind};
pub use workers::{DEFAULT_NUM_WORKERS, WorkerPool, update_queue};
