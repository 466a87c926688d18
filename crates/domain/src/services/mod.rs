//! Domain services for the mail dispatcher.
//!
//! Services contain business logic that operates on domain models, plus the
//! traits the dispatcher uses to reach storage, recipients and the transport.

pub mod content;
pub mod dispatcher;
pub mod queue_store;
pub mod recipient_source;
pub mod recipient_validator;
pub mod renderer;
pub mod send_logger;
pub mod transport;

pub use content::{ContentNormalizer, ContentReadError};
pub use dispatcher::{
    CycleReport, DispatchError, DispatcherSettings, EntryOutcome, QueueDispatcher,
    UnrecordedSends,
};
pub use queue_store::{Claim, QueueStore, StoreError};
pub use recipient_source::{RecipientSet, RecipientSource};
pub use recipient_validator::{RecipientValidator, ValidationError};
pub use renderer::{MailRenderer, RenderContext};
pub use send_logger::{MailSendLogger, PersistenceError};
pub use transport::{MailTransport, MockMailTransport, TransportError};
